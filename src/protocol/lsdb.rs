//! Per-router link-state database.
//!
//! Ages are never cached: each entry remembers the age it was installed with
//! and when, and the current age is derived from the clock on every read.

use log::{debug, info};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use super::lsa::{LinkRecord, Lsa, LsaHeader, LsaKey, compare_freshness};
use super::types::*;
use crate::RouterId;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct LsdbEntry {
    lsa: Lsa,
    installed_at: Duration,
}

impl LsdbEntry {
    fn age_at(&self, now: Duration) -> u16 {
        if self.lsa.header.is_max_age() {
            return MAX_AGE;
        }
        let elapsed = now.saturating_sub(self.installed_at).as_secs();
        (self.lsa.header.age as u64 + elapsed).min(MAX_AGE as u64) as u16
    }

    fn current(&self, now: Duration) -> Lsa {
        self.lsa.with_age(self.age_at(now))
    }

    /// Logical time at which this entry reaches MaxAge.
    fn expires_at(&self) -> Duration {
        let remaining = MAX_AGE.saturating_sub(self.lsa.header.age);
        self.installed_at + Duration::from_secs(remaining as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// New or fresher instance stored; routes must be recomputed.
    Installed,
    /// Same instance already present; only its age was refreshed.
    Duplicate,
    /// Stored instance is newer; nothing changed.
    Older,
}

#[derive(Debug)]
pub struct LinkStateDatabase {
    router_id: RouterId,
    entries: BTreeMap<LsaKey, LsdbEntry>,
    spf_required: bool,
}

impl LinkStateDatabase {
    pub fn new(router_id: RouterId) -> Self {
        Self {
            router_id,
            entries: BTreeMap::new(),
            spf_required: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has(&self, key: &LsaKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the stored instance with its age brought up to `now`.
    pub fn get(&self, key: &LsaKey, now: Duration) -> Option<Lsa> {
        self.entries.get(key).map(|e| e.current(now))
    }

    pub fn header(&self, key: &LsaKey, now: Duration) -> Option<LsaHeader> {
        self.get(key, now).map(|lsa| lsa.header)
    }

    pub fn headers(&self, now: Duration) -> Vec<LsaHeader> {
        self.entries.values().map(|e| e.current(now).header).collect()
    }

    pub fn lsas(&self, now: Duration) -> Vec<Lsa> {
        self.entries.values().map(|e| e.current(now)).collect()
    }

    /// LSAs usable for route computation: everything not at MaxAge.
    pub fn live_lsas(&self, now: Duration) -> Vec<Lsa> {
        self.entries
            .values()
            .filter(|e| e.age_at(now) < MAX_AGE)
            .map(|e| e.current(now))
            .collect()
    }

    /// How `header` compares to the stored instance, `None` if absent.
    pub fn compare(&self, header: &LsaHeader, now: Duration) -> Option<Ordering> {
        self.header(&header.key(), now)
            .map(|stored| compare_freshness(header, &stored))
    }

    pub fn add(&mut self, lsa: Lsa, now: Duration) -> AddOutcome {
        let key = lsa.key();
        if let Some(existing) = self.entries.get_mut(&key) {
            let stored = existing.current(now);
            match compare_freshness(&lsa.header, &stored.header) {
                Ordering::Less => return AddOutcome::Older,
                Ordering::Equal => {
                    existing.lsa = lsa;
                    existing.installed_at = now;
                    return AddOutcome::Duplicate;
                }
                Ordering::Greater => {}
            }
        }
        debug!(
            "LSDB {}: installing {} seq {:#010x} age {}",
            self.router_id, key, lsa.header.sequence, lsa.header.age
        );
        self.entries.insert(key, LsdbEntry { lsa, installed_at: now });
        self.spf_required = true;
        AddOutcome::Installed
    }

    pub fn remove(&mut self, key: &LsaKey) -> Option<Lsa> {
        let removed = self.entries.remove(key).map(|e| e.lsa);
        if removed.is_some() {
            self.spf_required = true;
        }
        removed
    }

    /// Forces an entry to MaxAge so that it is flooded as a purge.
    pub fn mark_max_age(&mut self, key: &LsaKey, now: Duration) -> Option<Lsa> {
        let entry = self.entries.get_mut(key)?;
        entry.lsa.header.age = MAX_AGE;
        entry.installed_at = now;
        self.spf_required = true;
        Some(entry.lsa.clone())
    }

    pub fn self_key(&self) -> LsaKey {
        LsaKey::router(self.router_id)
    }

    pub fn self_lsa(&self, now: Duration) -> Option<Lsa> {
        self.get(&self.self_key(), now)
    }

    /// Originates a new self-LSA if `links` differ from the stored one, or
    /// unconditionally when `force` is set (periodic refresh).
    ///
    /// Running out of sequence numbers is fatal.
    pub fn originate(&mut self, links: Vec<LinkRecord>, now: Duration, force: bool) -> Result<Option<Lsa>> {
        let current = self.self_lsa(now);
        let sequence = match &current {
            Some(lsa) if !force && !lsa.header.is_max_age() && lsa.same_links(&links) => {
                return Ok(None);
            }
            Some(lsa) => next_sequence(self.router_id, lsa.header.sequence)?,
            None => INITIAL_SEQUENCE_NUMBER,
        };
        let lsa = Lsa::new_router_lsa(self.router_id, sequence, links);
        info!(
            "LSDB {}: originating router LSA seq {:#010x} with {} links",
            self.router_id,
            sequence,
            lsa.links.len()
        );
        self.entries.insert(
            lsa.key(),
            LsdbEntry {
                lsa: lsa.clone(),
                installed_at: now,
            },
        );
        self.spf_required = true;
        Ok(Some(lsa))
    }

    /// Replaces our own LSA after seeing a stale instance of it with
    /// sequence `seen`; the new instance supersedes it network-wide.
    pub fn reoriginate_above(&mut self, seen: i32, now: Duration) -> Result<Lsa> {
        let links = self.self_lsa(now).map(|l| l.links).unwrap_or_default();
        let sequence = next_sequence(self.router_id, seen)?;
        let lsa = Lsa::new_router_lsa(self.router_id, sequence, links);
        self.entries.insert(
            lsa.key(),
            LsdbEntry {
                lsa: lsa.clone(),
                installed_at: now,
            },
        );
        self.spf_required = true;
        Ok(lsa)
    }

    /// The entry that reaches MaxAge first among those not already there.
    pub fn next_expiry(&self, now: Duration) -> Option<(LsaKey, Duration)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.age_at(now) < MAX_AGE)
            .map(|(k, e)| (*k, e.expires_at()))
            .min_by_key(|(_, at)| *at)
    }

    /// Entries that have reached MaxAge by `now`.
    pub fn expired(&self, now: Duration) -> Vec<LsaKey> {
        self.entries
            .iter()
            .filter(|(_, e)| e.age_at(now) >= MAX_AGE)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Entries that have aged out by `now` but have not been flushed yet.
    pub fn newly_expired(&self, now: Duration) -> Vec<LsaKey> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.lsa.header.is_max_age() && e.age_at(now) >= MAX_AGE)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn take_spf_required(&mut self) -> bool {
        std::mem::take(&mut self.spf_required)
    }

    pub fn spf_required(&self) -> bool {
        self.spf_required
    }

    /// Topology reset: forget everything.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.spf_required = true;
        }
        self.entries.clear();
    }
}

fn next_sequence(router: RouterId, current: i32) -> Result<i32> {
    if current >= MAX_SEQUENCE_NUMBER {
        return Err(Error::SequenceExhausted { router });
    }
    Ok(current + 1)
}
