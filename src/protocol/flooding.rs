//! Reliable LSA distribution: origination, flooding, acknowledgment,
//! retransmission and MaxAge flushing.

use log::{debug, error, info};
use std::cmp::Ordering;

use super::events::Event;
use super::lsa::{LinkRecord, Lsa, LsaHeader};
use super::messages::*;
use super::neighbor::NeighborState;
use super::types::PACKET_HEADER_LEN;
use super::{Router, neighbor_manager, route_manager};
use crate::error::Result;
use crate::network::{Destination, Timer};

/// Re-evaluates the self-originated LSA from the current Full adjacencies
/// and floods it if a new instance was produced.
pub(super) fn originate(router: &mut Router, force: bool) -> Result<()> {
    let links: Vec<LinkRecord> = router
        .adjacencies
        .values()
        .filter(|a| a.is_full())
        .map(|a| LinkRecord {
            neighbor_id: a.neighbor_id,
            local_addr: a.local_addr,
            remote_addr: a.neighbor_addr,
            cost: router.interface_cost(&a.iface),
        })
        .collect();

    let now = router.now();
    let lsa = match router.lsdb.originate(links, now, force) {
        Ok(Some(lsa)) => lsa,
        Ok(None) => return Ok(()),
        Err(e) => {
            error!("Router {}: cannot originate router LSA: {}", router.id(), e);
            return Err(e);
        }
    };

    router.stats.lsas_originated += 1;
    router.record(Event::LsaOriginated {
        sequence: lsa.header.sequence,
        links: lsa.links.len(),
    });
    flood(router, &[lsa], None);
    schedule_aging(router);
    route_manager::schedule_computation(router);
    Ok(())
}

/// Queues `lsas` on every adjacency in Exchange or above, except the one
/// they arrived on, and sends them right away.
pub(super) fn flood(router: &mut Router, lsas: &[Lsa], except: Option<&str>) {
    let targets: Vec<String> = router
        .adjacencies
        .values()
        .filter(|a| a.state.floods() && Some(a.iface.as_str()) != except)
        .map(|a| a.iface.clone())
        .collect();

    let interval = router.config.retransmit_interval();
    for iface in targets {
        if let Some(adj) = router.adjacencies.get_mut(&iface) {
            for lsa in lsas {
                adj.retransmit_list.insert(lsa.key(), lsa.clone());
            }
        }
        send_update(router, &iface, lsas.to_vec());
        router.ensure_armed(Timer::LsRetransmit { iface }, interval);
    }
}

/// Sends `lsas` to the neighbor on `iface`, split so that no update exceeds
/// the interface MTU or the configured LSA count.
pub(super) fn send_update(router: &mut Router, iface: &str, lsas: Vec<Lsa>) {
    let Some(destination) = router.adjacencies.get(iface).map(|a| a.neighbor_addr) else {
        return;
    };
    let mtu = router.config.interface(iface).map(|i| i.mtu as usize).unwrap_or(0);
    let max_count = router.config.max_lsas_per_update;
    let base = PACKET_HEADER_LEN + 4;

    let mut batch: Vec<Lsa> = Vec::new();
    let mut size = base;
    for lsa in lsas {
        let len = lsa.header.length as usize;
        if !batch.is_empty() && (batch.len() >= max_count || size + len > mtu) {
            transmit_update(router, iface, destination, std::mem::take(&mut batch));
            size = base;
        }
        size += len;
        batch.push(lsa);
    }
    if !batch.is_empty() {
        transmit_update(router, iface, destination, batch);
    }
}

fn transmit_update(router: &mut Router, iface: &str, destination: std::net::Ipv4Addr, lsas: Vec<Lsa>) {
    debug!("Router {} → LSU on {} ({} LSAs)", router.id(), iface, lsas.len());
    router.send(
        iface,
        Destination::Unicast(destination),
        ProtocolMessage::LinkStateUpdate(LinkStateUpdate { lsas }),
    );
}

fn send_ack(router: &mut Router, iface: &str, headers: Vec<LsaHeader>) {
    let Some(destination) = router.adjacencies.get(iface).map(|a| a.neighbor_addr) else {
        return;
    };
    router.send(
        iface,
        Destination::Unicast(destination),
        ProtocolMessage::LinkStateAck(LinkStateAck { headers }),
    );
}

pub(super) fn handle_update(router: &mut Router, iface: &str, update: LinkStateUpdate) -> Result<()> {
    let state = router.adjacencies.get(iface).map(|a| a.state).unwrap_or(NeighborState::Down);
    if !state.floods() {
        debug!("Router {}: ignoring LSU on {} in {}", router.id(), iface, state);
        return Ok(());
    }

    let now = router.now();
    let self_id = router.id();
    let mut acks = Vec::new();
    let mut changed = false;
    let mut answered_requests = false;

    for lsa in update.lsas {
        let key = lsa.key();
        let comparison = router.lsdb.compare(&lsa.header, now);

        if lsa.header.is_max_age() && comparison.is_none() && !router.any_exchanging() {
            debug!("Router {}: acknowledging unknown MaxAge {}", self_id, key);
            acks.push(lsa.header);
            continue;
        }

        match comparison {
            None | Some(Ordering::Greater) => {
                acks.push(lsa.header);
                if let Some(adj) = router.adjacencies.get_mut(iface) {
                    answered_requests |= adj.request_list.remove(&key).is_some();
                }
                if key.advertising_router == self_id {
                    // A stale instance of our own LSA from an earlier life.
                    let fresh = router.lsdb.reoriginate_above(lsa.header.sequence, now)?;
                    info!(
                        "Router {}: saw own LSA seq {:#010x}, re-originating as {:#010x}",
                        self_id, lsa.header.sequence, fresh.header.sequence
                    );
                    router.stats.lsas_originated += 1;
                    router.record(Event::LsaOriginated {
                        sequence: fresh.header.sequence,
                        links: fresh.links.len(),
                    });
                    flood(router, &[fresh], None);
                } else {
                    router.lsdb.add(lsa.clone(), now);
                    router.stats.lsas_installed += 1;
                    flood(router, &[lsa], Some(iface));
                }
                changed = true;
            }
            Some(Ordering::Equal) => {
                if let Some(adj) = router.adjacencies.get_mut(iface) {
                    answered_requests |= adj.request_list.remove(&key).is_some();
                    // Receiving what we are retransmitting counts as an ack.
                    if !adj.acknowledge(&lsa.header) {
                        acks.push(lsa.header);
                    }
                }
            }
            Some(Ordering::Less) => {
                if let Some(ours) = router.lsdb.get(&key, now) {
                    debug!("Router {}: neighbor on {} has older {}, sending ours", self_id, iface, key);
                    send_update(router, iface, vec![ours]);
                }
            }
        }
    }

    if !acks.is_empty() {
        send_ack(router, iface, acks);
    }
    if changed {
        schedule_aging(router);
        route_manager::schedule_computation(router);
    }

    let (state, requests_left) = match router.adjacencies.get(iface) {
        Some(adj) => (adj.state, !adj.request_list.is_empty()),
        None => return Ok(()),
    };
    if state == NeighborState::Loading {
        if requests_left {
            if answered_requests {
                neighbor_manager::send_ls_request(router, iface)?;
            }
        } else {
            router.disarm(&Timer::LsRequestRetransmit { iface: iface.to_string() });
            neighbor_manager::transition(router, iface, NeighborState::Full)?;
        }
    }
    remove_flushed(router);
    Ok(())
}

pub(super) fn handle_ack(router: &mut Router, iface: &str, ack: LinkStateAck) -> Result<()> {
    let Some(adj) = router.adjacencies.get_mut(iface) else {
        return Ok(());
    };
    if !adj.state.floods() {
        return Ok(());
    }
    for header in &ack.headers {
        adj.acknowledge(header);
    }
    if adj.retransmit_list.is_empty() {
        router.disarm(&Timer::LsRetransmit { iface: iface.to_string() });
    }
    remove_flushed(router);
    Ok(())
}

/// Retransmission timer: resend what is still unacknowledged, bounded by
/// the per-update budget.
pub(super) fn retransmit(router: &mut Router, iface: &str) {
    let now = router.now();
    let budget = router.config.max_lsas_per_update;
    let pending: Vec<Lsa> = match router.adjacencies.get(iface) {
        Some(adj) if adj.state.floods() => adj
            .retransmit_list
            .values()
            .take(budget)
            .map(|lsa| match router.lsdb.get(&lsa.key(), now) {
                Some(current) if current.header.same_instance(&lsa.header) => current,
                _ => lsa.clone(),
            })
            .collect(),
        _ => return,
    };
    if pending.is_empty() {
        return;
    }
    debug!("Router {}: retransmitting {} LSAs on {}", router.id(), pending.len(), iface);
    router.stats.lsa_retransmissions += pending.len() as u64;
    send_update(router, iface, pending);
    let interval = router.config.retransmit_interval();
    router.arm(Timer::LsRetransmit { iface: iface.to_string() }, interval);
}

/// Keeps a single aging timer armed for the earliest-expiring entry.
pub(super) fn schedule_aging(router: &mut Router) {
    let now = router.now();
    match router.lsdb.next_expiry(now) {
        Some((_, at)) => {
            let delay = at.saturating_sub(now);
            router.arm(Timer::LsaAging, delay);
        }
        None => router.disarm(&Timer::LsaAging),
    }
}

/// Aging timer: flood everything that just reached MaxAge so the whole
/// network purges it. Our own LSA is replaced by a fresh instance instead.
pub(super) fn age_out(router: &mut Router) -> Result<()> {
    let now = router.now();
    let self_key = router.lsdb.self_key();
    for key in router.lsdb.newly_expired(now) {
        if key == self_key {
            info!("Router {}: own LSA reached MaxAge, re-originating", router.id());
            originate(router, true)?;
            continue;
        }
        if let Some(lsa) = router.lsdb.mark_max_age(&key, now) {
            info!("Router {}: {} reached MaxAge, flushing", router.id(), key);
            flood(router, &[lsa], None);
        }
    }
    remove_flushed(router);
    schedule_aging(router);
    route_manager::schedule_computation(router);
    Ok(())
}

/// Drops MaxAge entries once no neighbor still owes us an ack for them and
/// no database exchange could still ask for them.
pub(super) fn remove_flushed(router: &mut Router) {
    if router.any_exchanging() {
        return;
    }
    let now = router.now();
    let self_key = router.lsdb.self_key();
    for key in router.lsdb.expired(now) {
        if key == self_key {
            continue;
        }
        let pending = router.adjacencies.values().any(|a| a.retransmit_list.contains_key(&key));
        if !pending {
            debug!("Router {}: removing flushed {}", router.id(), key);
            router.lsdb.remove(&key);
        }
    }
}
