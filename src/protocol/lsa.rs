//! Link-state advertisements and their freshness ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::Ipv4Addr;

use super::codec;
use super::types::*;
use crate::RouterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LsaType {
    Router = 1,
}

impl LsaType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(LsaType::Router),
            _ => None,
        }
    }
}

/// Database identifier of an LSA: at most one instance per key is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LsaKey {
    pub ls_type: LsaType,
    pub advertising_router: RouterId,
}

impl LsaKey {
    pub fn router(advertising_router: RouterId) -> Self {
        Self {
            ls_type: LsaType::Router,
            advertising_router,
        }
    }
}

impl fmt::Display for LsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.ls_type, self.advertising_router)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsaHeader {
    pub age: u16,
    pub options: u8,
    pub ls_type: LsaType,
    pub link_state_id: RouterId,
    pub advertising_router: RouterId,
    pub sequence: i32,
    pub checksum: u16,
    pub length: u16,
}

impl LsaHeader {
    pub fn key(&self) -> LsaKey {
        LsaKey {
            ls_type: self.ls_type,
            advertising_router: self.advertising_router,
        }
    }

    pub fn is_max_age(&self) -> bool {
        self.age >= MAX_AGE
    }

    /// Same instance as far as the freshness ordering is concerned.
    pub fn same_instance(&self, other: &LsaHeader) -> bool {
        self.key() == other.key() && compare_freshness(self, other) == Ordering::Equal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    pub neighbor_id: RouterId,
    pub local_addr: Ipv4Addr,
    pub remote_addr: Ipv4Addr,
    pub cost: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lsa {
    pub header: LsaHeader,
    pub links: Vec<LinkRecord>,
}

impl Lsa {
    /// Builds a router LSA with its length and checksum filled in.
    pub fn new_router_lsa(router_id: RouterId, sequence: i32, mut links: Vec<LinkRecord>) -> Self {
        links.sort();
        let length = (LSA_HEADER_LEN + 2 + links.len() * LINK_RECORD_LEN) as u16;
        let mut lsa = Self {
            header: LsaHeader {
                age: 0,
                options: OPTION_E,
                ls_type: LsaType::Router,
                link_state_id: router_id,
                advertising_router: router_id,
                sequence,
                checksum: 0,
                length,
            },
            links,
        };
        lsa.header.checksum = lsa.compute_checksum();
        lsa
    }

    pub fn key(&self) -> LsaKey {
        self.header.key()
    }

    pub fn compute_checksum(&self) -> u16 {
        let mut bytes = Vec::with_capacity(self.header.length as usize);
        codec::write_lsa(&mut bytes, self);
        // Age is excluded so that aging in transit does not invalidate the checksum.
        codec::fletcher_checksum(&mut bytes[2..], 14)
    }

    pub fn has_valid_checksum(&self) -> bool {
        self.compute_checksum() == self.header.checksum
    }

    pub fn with_age(&self, age: u16) -> Self {
        let mut copy = self.clone();
        copy.header.age = age.min(MAX_AGE);
        copy
    }

    /// True when both advertise the same set of links, regardless of instance.
    pub fn same_links(&self, links: &[LinkRecord]) -> bool {
        let mut theirs = links.to_vec();
        theirs.sort();
        self.links == theirs
    }
}

/// Orders two instances of the same LSA; `Greater` means `a` is newer.
pub fn compare_freshness(a: &LsaHeader, b: &LsaHeader) -> Ordering {
    match a.sequence.cmp(&b.sequence) {
        Ordering::Equal => {}
        other => return other,
    }
    match a.checksum.cmp(&b.checksum) {
        Ordering::Equal => {}
        other => return other,
    }
    match (a.is_max_age(), b.is_max_age()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    if a.age.abs_diff(b.age) < MAX_AGE_DIFF {
        return Ordering::Equal;
    }
    // Younger is newer.
    b.age.cmp(&a.age)
}
