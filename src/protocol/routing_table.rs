use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use crate::RouterId;

/// One forwarding choice: the neighbor and the link that reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextHop {
    pub router: RouterId,
    pub iface: String,
    pub local_addr: Ipv4Addr,
    pub remote_addr: Ipv4Addr,
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} ({})", self.router, self.iface, self.remote_addr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTableEntry {
    pub destination: RouterId,
    pub cost: u64,
    pub primary: NextHop,
    /// Equal to `primary` when no edge-disjoint alternative exists.
    pub backup: NextHop,
    pub backup_cost: u64,
    pub primary_path: Vec<RouterId>,
    pub backup_path: Vec<RouterId>,
}

impl RoutingTableEntry {
    pub fn has_distinct_backup(&self) -> bool {
        self.backup.router != self.primary.router || self.backup.iface != self.primary.iface
    }
}

/// A complete table; replaced wholesale, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    entries: BTreeMap<RouterId, RoutingTableEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = RoutingTableEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.destination, e)).collect(),
        }
    }

    pub fn get(&self, destination: &RouterId) -> Option<&RoutingTableEntry> {
        self.entries.get(destination)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RoutingTableEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, entry: RoutingTableEntry) {
        self.entries.insert(entry.destination, entry);
    }
}
