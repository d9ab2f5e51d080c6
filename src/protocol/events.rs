//! Per-router counters and a bounded journal of notable events.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use super::neighbor::NeighborState;
use crate::RouterId;
use crate::forwarding::{Color, DropReason, PathChoice};

const JOURNAL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    NeighborStateChanged {
        iface: String,
        neighbor: RouterId,
        from: NeighborState,
        to: NeighborState,
    },
    LsaOriginated {
        sequence: i32,
        links: usize,
    },
    RoutesInstalled {
        routes: usize,
    },
    ColorChanged {
        color: Color,
    },
    PacketDelivered {
        id: u64,
        source: RouterId,
        hops: usize,
    },
    PacketForwarded {
        id: u64,
        destination: RouterId,
        next_hop: RouterId,
        choice: PathChoice,
    },
    PacketHandedBack {
        id: u64,
        to: RouterId,
    },
    PacketHeld {
        id: u64,
        next_hop: RouterId,
    },
    PacketDropped {
        id: u64,
        destination: RouterId,
        reason: DropReason,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub decode_errors: u64,
    pub rejected_packets: u64,
    pub hello_mismatches: u64,
    pub seq_mismatches: u64,
    pub bad_ls_requests: u64,
    pub lsas_originated: u64,
    pub lsas_installed: u64,
    pub lsa_retransmissions: u64,
    pub spf_runs: u64,
    pub route_installs: u64,
    pub color_notifications: u64,
    pub data_delivered: u64,
    pub data_forwarded: u64,
    pub data_handed_back: u64,
    pub data_held: u64,
    pub data_dropped: u64,
}

/// Oldest entries are discarded once the journal is full.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<(Duration, Event)>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(JOURNAL_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, at: Duration, event: Event) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((at, event));
    }

    pub fn drain(&mut self) -> Vec<(Duration, Event)> {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Duration, Event)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
