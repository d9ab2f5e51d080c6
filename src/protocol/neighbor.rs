use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::lsa::{Lsa, LsaHeader, LsaKey};
use super::types::Role;
use crate::RouterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NeighborState {
    Down,
    Init,
    TwoWay,
    ExStart,
    Exchange,
    Loading,
    Full,
}

impl NeighborState {
    /// Whether the adjacency state machine may move from `self` to `next`.
    /// Promotions advance one state at a time (Loading may be skipped when
    /// nothing is requested); demotions go to Down, Init or ExStart.
    pub fn can_transition_to(self, next: NeighborState) -> bool {
        use NeighborState::*;
        match (self, next) {
            (Down, Down) => false,
            (_, Down) => true,
            (Down, Init) | (Init, TwoWay) | (TwoWay, ExStart) | (ExStart, Exchange) => true,
            (Exchange, Loading) | (Exchange, Full) | (Loading, Full) => true,
            (from, Init) => from >= TwoWay,
            (from, ExStart) => from > ExStart,
            _ => false,
        }
    }

    /// Database exchange is in progress.
    pub fn is_exchanging(self) -> bool {
        matches!(self, NeighborState::Exchange | NeighborState::Loading)
    }

    /// Eligible to receive floods.
    pub fn floods(self) -> bool {
        self >= NeighborState::Exchange
    }
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NeighborState::Down => "Down",
            NeighborState::Init => "Init",
            NeighborState::TwoWay => "2-Way",
            NeighborState::ExStart => "ExStart",
            NeighborState::Exchange => "Exchange",
            NeighborState::Loading => "Loading",
            NeighborState::Full => "Full",
        };
        f.write_str(name)
    }
}

/// Fields of the last accepted database description, for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdSummary {
    pub flags: u8,
    pub sequence: u32,
    pub options: u8,
}

/// Relationship with the single neighbor on a point-to-point interface.
#[derive(Debug, Clone)]
pub struct Adjacency {
    pub iface: String,
    pub local_addr: Ipv4Addr,
    pub neighbor_id: RouterId,
    pub neighbor_addr: Ipv4Addr,
    pub state: NeighborState,
    /// Decided in ExStart; `None` while negotiating.
    pub role: Option<Role>,
    pub dd_sequence: u32,
    pub last_received_dd: Option<DdSummary>,
    /// Encoded copy of the last database description we sent, for verbatim
    /// retransmission.
    pub last_sent_dd: Option<Vec<u8>>,
    /// Our last sent description carried M=0.
    pub dd_all_sent: bool,
    pub summary_list: VecDeque<LsaHeader>,
    pub request_list: BTreeMap<LsaKey, LsaHeader>,
    pub retransmit_list: BTreeMap<LsaKey, Lsa>,
    pub dead_at: Duration,
}

impl Adjacency {
    pub fn new(
        iface: impl Into<String>,
        local_addr: Ipv4Addr,
        neighbor_id: RouterId,
        neighbor_addr: Ipv4Addr,
        dead_at: Duration,
    ) -> Self {
        Self {
            iface: iface.into(),
            local_addr,
            neighbor_id,
            neighbor_addr,
            state: NeighborState::Down,
            role: None,
            dd_sequence: 0,
            last_received_dd: None,
            last_sent_dd: None,
            dd_all_sent: false,
            summary_list: VecDeque::new(),
            request_list: BTreeMap::new(),
            retransmit_list: BTreeMap::new(),
            dead_at,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == Some(Role::Master)
    }

    pub fn is_full(&self) -> bool {
        self.state == NeighborState::Full
    }

    /// Drops all exchange state, as on entering ExStart or leaving 2-Way.
    pub fn clear_lists(&mut self) {
        self.role = None;
        self.last_received_dd = None;
        self.last_sent_dd = None;
        self.dd_all_sent = false;
        self.summary_list.clear();
        self.request_list.clear();
        self.retransmit_list.clear();
    }

    /// Takes up to `limit` headers off the summary list for the next
    /// description packet.
    pub fn next_summaries(&mut self, limit: usize) -> Vec<LsaHeader> {
        let count = limit.min(self.summary_list.len());
        self.summary_list.drain(..count).collect()
    }

    /// Drops `header`'s key from the retransmission list if the pending
    /// instance is the one acknowledged. Returns whether it was removed.
    pub fn acknowledge(&mut self, header: &LsaHeader) -> bool {
        let key = header.key();
        match self.retransmit_list.get(&key) {
            Some(pending) if pending.header.same_instance(header) => {
                self.retransmit_list.remove(&key);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::INITIAL_SEQUENCE_NUMBER;
    use NeighborState::*;

    const ALL: [NeighborState; 7] = [Down, Init, TwoWay, ExStart, Exchange, Loading, Full];

    #[test]
    fn promotions_never_skip_a_state() {
        for from in ALL {
            for to in ALL {
                if to > from && from.can_transition_to(to) {
                    let skipped = (to as u8) - (from as u8);
                    let loading_skip = from == Exchange && to == Full;
                    assert!(skipped == 1 || loading_skip, "{from} -> {to} skips states");
                }
            }
        }
        assert!(!Down.can_transition_to(Full));
        assert!(!Down.can_transition_to(TwoWay));
        assert!(!Init.can_transition_to(ExStart));
    }

    #[test]
    fn demotions() {
        for from in ALL {
            assert_eq!(from.can_transition_to(Down), from != Down);
        }
        assert!(Full.can_transition_to(Init));
        assert!(Full.can_transition_to(ExStart));
        assert!(Exchange.can_transition_to(ExStart));
        assert!(!Init.can_transition_to(Init));
        assert!(!ExStart.can_transition_to(ExStart));
    }

    #[test]
    fn acknowledge_matches_exact_instance_only() {
        let id = Ipv4Addr::new(2, 2, 2, 2);
        let mut adj = Adjacency::new("eth0", Ipv4Addr::new(10, 0, 0, 1), id, Ipv4Addr::new(10, 0, 0, 2), Duration::ZERO);
        let lsa = Lsa::new_router_lsa(id, INITIAL_SEQUENCE_NUMBER + 1, vec![]);
        adj.retransmit_list.insert(lsa.key(), lsa.clone());

        let older = Lsa::new_router_lsa(id, INITIAL_SEQUENCE_NUMBER, vec![]);
        assert!(!adj.acknowledge(&older.header));
        assert_eq!(adj.retransmit_list.len(), 1);

        assert!(adj.acknowledge(&lsa.header));
        assert!(adj.retransmit_list.is_empty());
    }

    #[test]
    fn summaries_are_taken_in_chunks() {
        let mut adj = Adjacency::new("eth0", Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST, Duration::ZERO);
        for n in 1..=5u8 {
            let lsa = Lsa::new_router_lsa(Ipv4Addr::new(n, 0, 0, 0), INITIAL_SEQUENCE_NUMBER, vec![]);
            adj.summary_list.push_back(lsa.header);
        }
        assert_eq!(adj.next_summaries(2).len(), 2);
        assert_eq!(adj.next_summaries(2).len(), 2);
        assert_eq!(adj.next_summaries(2).len(), 1);
        assert!(adj.next_summaries(2).is_empty());
    }
}
