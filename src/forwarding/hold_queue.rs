//! Bounded, deadline-limited buffer for packets whose every next hop is red.

use std::collections::VecDeque;

use crate::RouterId;
use crate::protocol::DataPacket;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldEntry {
    pub packet: DataPacket,
    pub destination: RouterId,
    /// The primary choice that was congested when the packet was held.
    pub next_hop: RouterId,
    /// Remaining checks before the packet is dropped.
    pub time_to_wait: u32,
}

#[derive(Debug)]
pub struct HoldQueue {
    entries: VecDeque<HoldEntry>,
    capacity: usize,
    time_to_wait: u32,
}

impl HoldQueue {
    pub fn new(capacity: usize, time_to_wait: u32) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            time_to_wait,
        }
    }

    /// Enqueues with the full wait budget. Returns the oldest entry if it had
    /// to be evicted to make room.
    pub fn push(&mut self, packet: DataPacket, next_hop: RouterId) -> Option<HoldEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(HoldEntry {
            destination: packet.destination,
            packet,
            next_hop,
            time_to_wait: self.time_to_wait,
        });
        evicted
    }

    /// Takes every entry out for re-evaluation; survivors go back through
    /// [`HoldQueue::requeue`].
    pub fn drain(&mut self) -> Vec<HoldEntry> {
        self.entries.drain(..).collect()
    }

    /// Puts back an entry that still cannot be forwarded, charging one check.
    /// Returns the entry when its wait budget is exhausted.
    pub fn requeue(&mut self, mut entry: HoldEntry) -> Option<HoldEntry> {
        entry.time_to_wait = entry.time_to_wait.saturating_sub(1);
        if entry.time_to_wait == 0 {
            return Some(entry);
        }
        self.entries.push_back(entry);
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HoldEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn packet(id: u64) -> DataPacket {
        DataPacket::new(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(9, 9, 9, 9), id, 64, vec![])
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let mut queue = HoldQueue::new(2, 3);
        let hop = Ipv4Addr::new(2, 2, 2, 2);
        assert!(queue.push(packet(1), hop).is_none());
        assert!(queue.push(packet(2), hop).is_none());
        let evicted = queue.push(packet(3), hop).unwrap();
        assert_eq!(evicted.packet.id, 1);
        assert_eq!(queue.len(), 2);
        assert!(queue.len() <= queue.capacity());
    }

    #[test]
    fn entries_expire_within_wait_budget() {
        let mut queue = HoldQueue::new(4, 3);
        queue.push(packet(1), Ipv4Addr::new(2, 2, 2, 2));

        let mut checks = 0;
        loop {
            checks += 1;
            let mut expired = Vec::new();
            for entry in queue.drain() {
                if let Some(gone) = queue.requeue(entry) {
                    expired.push(gone);
                }
            }
            if !expired.is_empty() {
                break;
            }
            assert!(checks < 10, "entry retained indefinitely");
        }
        assert_eq!(checks, 3);
        assert!(queue.is_empty());
    }
}
