//! Per-packet next-hop selection over the installed routing table.
//!
//! In the traffic-light variant the arbiter weighs the primary and backup
//! next hops by the color each neighbor last advertised, and holds packets
//! when both are red instead of pushing them into congestion.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::congestion::Color;
use super::hold_queue::{HoldEntry, HoldQueue};
use crate::RouterId;
use crate::protocol::{DataPacket, NextHop, RoutingTable, RoutingTableEntry, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathChoice {
    Primary,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    NoRoute,
    TtlExpired,
    HoldExpired,
    HoldQueueOverflow,
    NeighborUnreachable,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DropReason::NoRoute => "no route to destination",
            DropReason::TtlExpired => "ttl expired",
            DropReason::HoldExpired => "hold time exhausted with both next hops red",
            DropReason::HoldQueueOverflow => "hold queue full, oldest entry evicted",
            DropReason::NeighborUnreachable => "chosen neighbor has no adjacency",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Deliver,
    Forward { next_hop: NextHop, choice: PathChoice },
    /// Return the packet to a router it already visited.
    HandBack { to: RouterId },
    Hold { next_hop: RouterId },
    Drop(DropReason),
}

/// Fixed tie-breaker between two neighbors; `true` selects the backup.
pub fn prefer_backup(primary: RouterId, backup: RouterId) -> bool {
    let mixed = primary.to_bits().wrapping_mul(0x9E37_79B1) ^ backup.to_bits();
    mixed.count_ones() % 2 == 1
}

#[derive(Debug)]
pub struct ForwardingArbiter {
    router_id: RouterId,
    variant: Variant,
    table: RoutingTable,
    colors: HashMap<RouterId, Color>,
    hold: HoldQueue,
}

impl ForwardingArbiter {
    pub fn new(router_id: RouterId, variant: Variant, hold_capacity: usize, time_to_wait: u32) -> Self {
        Self {
            router_id,
            variant,
            table: RoutingTable::new(),
            colors: HashMap::new(),
            hold: HoldQueue::new(hold_capacity, time_to_wait),
        }
    }

    /// Replaces the whole table at once.
    pub fn install_table(&mut self, table: RoutingTable) {
        info!("{}: installing routing table with {} routes", self.router_id, table.len());
        self.table = table;
    }

    /// Installs or replaces the route to a single destination.
    pub fn install_route(&mut self, destination: RouterId, primary: NextHop, backup: Option<NextHop>) {
        let backup = backup.unwrap_or_else(|| primary.clone());
        let mut table = self.table.clone();
        let previous = table.get(&destination).cloned();
        table.insert(RoutingTableEntry {
            destination,
            cost: previous.as_ref().map(|e| e.cost).unwrap_or(0),
            backup_cost: previous.as_ref().map(|e| e.backup_cost).unwrap_or(0),
            primary_path: vec![self.router_id, primary.router],
            backup_path: vec![self.router_id, backup.router],
            primary,
            backup,
        });
        self.table = table;
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn set_neighbor_color(&mut self, neighbor: RouterId, color: Color) {
        let previous = self.colors.insert(neighbor, color).unwrap_or_default();
        if previous != color {
            debug!("{}: neighbor {} is now {}", self.router_id, neighbor, color);
        }
    }

    pub fn neighbor_color(&self, neighbor: RouterId) -> Color {
        self.colors.get(&neighbor).copied().unwrap_or_default()
    }

    pub fn forget_neighbor(&mut self, neighbor: RouterId) {
        self.colors.remove(&neighbor);
    }

    pub fn hold_queue(&self) -> &HoldQueue {
        &self.hold
    }

    pub fn hold(&mut self, packet: DataPacket, next_hop: RouterId) -> Option<HoldEntry> {
        self.hold.push(packet, next_hop)
    }

    pub fn drain_held(&mut self) -> Vec<HoldEntry> {
        self.hold.drain()
    }

    pub fn requeue_held(&mut self, entry: HoldEntry) -> Option<HoldEntry> {
        self.hold.requeue(entry)
    }

    /// Chooses what to do with `packet`. `adjacent` reports whether a router
    /// is a directly reachable neighbor, used when handing a packet back.
    pub fn decide(&self, packet: &DataPacket, adjacent: &dyn Fn(RouterId) -> bool) -> Decision {
        if packet.destination == self.router_id {
            return Decision::Deliver;
        }
        if packet.ttl == 0 {
            return Decision::Drop(DropReason::TtlExpired);
        }
        let Some(entry) = self.table.get(&packet.destination) else {
            return Decision::Drop(DropReason::NoRoute);
        };

        let primary = Decision::Forward {
            next_hop: entry.primary.clone(),
            choice: PathChoice::Primary,
        };
        if self.variant == Variant::Ospf || !entry.has_distinct_backup() {
            return primary;
        }

        let primary_color = self.neighbor_color(entry.primary.router);
        let backup_color = self.neighbor_color(entry.backup.router);
        match (primary_color, backup_color) {
            (Color::Green, _) => primary,
            (Color::Yellow, Color::Red) => {
                if prefer_backup(entry.primary.router, entry.backup.router) {
                    self.backup_or_hand_back(packet, entry, primary_color, adjacent)
                } else {
                    primary
                }
            }
            (Color::Yellow, _) => self.backup_or_hand_back(packet, entry, primary_color, adjacent),
            (Color::Red, Color::Red) => Decision::Hold {
                next_hop: entry.primary.router,
            },
            (Color::Red, _) => self.backup_or_hand_back(packet, entry, primary_color, adjacent),
        }
    }

    fn backup_or_hand_back(
        &self,
        packet: &DataPacket,
        entry: &RoutingTableEntry,
        primary_color: Color,
        adjacent: &dyn Fn(RouterId) -> bool,
    ) -> Decision {
        let backup = entry.backup.router;
        if !packet.has_visited(backup) {
            return Decision::Forward {
                next_hop: entry.backup.clone(),
                choice: PathChoice::Backup,
            };
        }

        // The backup would loop; walk the trace backwards for a predecessor
        // that has not already had the packet returned to it.
        let candidate = packet.trace.iter().rev().copied().find(|r| {
            *r != self.router_id && *r != backup && !packet.handed_back.contains(r) && adjacent(*r)
        });
        match candidate {
            Some(to) => Decision::HandBack { to },
            None if primary_color != Color::Red => Decision::Forward {
                next_hop: entry.primary.clone(),
                choice: PathChoice::Primary,
            },
            None => Decision::Hold {
                next_hop: entry.primary.router,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn rid(n: u8) -> RouterId {
        Ipv4Addr::new(n, n, n, n)
    }

    fn hop(n: u8) -> NextHop {
        NextHop {
            router: rid(n),
            iface: format!("if{n}"),
            local_addr: Ipv4Addr::new(10, 0, n, 1),
            remote_addr: Ipv4Addr::new(10, 0, n, 2),
        }
    }

    /// Router 1 reaching 9 with primary via 2 and backup via 3.
    fn arbiter(variant: Variant) -> ForwardingArbiter {
        let mut arbiter = ForwardingArbiter::new(rid(1), variant, 8, 3);
        arbiter.install_route(rid(9), hop(2), Some(hop(3)));
        arbiter
    }

    fn packet() -> DataPacket {
        let mut p = DataPacket::new(rid(5), rid(9), 1, 64, vec![]);
        p.trace = vec![rid(5)];
        p
    }

    fn always(_: RouterId) -> bool {
        true
    }

    fn chosen(decision: &Decision) -> Option<RouterId> {
        match decision {
            Decision::Forward { next_hop, .. } => Some(next_hop.router),
            _ => None,
        }
    }

    #[test]
    fn green_primary_is_used() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(3), Color::Red);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(2)));
    }

    #[test]
    fn yellow_primary_moves_to_backup() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(2), Color::Yellow);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(3)));
        a.set_neighbor_color(rid(3), Color::Yellow);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(3)));
    }

    #[test]
    fn yellow_against_red_uses_fixed_pick() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(2), Color::Yellow);
        a.set_neighbor_color(rid(3), Color::Red);
        let expected = if prefer_backup(rid(2), rid(3)) { rid(3) } else { rid(2) };
        for _ in 0..3 {
            assert_eq!(chosen(&a.decide(&packet(), &always)), Some(expected));
        }
    }

    #[test]
    fn red_primary_moves_to_backup_or_holds() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(2), Color::Red);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(3)));

        a.set_neighbor_color(rid(3), Color::Red);
        assert_eq!(a.decide(&packet(), &always), Decision::Hold { next_hop: rid(2) });
    }

    #[test]
    fn plain_variant_ignores_colors() {
        let mut a = arbiter(Variant::Ospf);
        a.set_neighbor_color(rid(2), Color::Red);
        a.set_neighbor_color(rid(3), Color::Red);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(2)));
    }

    #[test]
    fn looping_backup_hands_packet_back() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(2), Color::Red);
        let mut p = packet();
        p.trace = vec![rid(5), rid(3), rid(4)];

        // 4 is the nearest predecessor that is not the backup.
        assert_eq!(a.decide(&p, &always), Decision::HandBack { to: rid(4) });

        p.handed_back.push(rid(4));
        assert_eq!(a.decide(&p, &always), Decision::HandBack { to: rid(5) });

        p.handed_back.push(rid(5));
        assert_eq!(a.decide(&p, &always), Decision::Hold { next_hop: rid(2) });
    }

    #[test]
    fn hand_back_skips_non_adjacent_routers() {
        let mut a = arbiter(Variant::TrafficLight);
        a.set_neighbor_color(rid(2), Color::Yellow);
        let mut p = packet();
        p.trace = vec![rid(5), rid(3), rid(4)];
        let only_five = |r: RouterId| r == rid(5);
        assert_eq!(a.decide(&p, &only_five), Decision::HandBack { to: rid(5) });

        let nobody = |_: RouterId| false;
        // Primary is only yellow, so it is still usable.
        assert_eq!(chosen(&a.decide(&p, &nobody)), Some(rid(2)));
    }

    #[test]
    fn delivery_ttl_and_missing_routes() {
        let a = arbiter(Variant::TrafficLight);
        let mut p = DataPacket::new(rid(5), rid(1), 1, 64, vec![]);
        assert_eq!(a.decide(&p, &always), Decision::Deliver);

        p.destination = rid(7);
        assert_eq!(a.decide(&p, &always), Decision::Drop(DropReason::NoRoute));

        p.destination = rid(9);
        p.ttl = 0;
        assert_eq!(a.decide(&p, &always), Decision::Drop(DropReason::TtlExpired));
    }

    #[test]
    fn no_distinct_backup_means_primary() {
        let mut a = ForwardingArbiter::new(rid(1), Variant::TrafficLight, 8, 3);
        a.install_route(rid(9), hop(2), None);
        a.set_neighbor_color(rid(2), Color::Red);
        assert_eq!(chosen(&a.decide(&packet(), &always)), Some(rid(2)));
    }

    #[test]
    fn install_table_replaces_everything() {
        let mut a = arbiter(Variant::TrafficLight);
        a.install_table(RoutingTable::new());
        assert!(a.table().is_empty());
    }
}
