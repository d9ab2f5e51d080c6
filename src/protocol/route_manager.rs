//! Route computation and installation, plus the data-plane dispatch that
//! acts on the arbiter's decisions.

use log::{debug, info, warn};
use std::net::Ipv4Addr;

use super::events::Event;
use super::messages::{DataPacket, ProtocolMessage};
use super::routing_table::{NextHop, RoutingTable, RoutingTableEntry};
use super::Router;
use crate::algorithms::dijkstra::{ComputedPath, Edge, LinkGraph, compute_routes};
use crate::forwarding::{Decision, DropReason};
use crate::network::{Destination, Timer};

/// Recomputes routes if the LSDB changed since the last run. The result
/// becomes effective after the configured computation delay; tables are
/// only ever installed whole.
pub(super) fn schedule_computation(router: &mut Router) {
    if !router.lsdb.take_spf_required() {
        return;
    }
    let table = compute_table(router);
    router.stats.spf_runs += 1;

    let delay = router.config.spf_delay();
    if delay.is_zero() {
        install(router, table);
    } else {
        debug!("Router {}: routes computed, effective in {:?}", router.id(), delay);
        router.pending_table = Some(table);
        router.ensure_armed(Timer::RouteInstall, delay);
    }
}

pub(super) fn install_pending(router: &mut Router) {
    if let Some(table) = router.pending_table.take() {
        install(router, table);
    }
}

fn install(router: &mut Router, table: RoutingTable) {
    let routes = table.len();
    router.arbiter.install_table(table);
    router.stats.route_installs += 1;
    router.record(Event::RoutesInstalled { routes });
}

fn compute_table(router: &Router) -> RoutingTable {
    let now = router.now();
    let lsas = router.lsdb.live_lsas(now);
    let graph = LinkGraph::from_lsas(&lsas);
    let routes = compute_routes(&graph, router.id(), router.config.variant.computes_backup());

    let entries = routes.into_iter().filter_map(|route| {
        let Some(primary) = next_hop(router, route.primary.first_hop()) else {
            warn!(
                "Router {}: no local interface for first hop towards {}",
                router.id(),
                route.destination
            );
            return None;
        };
        let backup = route
            .backup
            .as_ref()
            .and_then(|path| next_hop(router, path.first_hop()).map(|hop| (hop, path)));
        let (backup, backup_path): (NextHop, &ComputedPath) = match backup {
            Some((hop, path)) => (hop, path),
            None => (primary.clone(), &route.primary),
        };
        Some(RoutingTableEntry {
            destination: route.destination,
            cost: route.primary.cost,
            primary,
            backup,
            backup_cost: backup_path.cost,
            primary_path: route.primary.routers(),
            backup_path: backup_path.routers(),
        })
    });
    RoutingTable::from_entries(entries)
}

fn next_hop(router: &Router, edge: &Edge) -> Option<NextHop> {
    let iface = router
        .config
        .interfaces
        .iter()
        .find(|i| i.address.addr() == edge.local_addr)?;
    Some(NextHop {
        router: edge.to,
        iface: iface.name.clone(),
        local_addr: edge.local_addr,
        remote_addr: edge.remote_addr,
    })
}

/// Decides and acts on one data packet, locally injected or received.
pub(super) fn forward_data(router: &mut Router, packet: DataPacket) {
    let decision = {
        let r = &*router;
        r.arbiter.decide(&packet, &|neighbor| r.is_adjacent(neighbor))
    };
    execute(router, packet, decision);
}

fn execute(router: &mut Router, mut packet: DataPacket, decision: Decision) {
    match decision {
        Decision::Deliver => {
            info!(
                "Router {}: delivered packet {} from {} after {} hops",
                router.id(),
                packet.id,
                packet.source,
                packet.trace.len()
            );
            router.stats.data_delivered += 1;
            router.record(Event::PacketDelivered {
                id: packet.id,
                source: packet.source,
                hops: packet.trace.len(),
            });
        }
        Decision::Forward { next_hop, choice } => {
            if !router.is_adjacent(next_hop.router) {
                drop_packet(router, &packet, DropReason::NeighborUnreachable);
                return;
            }
            router.record(Event::PacketForwarded {
                id: packet.id,
                destination: packet.destination,
                next_hop: next_hop.router,
                choice,
            });
            transmit(router, packet, &next_hop.iface, next_hop.remote_addr);
        }
        Decision::HandBack { to } => {
            let link = router
                .adjacencies
                .values()
                .find(|a| a.neighbor_id == to && a.is_full())
                .map(|a| (a.iface.clone(), a.neighbor_addr));
            let Some((iface, addr)) = link else {
                drop_packet(router, &packet, DropReason::NeighborUnreachable);
                return;
            };
            debug!("Router {}: handing packet {} back to {}", router.id(), packet.id, to);
            router.stats.data_handed_back += 1;
            router.record(Event::PacketHandedBack { id: packet.id, to });
            packet.handed_back.push(to);
            transmit(router, packet, &iface, addr);
        }
        Decision::Hold { next_hop } => {
            let id = packet.id;
            if let Some(evicted) = router.arbiter.hold(packet, next_hop) {
                drop_packet(router, &evicted.packet, DropReason::HoldQueueOverflow);
            }
            debug!("Router {}: holding packet {} (next hop {} congested)", router.id(), id, next_hop);
            router.stats.data_held += 1;
            router.record(Event::PacketHeld { id, next_hop });
            let interval = router.config.hold_queue.check_interval();
            router.ensure_armed(Timer::HoldQueue, interval);
        }
        Decision::Drop(reason) => drop_packet(router, &packet, reason),
    }
}

fn transmit(router: &mut Router, mut packet: DataPacket, iface: &str, addr: Ipv4Addr) {
    packet.ttl = packet.ttl.saturating_sub(1);
    packet.trace.push(router.id());
    router.stats.data_forwarded += 1;
    router.send(iface, Destination::Unicast(addr), ProtocolMessage::Data(packet));
}

fn drop_packet(router: &mut Router, packet: &DataPacket, reason: DropReason) {
    warn!(
        "Router {}: dropping packet {} for {}: {}",
        router.id(),
        packet.id,
        packet.destination,
        reason
    );
    router.stats.data_dropped += 1;
    router.record(Event::PacketDropped {
        id: packet.id,
        destination: packet.destination,
        reason,
    });
}

/// Hold-queue check: re-decide every held packet; those still blocked lose
/// one unit of their wait budget and are dropped when it runs out.
pub(super) fn process_hold_queue(router: &mut Router) {
    for entry in router.arbiter.drain_held() {
        let decision = {
            let r = &*router;
            r.arbiter.decide(&entry.packet, &|neighbor| r.is_adjacent(neighbor))
        };
        match decision {
            Decision::Hold { .. } => {
                if let Some(expired) = router.arbiter.requeue_held(entry) {
                    drop_packet(router, &expired.packet, DropReason::HoldExpired);
                }
            }
            other => execute(router, entry.packet, other),
        }
    }
    if !router.arbiter.hold_queue().is_empty() {
        let interval = router.config.hold_queue.check_interval();
        router.arm(Timer::HoldQueue, interval);
    }
}
