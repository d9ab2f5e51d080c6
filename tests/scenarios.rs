//! End-to-end scenarios on the in-memory harness.

use std::net::Ipv4Addr;
use std::time::Duration;

use satnet_routing::Simulation;
use satnet_routing::config::{InterfaceConfig, RouterConfig};
use satnet_routing::forwarding::{Color, DropReason, PathChoice};
use satnet_routing::protocol::{Event, LsaKey, NeighborState, Variant};
use satnet_routing::RouterId;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rid(n: u8) -> RouterId {
    Ipv4Addr::new(n, n, n, n)
}

const A: u8 = 1;
const B: u8 = 2;
const C: u8 = 3;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn pair(variant: Variant) -> Simulation {
    let mut sim = Simulation::new();
    sim.add_router(RouterConfig::new(rid(A), variant).with_interface("isl0", "10.0.0.1/30".parse().unwrap(), 10))
        .unwrap();
    sim.add_router(RouterConfig::new(rid(B), variant).with_interface("isl0", "10.0.0.2/30".parse().unwrap(), 10))
        .unwrap();
    sim.connect(rid(A), "isl0", rid(B), "isl0", Duration::from_millis(5))
        .unwrap();
    sim
}

/// A-B and B-C cost 1, A-C cost 3.
fn triangle(variant: Variant) -> Simulation {
    triangle_with(variant, |_| {})
}

fn triangle_with(variant: Variant, tune: impl Fn(&mut RouterConfig)) -> Simulation {
    let mut sim = Simulation::new();
    let mut a = RouterConfig::new(rid(A), variant)
        .with_interface("ab", "10.0.1.1/30".parse().unwrap(), 1)
        .with_interface("ac", "10.0.3.1/30".parse().unwrap(), 3);
    let mut b = RouterConfig::new(rid(B), variant)
        .with_interface("ba", "10.0.1.2/30".parse().unwrap(), 1)
        .with_interface("bc", "10.0.2.1/30".parse().unwrap(), 1);
    let mut c = RouterConfig::new(rid(C), variant)
        .with_interface("cb", "10.0.2.2/30".parse().unwrap(), 1)
        .with_interface("ca", "10.0.3.2/30".parse().unwrap(), 3);
    for config in [&mut a, &mut b, &mut c] {
        config.hold_queue.time_to_wait = 3;
        config.hold_queue.check_interval_ms = 100;
        tune(config);
    }
    sim.add_router(a).unwrap();
    sim.add_router(b).unwrap();
    sim.add_router(c).unwrap();
    let delay = Duration::from_millis(5);
    sim.connect(rid(A), "ab", rid(B), "ba", delay).unwrap();
    sim.connect(rid(B), "bc", rid(C), "cb", delay).unwrap();
    sim.connect(rid(A), "ac", rid(C), "ca", delay).unwrap();
    sim
}

fn state(sim: &Simulation, at: u8, of: u8) -> NeighborState {
    sim.router(rid(at)).unwrap().neighbor_state(rid(of))
}

#[test]
fn two_routers_reach_full_and_agree() {
    init_logging();
    for variant in [Variant::Ospf, Variant::TrafficLight] {
        let mut sim = pair(variant);
        sim.start().unwrap();
        sim.run_for(secs(30)).unwrap();

        assert_eq!(state(&sim, A, B), NeighborState::Full, "{variant}");
        assert_eq!(state(&sim, B, A), NeighborState::Full, "{variant}");
        assert!(sim.lsdbs_agree(), "{variant}");

        let now = sim.now();
        for router in sim.routers() {
            let lsas = router.lsdb().live_lsas(now);
            assert_eq!(lsas.len(), 2);
            assert!(lsas.iter().all(|lsa| lsa.links.len() == 1));
        }

        let route = sim.router(rid(A)).unwrap().routing_table().get(&rid(B)).cloned().unwrap();
        assert_eq!(route.cost, 10);
        assert_eq!(route.primary.router, rid(B));
        assert_eq!(route.primary.remote_addr, Ipv4Addr::new(10, 0, 0, 2));
    }
}

#[test]
fn plain_variant_waits_for_next_hello_in_two_way() {
    init_logging();
    let mut sim = pair(Variant::Ospf);
    sim.start().unwrap();
    sim.run_for(secs(1)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::TwoWay);

    sim.run_for(secs(10)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Full);
}

#[test]
fn traffic_light_collapses_two_way() {
    init_logging();
    let mut sim = pair(Variant::TrafficLight);
    sim.start().unwrap();
    sim.run_for(secs(1)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Full);
}

#[test]
fn adjacency_never_skips_states() {
    init_logging();
    for variant in [Variant::Ospf, Variant::TrafficLight] {
        let mut sim = triangle(variant);
        sim.start().unwrap();
        sim.run_for(secs(30)).unwrap();
        sim.set_link_up(rid(A), "ab", false).unwrap();
        sim.run_for(secs(5)).unwrap();
        sim.set_link_up(rid(A), "ab", true).unwrap();
        sim.run_for(secs(30)).unwrap();

        let changes: Vec<(NeighborState, NeighborState)> = sim
            .drain_events()
            .into_iter()
            .filter_map(|(_, _, event)| match event {
                Event::NeighborStateChanged { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert!(!changes.is_empty());
        for (from, to) in changes {
            assert!(from.can_transition_to(to), "{variant}: {from} -> {to}");
        }
        for (x, y) in [(A, B), (B, C), (A, C)] {
            assert_eq!(state(&sim, x, y), NeighborState::Full, "{variant}");
        }
    }
}

#[test]
fn triangle_installs_disjoint_backup() {
    init_logging();
    let mut sim = triangle(Variant::TrafficLight);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    assert!(sim.lsdbs_agree());

    let a = sim.router(rid(A)).unwrap();
    let to_c = a.routing_table().get(&rid(C)).unwrap();
    assert_eq!(to_c.cost, 2);
    assert_eq!(to_c.primary.router, rid(B));
    assert_eq!(to_c.primary_path, vec![rid(A), rid(B), rid(C)]);
    assert_eq!(to_c.backup.router, rid(C));
    assert_eq!(to_c.backup.iface, "ac");
    assert_eq!(to_c.backup_cost, 3);

    let to_b = a.routing_table().get(&rid(B)).unwrap();
    assert_eq!(to_b.cost, 1);
    assert_eq!(to_b.backup.router, rid(C));
    assert_eq!(to_b.backup_cost, 4);
}

#[test]
fn plain_variant_has_no_backup() {
    init_logging();
    let mut sim = triangle(Variant::Ospf);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();

    let a = sim.router(rid(A)).unwrap();
    let to_c = a.routing_table().get(&rid(C)).unwrap();
    assert_eq!(to_c.cost, 2);
    assert!(!to_c.has_distinct_backup());
}

#[test]
fn data_follows_primary_path() {
    init_logging();
    let mut sim = triangle(Variant::TrafficLight);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    sim.drain_events();

    let id = sim.send_data(rid(A), rid(C), b"hello".to_vec()).unwrap();
    sim.run_for(secs(1)).unwrap();

    let events = sim.drain_events();
    assert!(events.iter().any(|(router, _, e)| *router == rid(A)
        && matches!(e, Event::PacketForwarded { id: i, next_hop, choice: PathChoice::Primary, .. } if *i == id && *next_hop == rid(B))));
    assert!(events.iter().any(|(router, _, e)| *router == rid(C)
        && matches!(e, Event::PacketDelivered { id: i, source, hops: 2 } if *i == id && *source == rid(A))));
}

#[test]
fn red_neighbors_divert_then_hold() {
    init_logging();
    let mut sim = triangle(Variant::TrafficLight);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();

    // B congested: A sends towards C over the direct backup link.
    sim.set_queue_occupancy(rid(B), "ba", 0.95).unwrap();
    sim.set_queue_occupancy(rid(B), "bc", 0.95).unwrap();
    sim.run_for(secs(3)).unwrap();
    assert_eq!(sim.router(rid(B)).unwrap().color(), Color::Red);
    assert_eq!(sim.router(rid(A)).unwrap().arbiter().neighbor_color(rid(B)), Color::Red);
    sim.drain_events();

    let diverted = sim.send_data(rid(A), rid(C), vec![1]).unwrap();
    sim.run_for(secs(1)).unwrap();
    let events = sim.drain_events();
    assert!(events.iter().any(|(_, _, e)| matches!(e,
        Event::PacketForwarded { id, next_hop, choice: PathChoice::Backup, .. } if *id == diverted && *next_hop == rid(C))));
    assert!(events.iter().any(|(_, _, e)| matches!(e, Event::PacketDelivered { id, .. } if *id == diverted)));

    // C congested as well: nowhere to go, so the packet waits and expires.
    sim.set_queue_occupancy(rid(C), "cb", 0.95).unwrap();
    sim.set_queue_occupancy(rid(C), "ca", 0.95).unwrap();
    sim.run_for(secs(3)).unwrap();
    assert_eq!(sim.router(rid(A)).unwrap().arbiter().neighbor_color(rid(C)), Color::Red);
    sim.drain_events();

    let held = sim.send_data(rid(A), rid(C), vec![2]).unwrap();
    assert_eq!(sim.router(rid(A)).unwrap().hold_queue_len(), 1);
    sim.run_for(Duration::from_millis(250)).unwrap();
    assert_eq!(sim.router(rid(A)).unwrap().hold_queue_len(), 1);
    sim.run_for(secs(1)).unwrap();
    assert_eq!(sim.router(rid(A)).unwrap().hold_queue_len(), 0);

    let events = sim.drain_events();
    assert!(events.iter().any(|(_, _, e)| matches!(e, Event::PacketHeld { id, .. } if *id == held)));
    assert!(events.iter().any(|(_, _, e)| matches!(e,
        Event::PacketDropped { id, reason: DropReason::HoldExpired, .. } if *id == held)));
    assert!(!events.iter().any(|(_, _, e)| matches!(e, Event::PacketDelivered { id, .. } if *id == held)));
}

#[test]
fn full_hold_queue_evicts_oldest_packet() {
    init_logging();
    let mut sim = triangle_with(Variant::TrafficLight, |config| {
        config.hold_queue.capacity = 2;
        config.hold_queue.time_to_wait = 50;
    });
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    for (router, iface) in [(B, "ba"), (B, "bc"), (C, "cb"), (C, "ca")] {
        sim.set_queue_occupancy(rid(router), iface, 0.95).unwrap();
    }
    sim.run_for(secs(3)).unwrap();
    assert_eq!(sim.router(rid(A)).unwrap().arbiter().neighbor_color(rid(B)), Color::Red);
    assert_eq!(sim.router(rid(A)).unwrap().arbiter().neighbor_color(rid(C)), Color::Red);
    sim.drain_events();

    let ids: Vec<u64> = (0..3u8).map(|n| sim.send_data(rid(A), rid(C), vec![n]).unwrap()).collect();
    assert_eq!(sim.router(rid(A)).unwrap().hold_queue_len(), 2);

    let events = sim.drain_events();
    let overflowed: Vec<u64> = events
        .iter()
        .filter_map(|(_, _, e)| match e {
            Event::PacketDropped {
                id,
                reason: DropReason::HoldQueueOverflow,
                ..
            } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(overflowed, vec![ids[0]]);
    let held = sim.router(rid(A)).unwrap().arbiter().hold_queue().iter().map(|e| e.packet.id).collect::<Vec<_>>();
    assert_eq!(held, ids[1..].to_vec());
}

#[test]
fn delayed_computation_installs_whole_table_at_once() {
    init_logging();
    let mut sim = triangle_with(Variant::TrafficLight, |config| config.spf_delay_ms = 2000);
    sim.start().unwrap();
    sim.run_for(secs(1)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Full);
    assert_eq!(state(&sim, A, C), NeighborState::Full);
    assert!(sim.router(rid(A)).unwrap().routing_table().is_empty());

    sim.run_for(secs(2)).unwrap();
    let table = sim.router(rid(A)).unwrap().routing_table();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(&rid(C)).unwrap().cost, 2);

    let installs: Vec<(Duration, usize)> = sim
        .drain_events()
        .into_iter()
        .filter_map(|(router, at, event)| match event {
            Event::RoutesInstalled { routes } if router == rid(A) => Some((at, routes)),
            _ => None,
        })
        .collect();
    assert_eq!(installs, vec![(secs(2), 2)]);
}

#[test]
fn link_failure_reconverges_around_it() {
    init_logging();
    let mut sim = triangle(Variant::TrafficLight);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();

    sim.set_link_up(rid(A), "ab", false).unwrap();
    sim.run_for(secs(5)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Down);
    assert!(sim.lsdbs_agree());
    let to_b = sim.router(rid(A)).unwrap().routing_table().get(&rid(B)).cloned().unwrap();
    assert_eq!(to_b.cost, 4);
    assert_eq!(to_b.primary.router, rid(C));

    sim.set_link_up(rid(A), "ab", true).unwrap();
    sim.run_for(secs(30)).unwrap();
    let to_b = sim.router(rid(A)).unwrap().routing_table().get(&rid(B)).cloned().unwrap();
    assert_eq!(to_b.cost, 1);
    assert_eq!(to_b.primary.router, rid(B));
}

#[test]
fn silent_failure_detected_by_dead_interval() {
    init_logging();
    let mut sim = pair(Variant::Ospf);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Full);

    sim.set_link_blackholed(rid(A), "isl0", true).unwrap();
    sim.run_for(secs(20)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Full);
    sim.run_for(secs(40)).unwrap();
    assert_eq!(state(&sim, A, B), NeighborState::Down);
    assert_eq!(state(&sim, B, A), NeighborState::Down);
    assert!(sim.router(rid(A)).unwrap().routing_table().is_empty());
    assert!(sim.lost_packets() > 0);
}

#[test]
fn unreachable_router_ages_out_everywhere() {
    init_logging();
    let mut sim = Simulation::new();
    sim.add_router(RouterConfig::new(rid(A), Variant::Ospf).with_interface("ab", "10.0.1.1/30".parse().unwrap(), 1))
        .unwrap();
    sim.add_router(
        RouterConfig::new(rid(B), Variant::Ospf)
            .with_interface("ba", "10.0.1.2/30".parse().unwrap(), 1)
            .with_interface("bc", "10.0.2.1/30".parse().unwrap(), 1),
    )
    .unwrap();
    sim.add_router(RouterConfig::new(rid(C), Variant::Ospf).with_interface("cb", "10.0.2.2/30".parse().unwrap(), 1))
        .unwrap();
    let delay = Duration::from_millis(5);
    sim.connect(rid(A), "ab", rid(B), "ba", delay).unwrap();
    sim.connect(rid(B), "bc", rid(C), "cb", delay).unwrap();
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    let c_key = LsaKey::router(rid(C));
    assert!(sim.router(rid(A)).unwrap().lsdb().has(&c_key));

    sim.set_link_blackholed(rid(B), "bc", true).unwrap();
    sim.run_for(secs(60)).unwrap();
    assert_eq!(state(&sim, B, C), NeighborState::Down);
    assert!(sim.router(rid(A)).unwrap().routing_table().get(&rid(C)).is_none());
    // Still held until it ages out.
    assert!(sim.router(rid(A)).unwrap().lsdb().has(&c_key));

    sim.run_until(secs(3700)).unwrap();
    assert!(!sim.router(rid(A)).unwrap().lsdb().has(&c_key));
    assert!(!sim.router(rid(B)).unwrap().lsdb().has(&c_key));
    assert_eq!(state(&sim, A, B), NeighborState::Full);
    assert!(sim.router(rid(A)).unwrap().routing_table().get(&rid(B)).is_some());
}

#[test]
fn hello_interval_mismatch_blocks_adjacency() {
    init_logging();
    let mut sim = Simulation::new();
    sim.add_router(RouterConfig::new(rid(A), Variant::Ospf).with_interface("isl0", "10.0.0.1/30".parse().unwrap(), 10))
        .unwrap();
    let mut b = RouterConfig::new(rid(B), Variant::Ospf).with_interface("isl0", "10.0.0.2/30".parse().unwrap(), 10);
    b.hello_interval = 5;
    b.dead_interval = 20;
    sim.add_router(b).unwrap();
    sim.connect(rid(A), "isl0", rid(B), "isl0", Duration::from_millis(5))
        .unwrap();
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();

    assert_eq!(state(&sim, A, B), NeighborState::Down);
    assert!(sim.router(rid(A)).unwrap().stats().hello_mismatches > 0);
    assert!(sim.router(rid(B)).unwrap().stats().hello_mismatches > 0);
}

#[test]
fn larger_neighbor_mtu_stalls_exchange() {
    init_logging();
    let mut sim = Simulation::new();
    sim.add_router(RouterConfig::new(rid(A), Variant::TrafficLight).with_interface("isl0", "10.0.0.1/30".parse().unwrap(), 10))
        .unwrap();
    let mut b = RouterConfig::new(rid(B), Variant::TrafficLight);
    b.add_interface(InterfaceConfig {
        name: "isl0".into(),
        address: "10.0.0.2/30".parse().unwrap(),
        cost: 10,
        mtu: 9000,
    });
    sim.add_router(b).unwrap();
    sim.connect(rid(A), "isl0", rid(B), "isl0", Duration::from_millis(5))
        .unwrap();
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();

    assert_eq!(state(&sim, A, B), NeighborState::ExStart);
    assert_ne!(state(&sim, B, A), NeighborState::Full);
    assert!(sim.router(rid(A)).unwrap().stats().rejected_packets > 0);
    assert!(sim.router(rid(A)).unwrap().routing_table().is_empty());
}

#[test]
fn lsa_refresh_bumps_sequence() {
    init_logging();
    let mut sim = pair(Variant::Ospf);
    sim.start().unwrap();
    sim.run_for(secs(30)).unwrap();
    let now = sim.now();
    let before = sim.router(rid(A)).unwrap().lsdb().self_lsa(now).unwrap().header.sequence;

    sim.run_until(secs(1810)).unwrap();
    let now = sim.now();
    let after = sim.router(rid(A)).unwrap().lsdb().self_lsa(now).unwrap().header.sequence;
    assert_eq!(after, before + 1);
    assert!(sim.lsdbs_agree());
    assert_eq!(state(&sim, A, B), NeighborState::Full);
}
