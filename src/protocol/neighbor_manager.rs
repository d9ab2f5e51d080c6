use log::{debug, info, warn};
use std::cmp::Ordering;
use std::net::Ipv4Addr;

use super::codec;
use super::events::Event;
use super::lsa::LsaHeader;
use super::messages::*;
use super::neighbor::{Adjacency, DdSummary, NeighborState};
use super::types::*;
use super::{Router, flooding};
use crate::RouterId;
use crate::error::{Error, Result};
use crate::forwarding::Color;
use crate::network::{Destination, Timer};

const LS_REQUEST_ENTRY_LEN: usize = 12;

pub(super) fn handle_hello(
    router: &mut Router,
    iface: &str,
    source: Ipv4Addr,
    sender: RouterId,
    hello: HelloMessage,
) -> Result<()> {
    let local_addr = router
        .config
        .interface(iface)
        .map(|i| i.address.addr())
        .ok_or_else(|| Error::UnknownInterface(iface.to_string()))?;

    if hello.hello_interval != router.config.hello_interval || hello.dead_interval != router.config.dead_interval {
        router.stats.hello_mismatches += 1;
        warn!(
            "Router {}: HELLO from {} on {} has intervals {}/{}s, expected {}/{}s",
            router.id(),
            sender,
            iface,
            hello.hello_interval,
            hello.dead_interval,
            router.config.hello_interval,
            router.config.dead_interval
        );
        return Ok(());
    }

    let previous = router.adjacencies.get(iface).map(|a| a.neighbor_id);
    if let Some(previous) = previous.filter(|p| *p != sender) {
        warn!(
            "Router {}: neighbor on {} changed from {} to {}",
            router.id(),
            iface,
            previous,
            sender
        );
        kill_adjacency(router, iface)?;
    }

    let dead_interval = router.config.dead_interval();
    let dead_at = router.now() + dead_interval;
    if !router.adjacencies.contains_key(iface) {
        info!("Router {}: 🟢 new neighbor {} on {} ({})", router.id(), sender, iface, source);
        router
            .adjacencies
            .insert(iface.to_string(), Adjacency::new(iface, local_addr, sender, source, dead_at));
    }
    {
        let adj = router.adjacency_mut(iface)?;
        adj.dead_at = dead_at;
        adj.neighbor_addr = source;
    }
    router.arm(Timer::Inactivity { iface: iface.to_string() }, dead_interval);

    if state_of(router, iface) == NeighborState::Down {
        transition(router, iface, NeighborState::Init)?;
        send_hello(router, iface);
    }

    let sees_us = hello.neighbors.contains(&router.id());
    match (sees_us, state_of(router, iface)) {
        (true, NeighborState::Init) => {
            transition(router, iface, NeighborState::TwoWay)?;
            if router.config.variant == Variant::TrafficLight {
                start_exchange(router, iface)?;
            }
        }
        (true, NeighborState::TwoWay) => start_exchange(router, iface)?,
        (false, state) if state >= NeighborState::TwoWay => {
            info!(
                "Router {}: neighbor {} on {} no longer lists us, back to Init",
                router.id(),
                sender,
                iface
            );
            reset_exchange_state(router, iface)?;
            transition(router, iface, NeighborState::Init)?;
            send_hello(router, iface);
        }
        _ => {}
    }
    Ok(())
}

pub(super) fn send_hello(router: &mut Router, iface: &str) {
    let Some(network_mask) = router.config.interface(iface).map(|i| i.address.netmask()) else {
        return;
    };
    if !router.topology.is_up(iface) {
        return;
    }
    let neighbors = router
        .adjacencies
        .get(iface)
        .filter(|a| a.state >= NeighborState::Init)
        .map(|a| vec![a.neighbor_id])
        .unwrap_or_default();

    let hello = HelloMessage {
        network_mask,
        hello_interval: router.config.hello_interval,
        options: OPTION_E,
        priority: DEFAULT_PRIORITY,
        dead_interval: router.config.dead_interval,
        designated_router: Ipv4Addr::UNSPECIFIED,
        backup_designated_router: Ipv4Addr::UNSPECIFIED,
        neighbors,
    };
    debug!("Router {} → HELLO on {}", router.id(), iface);
    router.send(iface, Destination::Broadcast, ProtocolMessage::Hello(hello));
}

/// Moves the adjacency on `iface` to `next`, recording the change. Entering
/// or leaving Full re-evaluates the self-originated LSA.
pub(super) fn transition(router: &mut Router, iface: &str, next: NeighborState) -> Result<()> {
    let (from, neighbor) = {
        let adj = router.adjacency_mut(iface)?;
        let from = adj.state;
        if from == next {
            return Ok(());
        }
        if !from.can_transition_to(next) {
            warn!("Adjacency on {}: refusing transition {} -> {}", iface, from, next);
            return Ok(());
        }
        adj.state = next;
        (from, adj.neighbor_id)
    };

    info!("Router {}: neighbor {} on {} {} -> {}", router.id(), neighbor, iface, from, next);
    router.record(Event::NeighborStateChanged {
        iface: iface.to_string(),
        neighbor,
        from,
        to: next,
    });

    if from == NeighborState::Full || next == NeighborState::Full {
        flooding::originate(router, false)?;
    }
    if next == NeighborState::Full && router.config.variant == Variant::TrafficLight {
        let color = router.congestion.current();
        if color != Color::Green {
            send_color(router, iface, color);
        }
    }
    Ok(())
}

/// Tears the adjacency down completely, as on link failure or dead timer.
pub(super) fn kill_adjacency(router: &mut Router, iface: &str) -> Result<()> {
    let Some(adj) = router.adjacencies.get(iface) else {
        return Ok(());
    };
    let neighbor = adj.neighbor_id;
    if adj.state != NeighborState::Down {
        transition(router, iface, NeighborState::Down)?;
    }
    router.adjacencies.remove(iface);
    disarm_exchange_timers(router, iface);
    router.disarm(&Timer::Inactivity { iface: iface.to_string() });
    router.arbiter.forget_neighbor(neighbor);
    Ok(())
}

fn state_of(router: &Router, iface: &str) -> NeighborState {
    router
        .adjacencies
        .get(iface)
        .map(|a| a.state)
        .unwrap_or(NeighborState::Down)
}

fn disarm_exchange_timers(router: &mut Router, iface: &str) {
    let iface = iface.to_string();
    router.disarm(&Timer::DdRetransmit { iface: iface.clone() });
    router.disarm(&Timer::LsRequestRetransmit { iface: iface.clone() });
    router.disarm(&Timer::LsRetransmit { iface });
}

fn reset_exchange_state(router: &mut Router, iface: &str) -> Result<()> {
    router.adjacency_mut(iface)?.clear_lists();
    disarm_exchange_timers(router, iface);
    Ok(())
}

/// Enters ExStart: fresh sequence number, empty lists, and an initial
/// I|M|MS description repeated until the neighbor answers.
fn start_exchange(router: &mut Router, iface: &str) -> Result<()> {
    router.dd_sequence_seed = router.dd_sequence_seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
    let sequence = router.dd_sequence_seed;
    reset_exchange_state(router, iface)?;
    router.adjacency_mut(iface)?.dd_sequence = sequence;
    transition(router, iface, NeighborState::ExStart)?;
    send_dd(router, iface, DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, Vec::new())?;
    let interval = router.config.retransmit_interval();
    router.arm(Timer::DdRetransmit { iface: iface.to_string() }, interval);
    Ok(())
}

/// SeqNumberMismatch and BadLSReq: renegotiate from scratch.
fn restart_exchange(router: &mut Router, iface: &str, reason: &str) -> Result<()> {
    router.stats.seq_mismatches += 1;
    warn!(
        "Router {}: adjacency on {} back to ExStart: {}",
        router.id(),
        iface,
        reason
    );
    start_exchange(router, iface)
}

fn send_dd(router: &mut Router, iface: &str, flags: u8, headers: Vec<LsaHeader>) -> Result<()> {
    let mtu = router.config.interface(iface).map(|i| i.mtu).unwrap_or(0);
    let (destination, sequence) = {
        let adj = router.adjacency_mut(iface)?;
        (adj.neighbor_addr, adj.dd_sequence)
    };
    let dd = DatabaseDescription {
        interface_mtu: mtu,
        options: OPTION_E,
        flags,
        sequence,
        headers,
    };
    debug!(
        "Router {} → DD on {} seq {:#x} flags {:#05b} ({} headers)",
        router.id(),
        iface,
        sequence,
        flags,
        dd.headers.len()
    );
    let bytes = router.send(iface, Destination::Unicast(destination), ProtocolMessage::DatabaseDescription(dd));
    router.adjacency_mut(iface)?.last_sent_dd = Some(bytes);
    Ok(())
}

/// Sends the next chunk of our summary list.
fn send_next_dd(router: &mut Router, iface: &str) -> Result<()> {
    let mtu = router.config.interface(iface).map(|i| i.mtu).unwrap_or(0);
    let limit = codec::dd_headers_per_packet(mtu);
    let (headers, flags, master) = {
        let adj = router.adjacency_mut(iface)?;
        let headers = adj.next_summaries(limit);
        let more = !adj.summary_list.is_empty();
        adj.dd_all_sent = !more;
        let mut flags = 0;
        if more {
            flags |= DD_FLAG_M;
        }
        if adj.is_master() {
            flags |= DD_FLAG_MS;
        }
        (headers, flags, adj.is_master())
    };
    send_dd(router, iface, flags, headers)?;
    if master {
        let interval = router.config.retransmit_interval();
        router.arm(Timer::DdRetransmit { iface: iface.to_string() }, interval);
    }
    Ok(())
}

/// Resends the last description verbatim.
fn resend_last_dd(router: &mut Router, iface: &str) -> Result<()> {
    let (destination, bytes) = {
        let adj = router.adjacency_mut(iface)?;
        (adj.neighbor_addr, adj.last_sent_dd.clone())
    };
    if let Some(bytes) = bytes {
        debug!("Router {} → DD retransmission on {}", router.id(), iface);
        router.send_bytes(iface, Destination::Unicast(destination), bytes);
    }
    Ok(())
}

/// DD retransmission timer: only ExStart and the master in Exchange
/// retransmit on their own; the slave answers duplicates instead.
pub(super) fn retransmit_dd(router: &mut Router, iface: &str) -> Result<()> {
    let Some(adj) = router.adjacencies.get(iface) else {
        return Ok(());
    };
    let active = adj.state == NeighborState::ExStart || (adj.state == NeighborState::Exchange && adj.is_master());
    if !active {
        return Ok(());
    }
    resend_last_dd(router, iface)?;
    let interval = router.config.retransmit_interval();
    router.arm(Timer::DdRetransmit { iface: iface.to_string() }, interval);
    Ok(())
}

pub(super) fn handle_database_description(router: &mut Router, iface: &str, dd: DatabaseDescription) -> Result<()> {
    let mtu = router.config.interface(iface).map(|i| i.mtu).unwrap_or(0);
    if dd.interface_mtu > mtu {
        router.stats.rejected_packets += 1;
        warn!(
            "Router {}: DD on {} advertises MTU {} above ours ({})",
            router.id(),
            iface,
            dd.interface_mtu,
            mtu
        );
        return Ok(());
    }

    let summary = DdSummary {
        flags: dd.flags,
        sequence: dd.sequence,
        options: dd.options,
    };
    let (state, neighbor_id, master, dd_sequence, last) = {
        let adj = router.adjacency_mut(iface)?;
        (adj.state, adj.neighbor_id, adj.is_master(), adj.dd_sequence, adj.last_received_dd)
    };
    let duplicate = last == Some(summary);

    match state {
        NeighborState::Down | NeighborState::Init | NeighborState::TwoWay => {
            debug!("Router {}: ignoring DD from {} in {}", router.id(), neighbor_id, state);
            Ok(())
        }
        NeighborState::ExStart => {
            let id = router.id();
            if dd.is_init() && dd.has_more() && dd.is_master() && dd.headers.is_empty() && neighbor_id > id {
                {
                    let adj = router.adjacency_mut(iface)?;
                    adj.role = Some(Role::Slave);
                    adj.dd_sequence = dd.sequence;
                }
                negotiation_done(router, iface)?;
                accept_dd(router, iface, &dd)
            } else if !dd.is_init() && !dd.is_master() && dd.sequence == dd_sequence && neighbor_id < id {
                router.adjacency_mut(iface)?.role = Some(Role::Master);
                negotiation_done(router, iface)?;
                accept_dd(router, iface, &dd)
            } else {
                debug!("Router {}: DD from {} does not settle negotiation", router.id(), neighbor_id);
                Ok(())
            }
        }
        NeighborState::Exchange => {
            if duplicate {
                return if master {
                    debug!("Router {}: discarding duplicate DD from {}", router.id(), neighbor_id);
                    Ok(())
                } else {
                    resend_last_dd(router, iface)
                };
            }
            if dd.is_master() == master {
                return restart_exchange(router, iface, "master/slave bit mismatch");
            }
            if dd.is_init() {
                return restart_exchange(router, iface, "unexpected initialize bit");
            }
            if last.is_some_and(|l| l.options != dd.options) {
                return restart_exchange(router, iface, "options changed mid-exchange");
            }
            let expected = if master { dd_sequence } else { dd_sequence.wrapping_add(1) };
            if dd.sequence != expected {
                return restart_exchange(
                    router,
                    iface,
                    &format!("sequence {:#x}, expected {:#x}", dd.sequence, expected),
                );
            }
            accept_dd(router, iface, &dd)
        }
        NeighborState::Loading | NeighborState::Full => {
            if duplicate {
                if !master {
                    resend_last_dd(router, iface)?;
                }
                return Ok(());
            }
            restart_exchange(router, iface, "description after exchange completed")
        }
    }
}

fn negotiation_done(router: &mut Router, iface: &str) -> Result<()> {
    let now = router.now();
    let headers = router.lsdb.headers(now);
    {
        let adj = router.adjacency_mut(iface)?;
        adj.summary_list = headers.into();
        adj.dd_all_sent = false;
    }
    router.disarm(&Timer::DdRetransmit { iface: iface.to_string() });
    transition(router, iface, NeighborState::Exchange)
}

/// Processes an in-sequence description: records what we are missing, then
/// either answers (slave) or advances the exchange (master).
fn accept_dd(router: &mut Router, iface: &str, dd: &DatabaseDescription) -> Result<()> {
    let now = router.now();
    let wanted: Vec<LsaHeader> = dd
        .headers
        .iter()
        .filter(|h| matches!(router.lsdb.compare(h, now), None | Some(Ordering::Greater)))
        .copied()
        .collect();

    let (master, done_after_send) = {
        let adj = router.adjacency_mut(iface)?;
        for header in wanted {
            adj.request_list.insert(header.key(), header);
        }
        adj.last_received_dd = Some(DdSummary {
            flags: dd.flags,
            sequence: dd.sequence,
            options: dd.options,
        });
        if adj.is_master() {
            adj.dd_sequence = adj.dd_sequence.wrapping_add(1);
            (true, adj.dd_all_sent && !dd.has_more())
        } else {
            adj.dd_sequence = dd.sequence;
            (false, false)
        }
    };

    if master {
        if done_after_send {
            return exchange_done(router, iface);
        }
        return send_next_dd(router, iface);
    }

    send_next_dd(router, iface)?;
    let all_sent = router.adjacency_mut(iface)?.dd_all_sent;
    if all_sent && !dd.has_more() {
        exchange_done(router, iface)?;
    }
    Ok(())
}

fn exchange_done(router: &mut Router, iface: &str) -> Result<()> {
    router.disarm(&Timer::DdRetransmit { iface: iface.to_string() });
    if router.adjacency_mut(iface)?.request_list.is_empty() {
        transition(router, iface, NeighborState::Full)
    } else {
        transition(router, iface, NeighborState::Loading)?;
        send_ls_request(router, iface)
    }
}

pub(super) fn send_ls_request(router: &mut Router, iface: &str) -> Result<()> {
    let mtu = router.config.interface(iface).map(|i| i.mtu).unwrap_or(0) as usize;
    let budget = (mtu.saturating_sub(PACKET_HEADER_LEN + 2) / LS_REQUEST_ENTRY_LEN).max(1);
    let (destination, entries) = {
        let adj = router.adjacency_mut(iface)?;
        let entries: Vec<LsRequestEntry> = adj.request_list.values().take(budget).map(LsRequestEntry::from).collect();
        (adj.neighbor_addr, entries)
    };
    if entries.is_empty() {
        router.disarm(&Timer::LsRequestRetransmit { iface: iface.to_string() });
        return Ok(());
    }
    debug!("Router {} → LSR on {} ({} entries)", router.id(), iface, entries.len());
    router.send(
        iface,
        Destination::Unicast(destination),
        ProtocolMessage::LinkStateRequest(LinkStateRequest { entries }),
    );
    let interval = router.config.retransmit_interval();
    router.arm(Timer::LsRequestRetransmit { iface: iface.to_string() }, interval);
    Ok(())
}

pub(super) fn retransmit_ls_request(router: &mut Router, iface: &str) -> Result<()> {
    match router.adjacencies.get(iface) {
        Some(adj) if adj.state.is_exchanging() => send_ls_request(router, iface),
        _ => Ok(()),
    }
}

pub(super) fn handle_ls_request(router: &mut Router, iface: &str, request: LinkStateRequest) -> Result<()> {
    let state = state_of(router, iface);
    if state < NeighborState::Exchange {
        debug!("Router {}: ignoring LSR on {} in {}", router.id(), iface, state);
        return Ok(());
    }

    let now = router.now();
    let mut lsas = Vec::with_capacity(request.entries.len());
    for entry in &request.entries {
        match router.lsdb.get(&entry.key(), now) {
            Some(lsa) => lsas.push(lsa),
            None => {
                router.stats.bad_ls_requests += 1;
                return restart_exchange(router, iface, &format!("request for unknown LSA {}", entry.key()));
            }
        }
    }
    flooding::send_update(router, iface, lsas);
    Ok(())
}

pub(super) fn handle_color(router: &mut Router, iface: &str, notification: ColorNotification) {
    if router.config.variant != Variant::TrafficLight {
        debug!("Router {}: ignoring color notification in plain variant", router.id());
        return;
    }
    let Some(neighbor) = router.adjacencies.get(iface).map(|a| a.neighbor_id) else {
        return;
    };
    if notification.origin != neighbor {
        warn!(
            "Router {}: color on {} claims origin {}, neighbor is {}",
            router.id(),
            iface,
            notification.origin,
            neighbor
        );
        return;
    }
    router.arbiter.set_neighbor_color(neighbor, notification.color);
}

pub(super) fn send_color(router: &mut Router, iface: &str, color: Color) {
    let Some(destination) = router.adjacencies.get(iface).map(|a| a.neighbor_addr) else {
        return;
    };
    router.stats.color_notifications += 1;
    let notification = ColorNotification {
        origin: router.id(),
        color,
    };
    router.send(iface, Destination::Unicast(destination), ProtocolMessage::Color(notification));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::network::{Clock, InterfaceStatus, TimerHandle, Topology, Transport};
    use crate::protocol::lsa::{Lsa, LsaKey, LsaType};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    struct StillClock;

    impl Clock for StillClock {
        fn now(&self) -> Duration {
            Duration::ZERO
        }
        fn schedule(&mut self, _at: Duration, _timer: Timer) -> TimerHandle {
            TimerHandle(0)
        }
        fn cancel(&mut self, _handle: TimerHandle) {}
    }

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<Vec<u8>>>>);

    impl Transport for Capture {
        fn send(&mut self, _iface: &str, _destination: Destination, bytes: Vec<u8>) {
            self.0.borrow_mut().push(bytes);
        }
    }

    struct OneLink;

    impl Topology for OneLink {
        fn interfaces(&self) -> Vec<InterfaceStatus> {
            vec![InterfaceStatus::new("eth0", true)]
        }
        fn queue_occupancy(&self, _iface: &str) -> f64 {
            0.0
        }
    }

    const PEER: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
    const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn router(capture: &Capture) -> Router {
        let config = RouterConfig::new(Ipv4Addr::new(1, 1, 1, 1), Variant::Ospf)
            .with_interface("eth0", "10.0.0.1/30".parse().unwrap(), 10);
        Router::new(config, Box::new(StillClock), Box::new(capture.clone()), Box::new(OneLink)).unwrap()
    }

    fn hello(neighbors: Vec<RouterId>) -> HelloMessage {
        HelloMessage {
            network_mask: Ipv4Addr::new(255, 255, 255, 252),
            hello_interval: 10,
            options: OPTION_E,
            priority: DEFAULT_PRIORITY,
            dead_interval: 40,
            designated_router: Ipv4Addr::UNSPECIFIED,
            backup_designated_router: Ipv4Addr::UNSPECIFIED,
            neighbors,
        }
    }

    fn dd(flags: u8, sequence: u32) -> DatabaseDescription {
        DatabaseDescription {
            interface_mtu: 1500,
            options: OPTION_E,
            flags,
            sequence,
            headers: Vec::new(),
        }
    }

    /// Drives the adjacency with 2.2.2.2 into ExStart; we are the slave.
    fn in_exstart(capture: &Capture) -> Router {
        let mut r = router(capture);
        let us = r.id();
        handle_hello(&mut r, "eth0", PEER_ADDR, PEER, hello(vec![])).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Init);
        handle_hello(&mut r, "eth0", PEER_ADDR, PEER, hello(vec![us])).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::TwoWay);
        handle_hello(&mut r, "eth0", PEER_ADDR, PEER, hello(vec![us])).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::ExStart);
        r
    }

    #[test]
    fn slave_repeats_last_description_on_duplicate() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);

        let init = dd(DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, 100);
        handle_database_description(&mut r, "eth0", init.clone()).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Exchange);
        assert_eq!(r.adjacency("eth0").unwrap().role, Some(Role::Slave));
        let answer = capture.0.borrow().last().cloned().unwrap();

        handle_database_description(&mut r, "eth0", init).unwrap();
        assert_eq!(capture.0.borrow().last().cloned().unwrap(), answer);
        assert_eq!(r.neighbor_state(PEER), NeighborState::Exchange);

        handle_database_description(&mut r, "eth0", dd(DD_FLAG_MS, 101)).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Full);
    }

    fn last_sent(capture: &Capture) -> ProtocolMessage {
        let bytes = capture.0.borrow().last().cloned().unwrap();
        codec::decode(&bytes).unwrap().message
    }

    #[test]
    fn missing_lsas_are_requested_in_loading() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);
        handle_database_description(&mut r, "eth0", dd(DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, 100)).unwrap();

        let remote = Ipv4Addr::new(3, 3, 3, 3);
        let lsa = Lsa::new_router_lsa(remote, INITIAL_SEQUENCE_NUMBER, vec![]);
        let mut last = dd(DD_FLAG_MS, 101);
        last.headers = vec![lsa.header];
        handle_database_description(&mut r, "eth0", last).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Loading);
        match last_sent(&capture) {
            ProtocolMessage::LinkStateRequest(request) => {
                assert_eq!(request.entries.len(), 1);
                assert_eq!(request.entries[0].key(), LsaKey::router(remote));
            }
            other => panic!("expected a request, sent {other:?}"),
        }

        flooding::handle_update(&mut r, "eth0", LinkStateUpdate { lsas: vec![lsa] }).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Full);
        assert!(r.lsdb().has(&LsaKey::router(remote)));
        assert!(r.adjacency("eth0").unwrap().request_list.is_empty());
    }

    #[test]
    fn request_for_unknown_lsa_restarts_exchange() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);
        handle_database_description(&mut r, "eth0", dd(DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, 100)).unwrap();
        handle_database_description(&mut r, "eth0", dd(DD_FLAG_MS, 101)).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Full);

        let own = LinkStateRequest {
            entries: vec![LsRequestEntry::from(&r.lsdb().self_lsa(r.now()).unwrap().header)],
        };
        handle_ls_request(&mut r, "eth0", own).unwrap();
        assert!(matches!(last_sent(&capture), ProtocolMessage::LinkStateUpdate(_)));
        assert_eq!(r.neighbor_state(PEER), NeighborState::Full);

        let unknown = Ipv4Addr::new(9, 9, 9, 9);
        let bogus = LinkStateRequest {
            entries: vec![LsRequestEntry {
                ls_type: LsaType::Router,
                link_state_id: unknown,
                advertising_router: unknown,
            }],
        };
        handle_ls_request(&mut r, "eth0", bogus).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::ExStart);
        assert_eq!(r.stats().bad_ls_requests, 1);
        assert!(r.adjacency("eth0").unwrap().role.is_none());
    }

    #[test]
    fn out_of_sequence_description_restarts_exchange() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);
        handle_database_description(&mut r, "eth0", dd(DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, 100)).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Exchange);

        handle_database_description(&mut r, "eth0", dd(DD_FLAG_MS, 105)).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::ExStart);
        assert_eq!(r.stats().seq_mismatches, 1);
        assert!(r.adjacency("eth0").unwrap().role.is_none());
    }

    #[test]
    fn lower_id_initial_description_does_not_settle() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);
        let mut adj = r.adjacency("eth0").unwrap().clone();
        adj.neighbor_id = Ipv4Addr::new(0, 0, 0, 9);
        r.adjacencies.insert("eth0".into(), adj);

        handle_database_description(&mut r, "eth0", dd(DD_FLAG_I | DD_FLAG_M | DD_FLAG_MS, 7)).unwrap();
        assert_eq!(r.adjacency("eth0").unwrap().state, NeighborState::ExStart);
    }

    #[test]
    fn one_way_hello_demotes_to_init() {
        let capture = Capture::default();
        let mut r = in_exstart(&capture);
        let sent = capture.0.borrow().len();
        handle_hello(&mut r, "eth0", PEER_ADDR, PEER, hello(vec![])).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Init);
        // Triggered greeting.
        assert_eq!(capture.0.borrow().len(), sent + 1);
    }

    #[test]
    fn mismatched_intervals_are_ignored() {
        let capture = Capture::default();
        let mut r = router(&capture);
        let mut bad = hello(vec![]);
        bad.dead_interval = 30;
        handle_hello(&mut r, "eth0", PEER_ADDR, PEER, bad).unwrap();
        assert_eq!(r.neighbor_state(PEER), NeighborState::Down);
        assert_eq!(r.stats().hello_mismatches, 1);
    }
}
