//! Startup, link notifications and timer dispatch.

use log::{info, warn};

use super::events::Event;
use super::types::Variant;
use super::{Router, flooding, neighbor_manager, route_manager};
use crate::error::{Error, Result};
use crate::network::Timer;

pub(super) fn start(router: &mut Router) -> Result<()> {
    flooding::originate(router, false)?;

    let refresh = router.config.lsa_refresh_interval();
    router.arm(Timer::LsaRefresh, refresh);
    if router.config.variant == Variant::TrafficLight {
        let interval = router.config.congestion.check_interval();
        router.arm(Timer::CongestionCheck, interval);
    }

    let ifaces: Vec<String> = router.config.interfaces.iter().map(|i| i.name.clone()).collect();
    for iface in ifaces {
        if router.topology.is_up(&iface) {
            start_greeting(router, &iface);
        } else {
            info!("Router {}: {} is down at startup", router.id(), iface);
        }
    }
    Ok(())
}

fn start_greeting(router: &mut Router, iface: &str) {
    neighbor_manager::send_hello(router, iface);
    let interval = router.config.hello_interval();
    router.arm(Timer::Hello { iface: iface.to_string() }, interval);
}

pub(super) fn link_up(router: &mut Router, iface: &str) -> Result<()> {
    if router.config.interface(iface).is_none() {
        return Err(Error::UnknownInterface(iface.to_string()));
    }
    info!("Router {}: link {} up", router.id(), iface);
    if router.started {
        start_greeting(router, iface);
    }
    Ok(())
}

pub(super) fn link_down(router: &mut Router, iface: &str) -> Result<()> {
    if router.config.interface(iface).is_none() {
        return Err(Error::UnknownInterface(iface.to_string()));
    }
    info!("Router {}: link {} down", router.id(), iface);
    neighbor_manager::kill_adjacency(router, iface)?;
    router.disarm_iface(iface);
    Ok(())
}

pub(super) fn handle_timer(router: &mut Router, timer: Timer) -> Result<()> {
    match timer {
        Timer::Hello { iface } => {
            if router.topology.is_up(&iface) {
                start_greeting(router, &iface);
            }
            Ok(())
        }
        Timer::Inactivity { iface } => {
            let expired = router
                .adjacencies
                .get(&iface)
                .is_some_and(|a| a.dead_at <= router.now());
            if !expired {
                return Ok(());
            }
            warn!("Router {}: 🔴 neighbor on {} is dead", router.id(), iface);
            neighbor_manager::kill_adjacency(router, &iface)
        }
        Timer::DdRetransmit { iface } => neighbor_manager::retransmit_dd(router, &iface),
        Timer::LsRequestRetransmit { iface } => neighbor_manager::retransmit_ls_request(router, &iface),
        Timer::LsRetransmit { iface } => {
            flooding::retransmit(router, &iface);
            Ok(())
        }
        Timer::LsaAging => flooding::age_out(router),
        Timer::LsaRefresh => {
            flooding::originate(router, true)?;
            let refresh = router.config.lsa_refresh_interval();
            router.arm(Timer::LsaRefresh, refresh);
            Ok(())
        }
        Timer::RouteInstall => {
            route_manager::install_pending(router);
            Ok(())
        }
        Timer::CongestionCheck => {
            check_congestion(router);
            Ok(())
        }
        Timer::HoldQueue => {
            route_manager::process_hold_queue(router);
            Ok(())
        }
    }
}

/// Recolors our links from mean queue occupancy and tells every Full
/// neighbor, but only when the color actually changed.
fn check_congestion(router: &mut Router) {
    let occupancy = router.topology.mean_occupancy();
    if let Some(color) = router.congestion.evaluate(occupancy) {
        info!("Router {}: congestion color now {} (occupancy {:.2})", router.id(), color, occupancy);
        router.record(Event::ColorChanged { color });
        let neighbors: Vec<String> = router
            .adjacencies
            .values()
            .filter(|a| a.is_full())
            .map(|a| a.iface.clone())
            .collect();
        for iface in neighbors {
            neighbor_manager::send_color(router, &iface, color);
        }
    }
    let interval = router.config.congestion.check_interval();
    router.arm(Timer::CongestionCheck, interval);
}
