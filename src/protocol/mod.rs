//! The link-state protocol engine.
//!
//! A [`Router`] owns all per-node state (adjacencies, LSDB, routing table,
//! hold queue) and is driven entirely by callbacks from its host: packet
//! arrivals, link changes and timer expirations. Scheduling, transmission
//! and interface status come from injected collaborators, so the engine has
//! no dependency on any particular event loop.

pub mod codec;
pub mod events;
pub mod lsa;
pub mod lsdb;
pub mod messages;
pub mod neighbor;
pub mod routing_table;
pub mod types;

mod flooding;
mod message_handler;
mod neighbor_manager;
mod route_manager;
mod task_manager;

pub use events::{Event, EventLog, RouterStats};
pub use lsa::{LinkRecord, Lsa, LsaHeader, LsaKey, LsaType, compare_freshness};
pub use lsdb::{AddOutcome, LinkStateDatabase};
pub use messages::*;
pub use neighbor::{Adjacency, DdSummary, NeighborState};
pub use routing_table::{NextHop, RoutingTable, RoutingTableEntry};
pub use types::*;

use log::{error, info, warn};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::RouterId;
use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::forwarding::{Color, CongestionMonitor, ForwardingArbiter};
use crate::network::{Clock, Destination, Timer, TimerSet, Topology, Transport};

pub struct Router {
    config: RouterConfig,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport>,
    topology: Box<dyn Topology>,
    timers: TimerSet,
    /// Keyed by interface name; point-to-point links carry one neighbor each.
    adjacencies: BTreeMap<String, Adjacency>,
    lsdb: LinkStateDatabase,
    arbiter: ForwardingArbiter,
    congestion: CongestionMonitor,
    /// Computed table waiting out the configured computation delay.
    pending_table: Option<RoutingTable>,
    stats: RouterStats,
    events: EventLog,
    dd_sequence_seed: u32,
    next_packet_id: u64,
    started: bool,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        clock: Box<dyn Clock>,
        transport: Box<dyn Transport>,
        topology: Box<dyn Topology>,
    ) -> Result<Self> {
        config.validate()?;
        let id = config.router_id;
        let arbiter = ForwardingArbiter::new(
            id,
            config.variant,
            config.hold_queue.capacity,
            config.hold_queue.time_to_wait,
        );
        let congestion = CongestionMonitor::new(&config.congestion);
        Ok(Self {
            lsdb: LinkStateDatabase::new(id),
            arbiter,
            congestion,
            dd_sequence_seed: id.to_bits().rotate_left(13),
            next_packet_id: 0,
            timers: TimerSet::new(),
            adjacencies: BTreeMap::new(),
            pending_table: None,
            stats: RouterStats::default(),
            events: EventLog::default(),
            started: false,
            config,
            clock,
            transport,
            topology,
        })
    }

    /// Originates the initial self-LSA and starts greeting on every
    /// interface that is up.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        info!(
            "Router {} starting ({} variant, {} interfaces)",
            self.id(),
            self.config.variant,
            self.config.interfaces.len()
        );
        task_manager::start(self)
    }

    pub fn on_packet_arrival(&mut self, iface: &str, source: Ipv4Addr, bytes: &[u8]) -> Result<()> {
        self.stats.packets_received += 1;
        match message_handler::handle_packet(self, iface, source, bytes) {
            Err(e) if e.is_fatal() => {
                error!("Router {}: fatal error handling packet on {}: {}", self.id(), iface, e);
                Err(e)
            }
            Err(e) => {
                warn!("Router {}: dropped packet on {} from {}: {}", self.id(), iface, source, e);
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    pub fn on_link_up(&mut self, iface: &str) -> Result<()> {
        task_manager::link_up(self, iface)
    }

    pub fn on_link_down(&mut self, iface: &str) -> Result<()> {
        task_manager::link_down(self, iface)
    }

    pub fn on_timer(&mut self, timer: Timer) -> Result<()> {
        self.timers.fired(&timer);
        task_manager::handle_timer(self, timer)
    }

    /// Injects locally generated traffic; returns the packet id.
    pub fn send_data(&mut self, destination: RouterId, payload: Vec<u8>) -> u64 {
        self.next_packet_id += 1;
        let id = ((self.id().to_bits() as u64) << 32) | self.next_packet_id;
        let packet = DataPacket::new(self.id(), destination, id, self.config.data_ttl, payload);
        route_manager::forward_data(self, packet);
        id
    }

    pub fn id(&self) -> RouterId {
        self.config.router_id
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn adjacencies(&self) -> impl Iterator<Item = &Adjacency> {
        self.adjacencies.values()
    }

    pub fn adjacency(&self, iface: &str) -> Option<&Adjacency> {
        self.adjacencies.get(iface)
    }

    /// State of the adjacency with `neighbor`, `Down` if there is none.
    pub fn neighbor_state(&self, neighbor: RouterId) -> NeighborState {
        self.adjacencies
            .values()
            .find(|a| a.neighbor_id == neighbor)
            .map(|a| a.state)
            .unwrap_or(NeighborState::Down)
    }

    pub fn lsdb(&self) -> &LinkStateDatabase {
        &self.lsdb
    }

    pub fn routing_table(&self) -> &RoutingTable {
        self.arbiter.table()
    }

    pub fn arbiter(&self) -> &ForwardingArbiter {
        &self.arbiter
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn color(&self) -> Color {
        self.congestion.current()
    }

    pub fn hold_queue_len(&self) -> usize {
        self.arbiter.hold_queue().len()
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<(Duration, Event)> {
        self.events.drain()
    }

    fn record(&mut self, event: Event) {
        let now = self.clock.now();
        self.events.record(now, event);
    }

    fn arm(&mut self, timer: Timer, delay: Duration) {
        self.timers.arm_after(self.clock.as_mut(), timer, delay);
    }

    fn ensure_armed(&mut self, timer: Timer, delay: Duration) {
        self.timers.ensure_armed(self.clock.as_mut(), timer, delay);
    }

    fn disarm(&mut self, timer: &Timer) {
        self.timers.disarm(self.clock.as_mut(), timer);
    }

    fn disarm_iface(&mut self, iface: &str) {
        self.timers.disarm_iface(self.clock.as_mut(), iface);
    }

    fn packet(&self, message: ProtocolMessage) -> Packet {
        Packet {
            router_id: self.id(),
            area_id: self.config.area_id,
            message,
        }
    }

    /// Encodes and transmits `message`, returning the encoded bytes.
    fn send(&mut self, iface: &str, destination: Destination, message: ProtocolMessage) -> Vec<u8> {
        let bytes = codec::encode(&self.packet(message));
        self.send_bytes(iface, destination, bytes.clone());
        bytes
    }

    fn send_bytes(&mut self, iface: &str, destination: Destination, bytes: Vec<u8>) {
        self.stats.packets_sent += 1;
        self.transport.send(iface, destination, bytes);
    }

    fn adjacency_mut(&mut self, iface: &str) -> Result<&mut Adjacency> {
        self.adjacencies
            .get_mut(iface)
            .ok_or_else(|| Error::UnknownInterface(iface.to_string()))
    }

    fn interface_cost(&self, iface: &str) -> u32 {
        self.config.interface(iface).map(|i| i.cost).unwrap_or(u32::MAX)
    }

    /// Whether `router` is a neighbor with a usable (Full) adjacency.
    fn is_adjacent(&self, router: RouterId) -> bool {
        self.adjacencies
            .values()
            .any(|a| a.neighbor_id == router && a.is_full())
    }

    fn any_exchanging(&self) -> bool {
        self.adjacencies.values().any(|a| a.state.is_exchanging())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id())
            .field("variant", &self.config.variant)
            .field("adjacencies", &self.adjacencies.len())
            .field("lsdb", &self.lsdb.len())
            .field("routes", &self.arbiter.table().len())
            .finish()
    }
}
