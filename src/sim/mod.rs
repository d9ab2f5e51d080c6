//! In-memory harness that drives a set of routers over point-to-point links
//! on one logical clock. Used by the scenario tests and the binary.

mod event_queue;
mod host;

pub use event_queue::EventQueue;

use log::{debug, info};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use crate::RouterId;
use crate::config::{RouterConfig, SimulationConfig};
use crate::error::{Error, Result};
use crate::network::Timer;
use crate::protocol::{Event, Router};
use host::{SimClock, SimTopology, SimTransport};

#[derive(Debug, Clone)]
struct Endpoint {
    node: usize,
    iface: String,
    addr: Ipv4Addr,
}

#[derive(Debug)]
struct SimLink {
    a: Endpoint,
    b: Endpoint,
    delay: Duration,
    up: bool,
    /// Up as far as the routers can tell, but every packet is lost.
    blackholed: bool,
}

impl SimLink {
    fn carries(&self) -> bool {
        self.up && !self.blackholed
    }
}

#[derive(Debug)]
enum Action {
    Timer(Timer),
    Deliver {
        iface: String,
        source: Ipv4Addr,
        bytes: Vec<u8>,
    },
}

/// State shared between the harness and every router's collaborators.
#[derive(Default)]
struct SimCore {
    now: Duration,
    queue: EventQueue<(usize, Action)>,
    cancelled: HashSet<u64>,
    links: Vec<SimLink>,
    occupancy: HashMap<(usize, String), f64>,
    lost: u64,
}

impl SimCore {
    fn link_of(&self, node: usize, iface: &str) -> Option<&SimLink> {
        self.links.iter().find(|l| {
            (l.a.node == node && l.a.iface == iface) || (l.b.node == node && l.b.iface == iface)
        })
    }

    fn link_of_mut(&mut self, node: usize, iface: &str) -> Option<&mut SimLink> {
        self.links.iter_mut().find(|l| {
            (l.a.node == node && l.a.iface == iface) || (l.b.node == node && l.b.iface == iface)
        })
    }

    /// (local end, remote end, delay, carrying) of the link attached to `iface`.
    fn endpoints(&self, node: usize, iface: &str) -> Option<(Endpoint, Endpoint, Duration, bool)> {
        let link = self.link_of(node, iface)?;
        let (local, remote) = if link.a.node == node && link.a.iface == iface {
            (&link.a, &link.b)
        } else {
            (&link.b, &link.a)
        };
        Some((local.clone(), remote.clone(), link.delay, link.carries()))
    }

    /// Unconnected interfaces count as down.
    fn is_up(&self, node: usize, iface: &str) -> bool {
        self.link_of(node, iface).is_some_and(|l| l.up)
    }

    fn carries(&self, node: usize, iface: &str) -> bool {
        self.link_of(node, iface).is_some_and(SimLink::carries)
    }
}

pub struct Simulation {
    core: Rc<RefCell<SimCore>>,
    nodes: Vec<Router>,
    index: BTreeMap<RouterId, usize>,
    started: bool,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(SimCore::default())),
            nodes: Vec::new(),
            index: BTreeMap::new(),
            started: false,
        }
    }

    /// Builds every router and link of `config`; routers are not started.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut sim = Self::new();
        for router in &config.routers {
            sim.add_router(router.clone())?;
        }
        for link in &config.links {
            sim.connect(link.a, &link.a_iface, link.b, &link.b_iface, link.delay())?;
        }
        Ok(sim)
    }

    pub fn add_router(&mut self, config: RouterConfig) -> Result<RouterId> {
        let id = config.router_id;
        if self.index.contains_key(&id) {
            return Err(Error::InvalidConfig(format!("duplicate router {}", id)));
        }
        let node = self.nodes.len();
        let ifaces = config.interfaces.iter().map(|i| i.name.clone()).collect();
        let router = Router::new(
            config,
            Box::new(SimClock { core: self.core.clone(), node }),
            Box::new(SimTransport { core: self.core.clone(), node }),
            Box::new(SimTopology { core: self.core.clone(), node, ifaces }),
        )?;
        self.nodes.push(router);
        self.index.insert(id, node);
        if self.started {
            self.nodes[node].start()?;
        }
        Ok(id)
    }

    /// Joins `a_iface` of router `a` to `b_iface` of router `b`. The link
    /// starts up.
    pub fn connect(&mut self, a: RouterId, a_iface: &str, b: RouterId, b_iface: &str, delay: Duration) -> Result<()> {
        let a_end = self.endpoint(a, a_iface)?;
        let b_end = self.endpoint(b, b_iface)?;
        {
            let mut core = self.core.borrow_mut();
            for end in [&a_end, &b_end] {
                if core.link_of(end.node, &end.iface).is_some() {
                    return Err(Error::InvalidConfig(format!(
                        "{} on {} is already connected",
                        end.iface,
                        self.nodes[end.node].id()
                    )));
                }
            }
            core.links.push(SimLink {
                a: a_end,
                b: b_end,
                delay,
                up: true,
                blackholed: false,
            });
        }
        debug!("connected {}:{} <-> {}:{} ({:?})", a, a_iface, b, b_iface, delay);
        if self.started {
            self.node_mut(a)?.on_link_up(a_iface)?;
            self.node_mut(b)?.on_link_up(b_iface)?;
        }
        Ok(())
    }

    fn endpoint(&self, router: RouterId, iface: &str) -> Result<Endpoint> {
        let node = self.node_index(router)?;
        let addr = self.nodes[node]
            .config()
            .interface(iface)
            .map(|i| i.address.addr())
            .ok_or_else(|| Error::UnknownInterface(iface.to_string()))?;
        Ok(Endpoint {
            node,
            iface: iface.to_string(),
            addr,
        })
    }

    fn node_index(&self, router: RouterId) -> Result<usize> {
        self.index.get(&router).copied().ok_or(Error::UnknownRouter(router))
    }

    fn node_mut(&mut self, router: RouterId) -> Result<&mut Router> {
        let node = self.node_index(router)?;
        Ok(&mut self.nodes[node])
    }

    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        info!("starting simulation with {} routers", self.nodes.len());
        for router in &mut self.nodes {
            router.start()?;
        }
        Ok(())
    }

    /// Brings the link on `iface` of `router` up or down and notifies both
    /// ends. Packets already in flight on a downed link are lost.
    pub fn set_link_up(&mut self, router: RouterId, iface: &str, up: bool) -> Result<()> {
        let node = self.node_index(router)?;
        let (local, remote) = {
            let mut core = self.core.borrow_mut();
            let link = core
                .link_of_mut(node, iface)
                .ok_or_else(|| Error::UnknownInterface(iface.to_string()))?;
            if link.up == up {
                return Ok(());
            }
            link.up = up;
            (link.a.clone(), link.b.clone())
        };
        info!("link {}:{} is now {}", router, iface, if up { "up" } else { "down" });
        for end in [local, remote] {
            let router = &mut self.nodes[end.node];
            if up {
                router.on_link_up(&end.iface)?;
            } else {
                router.on_link_down(&end.iface)?;
            }
        }
        Ok(())
    }

    /// Silently loses every packet on the link while leaving both ends
    /// believing it is up, so only the dead interval can detect it.
    pub fn set_link_blackholed(&mut self, router: RouterId, iface: &str, blackholed: bool) -> Result<()> {
        let node = self.node_index(router)?;
        let mut core = self.core.borrow_mut();
        let link = core
            .link_of_mut(node, iface)
            .ok_or_else(|| Error::UnknownInterface(iface.to_string()))?;
        link.blackholed = blackholed;
        Ok(())
    }

    pub fn set_queue_occupancy(&mut self, router: RouterId, iface: &str, occupancy: f64) -> Result<()> {
        let node = self.node_index(router)?;
        if self.nodes[node].config().interface(iface).is_none() {
            return Err(Error::UnknownInterface(iface.to_string()));
        }
        self.core
            .borrow_mut()
            .occupancy
            .insert((node, iface.to_string()), occupancy.clamp(0.0, 1.0));
        Ok(())
    }

    /// Processes every queued action due at or before `until`, then advances
    /// the clock to `until`.
    pub fn run_until(&mut self, until: Duration) -> Result<()> {
        loop {
            let next = {
                let mut core = self.core.borrow_mut();
                match core.queue.peek_time() {
                    Some(at) if at <= until => core.queue.pop(),
                    _ => None,
                }
            };
            let Some((at, seq, (node, action))) = next else {
                break;
            };

            {
                let mut core = self.core.borrow_mut();
                if core.cancelled.remove(&seq) {
                    continue;
                }
                core.now = at;
            }

            match action {
                Action::Timer(timer) => self.nodes[node].on_timer(timer)?,
                Action::Deliver { iface, source, bytes } => {
                    let carried = self.core.borrow().carries(node, &iface);
                    if !carried {
                        self.core.borrow_mut().lost += 1;
                        continue;
                    }
                    self.nodes[node].on_packet_arrival(&iface, source, &bytes)?;
                }
            }
        }
        let mut core = self.core.borrow_mut();
        core.now = core.now.max(until);
        Ok(())
    }

    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        let until = self.now() + duration;
        self.run_until(until)
    }

    pub fn now(&self) -> Duration {
        self.core.borrow().now
    }

    /// Packets the links failed to carry.
    pub fn lost_packets(&self) -> u64 {
        self.core.borrow().lost
    }

    pub fn pending_actions(&self) -> usize {
        self.core.borrow().queue.len()
    }

    pub fn send_data(&mut self, from: RouterId, to: RouterId, payload: Vec<u8>) -> Result<u64> {
        Ok(self.node_mut(from)?.send_data(to, payload))
    }

    pub fn router(&self, id: RouterId) -> Option<&Router> {
        self.index.get(&id).map(|&node| &self.nodes[node])
    }

    pub fn routers(&self) -> impl Iterator<Item = &Router> {
        self.nodes.iter()
    }

    /// Journals of every router, merged in time order.
    pub fn drain_events(&mut self) -> Vec<(RouterId, Duration, Event)> {
        let mut merged: Vec<(RouterId, Duration, Event)> = self
            .nodes
            .iter_mut()
            .flat_map(|router| {
                let id = router.id();
                router
                    .drain_events()
                    .into_iter()
                    .map(move |(at, event)| (id, at, event))
            })
            .collect();
        merged.sort_by_key(|(_, at, _)| *at);
        merged
    }

    /// Whether every router holds the same instance of every LSA.
    pub fn lsdbs_agree(&self) -> bool {
        let now = self.now();
        let mut views = self.nodes.iter().map(|router| {
            let mut instances: Vec<_> = router
                .lsdb()
                .headers(now)
                .into_iter()
                .map(|h| (h.key(), h.sequence, h.checksum))
                .collect();
            instances.sort();
            instances
        });
        let Some(first) = views.next() else {
            return true;
        };
        views.all(|view| view == first)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now())
            .field("routers", &self.nodes.len())
            .field("links", &self.core.borrow().links.len())
            .finish()
    }
}
