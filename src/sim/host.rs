//! The harness side of the router's collaborator traits.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::{Action, SimCore};
use crate::network::{Clock, Destination, InterfaceStatus, Timer, TimerHandle, Topology, Transport};

pub(super) struct SimClock {
    pub(super) core: Rc<RefCell<SimCore>>,
    pub(super) node: usize,
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.core.borrow().now
    }

    fn schedule(&mut self, at: Duration, timer: Timer) -> TimerHandle {
        let mut core = self.core.borrow_mut();
        let at = at.max(core.now);
        TimerHandle(core.queue.push(at, (self.node, Action::Timer(timer))))
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.core.borrow_mut().cancelled.insert(handle.0);
    }
}

pub(super) struct SimTransport {
    pub(super) core: Rc<RefCell<SimCore>>,
    pub(super) node: usize,
}

impl Transport for SimTransport {
    fn send(&mut self, iface: &str, destination: Destination, bytes: Vec<u8>) {
        let mut core = self.core.borrow_mut();
        let Some((local, remote, delay, carrying)) = core.endpoints(self.node, iface) else {
            core.lost += 1;
            return;
        };
        if !carrying {
            core.lost += 1;
            return;
        }
        if let Destination::Unicast(addr) = destination {
            if addr != remote.addr {
                core.lost += 1;
                return;
            }
        }
        let at = core.now + delay;
        core.queue.push(
            at,
            (
                remote.node,
                Action::Deliver {
                    iface: remote.iface,
                    source: local.addr,
                    bytes,
                },
            ),
        );
    }
}

pub(super) struct SimTopology {
    pub(super) core: Rc<RefCell<SimCore>>,
    pub(super) node: usize,
    pub(super) ifaces: Vec<String>,
}

impl Topology for SimTopology {
    fn interfaces(&self) -> Vec<InterfaceStatus> {
        let core = self.core.borrow();
        self.ifaces
            .iter()
            .map(|name| InterfaceStatus::new(name.clone(), core.is_up(self.node, name)))
            .collect()
    }

    fn queue_occupancy(&self, iface: &str) -> f64 {
        self.core
            .borrow()
            .occupancy
            .get(&(self.node, iface.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}
