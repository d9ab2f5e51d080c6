use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    Broadcast,
    Unicast(Ipv4Addr),
}

/// Packet delivery primitive supplied by the host.
pub trait Transport {
    fn send(&mut self, iface: &str, destination: Destination, bytes: Vec<u8>);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStatus {
    pub name: String,
    pub up: bool,
}

impl InterfaceStatus {
    pub fn new(name: impl Into<String>, up: bool) -> Self {
        Self {
            name: name.into(),
            up,
        }
    }
}
