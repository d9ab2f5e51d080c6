pub mod algorithms;
pub mod config;
pub mod control_server;
pub mod error;
pub mod forwarding;
pub mod network;
pub mod protocol;
pub mod sim;

use std::net::Ipv4Addr;

/// Routers are named by a 32-bit identifier written as a dotted quad.
pub type RouterId = Ipv4Addr;

pub use error::{Error, Result};
pub use protocol::Router;
pub use sim::Simulation;
