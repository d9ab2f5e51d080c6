//! Narrow interfaces to the host: a logical clock, a packet transport and a
//! view of the local interfaces. The routing engine depends on nothing else.

pub mod clock;
pub mod interface;
pub mod topology;

pub use clock::{Clock, Timer, TimerHandle, TimerSet};
pub use interface::{Destination, InterfaceStatus, Transport};
pub use topology::Topology;
