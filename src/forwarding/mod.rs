//! Data-plane forwarding: the traffic-light arbiter, its hold queue and
//! the local congestion monitor.

pub mod arbiter;
pub mod congestion;
pub mod hold_queue;

pub use arbiter::{Decision, DropReason, ForwardingArbiter, PathChoice, prefer_backup};
pub use congestion::{Color, CongestionMonitor};
pub use hold_queue::{HoldEntry, HoldQueue};
