pub mod router_config;
pub mod simulation_config;

pub use router_config::*;
pub use simulation_config::*;
