use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::RouterConfig;
use crate::RouterId;
use crate::error::{Error, Result};

/// A whole scenario: the routers and the point-to-point links between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub routers: Vec<RouterConfig>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: RouterId,
    pub a_iface: String,
    pub b: RouterId,
    pub b_iface: String,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    10
}

impl LinkConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for router in &self.routers {
            router.validate()?;
            if !ids.insert(router.router_id) {
                return Err(Error::InvalidConfig(format!("duplicate router {}", router.router_id)));
            }
        }

        let mut used = HashSet::new();
        for link in &self.links {
            for (id, iface) in [(link.a, &link.a_iface), (link.b, &link.b_iface)] {
                let router = self
                    .routers
                    .iter()
                    .find(|r| r.router_id == id)
                    .ok_or(Error::UnknownRouter(id))?;
                if router.interface(iface).is_none() {
                    return Err(Error::InvalidConfig(format!("router {} has no interface {}", id, iface)));
                }
                if !used.insert((id, iface.clone())) {
                    return Err(Error::InvalidConfig(format!("{} on {} is linked twice", iface, id)));
                }
            }
        }
        Ok(())
    }

    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SimulationConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
