use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::RouterId;
use crate::error::{Error, Result};
use crate::protocol::{MAX_AGE, Variant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub router_id: RouterId,
    #[serde(default)]
    pub area_id: u32,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default = "default_hello_interval")]
    pub hello_interval: u16,
    #[serde(default = "default_dead_interval")]
    pub dead_interval: u32,
    #[serde(default = "default_retransmit_interval")]
    pub retransmit_interval: u32,
    #[serde(default = "default_lsa_refresh_interval")]
    pub lsa_refresh_interval: u32,
    /// Modeled processing time between route computation and installation.
    #[serde(default)]
    pub spf_delay_ms: u64,
    #[serde(default = "default_max_lsas_per_update")]
    pub max_lsas_per_update: usize,
    #[serde(default = "default_data_ttl")]
    pub data_ttl: u8,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub congestion: CongestionConfig,
    #[serde(default)]
    pub hold_queue: HoldQueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub address: Ipv4Net,
    #[serde(default = "default_cost")]
    pub cost: u32,
    #[serde(default = "default_mtu")]
    pub mtu: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CongestionConfig {
    pub check_interval_ms: u64,
    pub yellow_threshold: f64,
    pub red_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldQueueConfig {
    pub capacity: usize,
    /// Number of hold-queue checks a packet may wait before it is dropped.
    pub time_to_wait: u32,
    pub check_interval_ms: u64,
}

fn default_hello_interval() -> u16 {
    10
}

fn default_dead_interval() -> u32 {
    40
}

fn default_retransmit_interval() -> u32 {
    5
}

fn default_lsa_refresh_interval() -> u32 {
    1800
}

fn default_max_lsas_per_update() -> usize {
    32
}

fn default_data_ttl() -> u8 {
    64
}

fn default_cost() -> u32 {
    10
}

fn default_mtu() -> u16 {
    1500
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            yellow_threshold: 0.5,
            red_threshold: 0.8,
        }
    }
}

impl CongestionConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl HoldQueueConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

impl Default for HoldQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            time_to_wait: 10,
            check_interval_ms: 100,
        }
    }
}

impl RouterConfig {
    pub fn new(router_id: RouterId, variant: Variant) -> Self {
        Self {
            router_id,
            area_id: 0,
            variant,
            hello_interval: default_hello_interval(),
            dead_interval: default_dead_interval(),
            retransmit_interval: default_retransmit_interval(),
            lsa_refresh_interval: default_lsa_refresh_interval(),
            spf_delay_ms: 0,
            max_lsas_per_update: default_max_lsas_per_update(),
            data_ttl: default_data_ttl(),
            interfaces: Vec::new(),
            congestion: CongestionConfig::default(),
            hold_queue: HoldQueueConfig::default(),
        }
    }

    pub fn add_interface(&mut self, config: InterfaceConfig) {
        self.interfaces.retain(|i| i.name != config.name);
        self.interfaces.push(config);
    }

    pub fn with_interface(mut self, name: &str, address: Ipv4Net, cost: u32) -> Self {
        self.add_interface(InterfaceConfig {
            name: name.to_string(),
            address,
            cost,
            mtu: default_mtu(),
        });
        self
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_secs(self.hello_interval as u64)
    }

    pub fn dead_interval(&self) -> Duration {
        Duration::from_secs(self.dead_interval as u64)
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_secs(self.retransmit_interval as u64)
    }

    pub fn lsa_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.lsa_refresh_interval as u64)
    }

    pub fn spf_delay(&self) -> Duration {
        Duration::from_millis(self.spf_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.router_id == Ipv4Addr::UNSPECIFIED {
            return Err(Error::InvalidConfig("router id 0.0.0.0 is reserved".into()));
        }
        if self.hello_interval == 0 {
            return Err(Error::InvalidConfig("hello interval must be positive".into()));
        }
        if self.dead_interval <= self.hello_interval as u32 {
            return Err(Error::InvalidConfig(format!(
                "dead interval {}s must exceed hello interval {}s",
                self.dead_interval, self.hello_interval
            )));
        }
        if self.retransmit_interval == 0 {
            return Err(Error::InvalidConfig("retransmit interval must be positive".into()));
        }
        if self.lsa_refresh_interval == 0 || self.lsa_refresh_interval >= MAX_AGE as u32 {
            return Err(Error::InvalidConfig(format!(
                "LSA refresh interval {}s must be positive and below MaxAge ({}s)",
                self.lsa_refresh_interval, MAX_AGE
            )));
        }
        if self.max_lsas_per_update == 0 {
            return Err(Error::InvalidConfig("max_lsas_per_update must be positive".into()));
        }

        let mut names = HashSet::new();
        for iface in &self.interfaces {
            if !names.insert(iface.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate interface {}", iface.name)));
            }
            if iface.cost == 0 {
                return Err(Error::InvalidConfig(format!("interface {} has zero cost", iface.name)));
            }
        }

        let c = &self.congestion;
        if !(0.0 < c.yellow_threshold && c.yellow_threshold < c.red_threshold && c.red_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "congestion thresholds must satisfy 0 < yellow ({}) < red ({}) <= 1",
                c.yellow_threshold, c.red_threshold
            )));
        }
        if c.check_interval_ms == 0 {
            return Err(Error::InvalidConfig("congestion check interval must be positive".into()));
        }

        let h = &self.hold_queue;
        if h.capacity == 0 || h.time_to_wait == 0 || h.check_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "hold queue capacity, time_to_wait and check interval must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RouterConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
