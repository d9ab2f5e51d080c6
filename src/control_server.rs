//! Line-delimited JSON control channel onto a running simulation.
//!
//! The simulation itself is single-threaded; the driver publishes a
//! [`NetworkSnapshot`] after every step and the server answers queries
//! from the latest one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use log::{error, info, warn};

use crate::RouterId;
use crate::forwarding::Color;
use crate::protocol::{LsaHeader, NeighborState, Router, RouterStats, RoutingTableEntry, Variant};
use crate::sim::Simulation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborInfo {
    pub router_id: RouterId,
    pub iface: String,
    pub address: String,
    pub state: NeighborState,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterSnapshot {
    pub router_id: RouterId,
    pub variant: Variant,
    pub color: Color,
    pub hold_queue: usize,
    pub stats: RouterStats,
    pub neighbors: Vec<NeighborInfo>,
    pub routes: Vec<RoutingTableEntry>,
    pub lsdb: Vec<LsaHeader>,
}

impl RouterSnapshot {
    pub fn capture(router: &Router) -> Self {
        let now = router.now();
        let neighbors = router
            .adjacencies()
            .map(|a| NeighborInfo {
                router_id: a.neighbor_id,
                iface: a.iface.clone(),
                address: a.neighbor_addr.to_string(),
                state: a.state,
                color: router.arbiter().neighbor_color(a.neighbor_id),
            })
            .collect();
        Self {
            router_id: router.id(),
            variant: router.config().variant,
            color: router.color(),
            hold_queue: router.hold_queue_len(),
            stats: router.stats(),
            neighbors,
            routes: router.routing_table().entries().cloned().collect(),
            lsdb: router.lsdb().headers(now),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkSnapshot {
    pub sim_time_ms: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub routers: Vec<RouterSnapshot>,
}

impl NetworkSnapshot {
    pub fn capture(sim: &Simulation) -> Self {
        Self {
            sim_time_ms: sim.now().as_millis() as u64,
            updated_at: Some(Utc::now()),
            routers: sim.routers().map(RouterSnapshot::capture).collect(),
        }
    }

    fn router(&self, id: RouterId) -> Option<&RouterSnapshot> {
        self.routers.iter().find(|r| r.router_id == id)
    }
}

pub type SharedSnapshot = Arc<Mutex<NetworkSnapshot>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<serde_json::Value>,
}

pub struct ControlServer {
    port: u16,
    snapshot: SharedSnapshot,
}

impl ControlServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            snapshot: Arc::new(Mutex::new(NetworkSnapshot::default())),
        }
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    pub async fn publish(&self, snapshot: NetworkSnapshot) {
        *self.snapshot.lock().await = snapshot;
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Control server listening on {}", bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Control connection from {}", addr);
                    let snapshot = self.snapshot.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, snapshot).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, snapshot: SharedSnapshot) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => {
                    let snapshot = snapshot.lock().await;
                    Self::process_command(command, &snapshot)
                }
                Err(e) => {
                    warn!("Invalid control command: {}", e);
                    ControlResponse::fail(format!("Invalid JSON command: {}", e))
                }
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    pub fn process_command(command: ControlCommand, snapshot: &NetworkSnapshot) -> ControlResponse {
        match command.command.as_str() {
            "status" => Self::get_status(snapshot),
            "neighbors" => Self::per_router(command.args, snapshot, |r| {
                (format!("{} has {} neighbors", r.router_id, r.neighbors.len()), serde_json::to_value(&r.neighbors))
            }),
            "routes" => Self::per_router(command.args, snapshot, |r| {
                (format!("Retrieved {} routes from {}", r.routes.len(), r.router_id), serde_json::to_value(&r.routes))
            }),
            "lsdb" => Self::per_router(command.args, snapshot, |r| {
                (format!("{} holds {} LSAs", r.router_id, r.lsdb.len()), serde_json::to_value(&r.lsdb))
            }),
            "help" => Self::get_help(),
            _ => ControlResponse::fail(format!("Unknown command: {}", command.command)),
        }
    }

    fn get_status(snapshot: &NetworkSnapshot) -> ControlResponse {
        let routers: Vec<serde_json::Value> = snapshot
            .routers
            .iter()
            .map(|r| {
                serde_json::json!({
                    "router_id": r.router_id,
                    "variant": r.variant,
                    "color": r.color,
                    "full_neighbors": r.neighbors.iter().filter(|n| n.state == NeighborState::Full).count(),
                    "routes": r.routes.len(),
                    "hold_queue": r.hold_queue,
                    "stats": r.stats,
                })
            })
            .collect();
        ControlResponse::ok(
            format!("{} routers at t={}ms", snapshot.routers.len(), snapshot.sim_time_ms),
            serde_json::json!({
                "sim_time_ms": snapshot.sim_time_ms,
                "updated_at": snapshot.updated_at,
                "routers": routers,
            }),
        )
    }

    fn per_router(
        args: Option<serde_json::Value>,
        snapshot: &NetworkSnapshot,
        view: impl Fn(&RouterSnapshot) -> (String, serde_json::Result<serde_json::Value>),
    ) -> ControlResponse {
        let router_id = match Self::router_arg(args) {
            Ok(id) => id,
            Err(message) => return ControlResponse::fail(message),
        };
        let Some(router) = snapshot.router(router_id) else {
            return ControlResponse::fail(format!("Router {} not found", router_id));
        };
        match view(router) {
            (message, Ok(data)) => ControlResponse::ok(message, data),
            (_, Err(e)) => ControlResponse::fail(format!("Failed to serialize response: {}", e)),
        }
    }

    /// Accepts either `"1.1.1.1"` or `{"router_id": "1.1.1.1"}`.
    fn router_arg(args: Option<serde_json::Value>) -> Result<RouterId, String> {
        let raw = match args {
            Some(serde_json::Value::String(id)) => id,
            Some(obj) if obj.is_object() => match obj.get("router_id") {
                Some(serde_json::Value::String(id)) => id.clone(),
                _ => return Err("Missing or invalid router_id parameter".to_string()),
            },
            _ => return Err("router_id parameter required".to_string()),
        };
        raw.parse().map_err(|_| format!("Invalid router_id {}", raw))
    }

    fn get_help() -> ControlResponse {
        let commands = [
            ("status", "Summary of every router"),
            ("neighbors", "Adjacencies of one router (requires router_id)"),
            ("routes", "Installed routing table of one router (requires router_id)"),
            ("lsdb", "LSA headers held by one router (requires router_id)"),
            ("help", "Show this help message"),
        ];
        ControlResponse::ok("Available commands", serde_json::json!(commands))
    }
}
