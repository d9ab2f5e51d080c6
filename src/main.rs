use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use satnet_routing::Simulation;
use satnet_routing::config::SimulationConfig;
use satnet_routing::control_server::{ControlServer, NetworkSnapshot};
use satnet_routing::protocol::{Event, NeighborState};

#[derive(Parser)]
#[command(name = "satnet-routing", about = "Run a link-state routing scenario on a simulated network")]
struct Cli {
    /// JSON scenario: routers and the links between them.
    #[arg(long)]
    topology: String,

    /// Simulated seconds to run.
    #[arg(long, default_value_t = 120)]
    duration: u64,

    /// Serve line-delimited JSON queries on 127.0.0.1:<port>; the run is
    /// then paced in wall-clock time.
    #[arg(long)]
    control_port: Option<u16>,

    /// Simulated milliseconds per step.
    #[arg(long, default_value_t = 100)]
    step_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = SimulationConfig::load_from_file(&cli.topology)?;
    info!(
        "Loaded {} routers and {} links from {}",
        config.routers.len(),
        config.links.len(),
        cli.topology
    );

    // Routers are not Send, so the simulation stays on this thread.
    let rt = Builder::new_current_thread().enable_all().build()?;
    rt.block_on(run(cli, config))
}

async fn run(cli: Cli, config: SimulationConfig) -> Result<()> {
    let mut sim = Simulation::from_config(&config)?;
    let step = Duration::from_millis(cli.step_ms.max(1));
    let horizon = Duration::from_secs(cli.duration);

    let server = cli.control_port.map(|port| {
        let server = std::sync::Arc::new(ControlServer::new(port));
        let listener = server.clone();
        tokio::spawn(async move {
            if let Err(e) = listener.start().await {
                warn!("Control server stopped: {}", e);
            }
        });
        server
    });

    sim.start()?;
    while sim.now() < horizon {
        sim.run_for(step)?;
        for (router, at, event) in sim.drain_events() {
            log_event(router, at, &event);
        }
        if let Some(server) = &server {
            server.publish(NetworkSnapshot::capture(&sim)).await;
            tokio::time::sleep(step).await;
        }
    }

    summarize(&sim);
    Ok(())
}

fn log_event(router: satnet_routing::RouterId, at: Duration, event: &Event) {
    match event {
        Event::NeighborStateChanged { .. } | Event::RoutesInstalled { .. } | Event::ColorChanged { .. } => {
            info!("[{:>8.3}s] {} {:?}", at.as_secs_f64(), router, event)
        }
        Event::PacketDropped { .. } => warn!("[{:>8.3}s] {} {:?}", at.as_secs_f64(), router, event),
        _ => debug!("[{:>8.3}s] {} {:?}", at.as_secs_f64(), router, event),
    }
}

fn summarize(sim: &Simulation) {
    info!(
        "Finished at t={:?}; LSDBs {}",
        sim.now(),
        if sim.lsdbs_agree() { "agree" } else { "disagree" }
    );
    for router in sim.routers() {
        let full = router.adjacencies().filter(|a| a.state == NeighborState::Full).count();
        let stats = router.stats();
        info!(
            "Router {}: {} full adjacencies, {} routes, {} LSAs, {} SPF runs, {} delivered, {} dropped",
            router.id(),
            full,
            router.routing_table().len(),
            router.lsdb().len(),
            stats.spf_runs,
            stats.data_delivered,
            stats.data_dropped
        );
        for entry in router.routing_table().entries() {
            info!(
                "  {} cost {} via {} (backup {})",
                entry.destination, entry.cost, entry.primary, entry.backup
            );
        }
    }
}
