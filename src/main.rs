//! Fleetpulse — game-server fleet polling daemon.
//!
//! Runs as a long-lived service: refreshes each provider's server list
//! from the registry on a long interval, probes every server over the
//! status-query protocol with a bounded timeout, and reports results
//! back in fixed-size heartbeat batches.
//!
//! Scheduling:
//! - Servers are interleaved across network regions so no single
//!   neighbourhood gets a burst of queries
//! - A recency window inserts a pacing delay when a region recurs
//! - Heartbeats are best-effort: a failed submission drops the batch
//!   and never stalls the loop

use anyhow::{Context, Result};
use tracing::info;

mod config;
mod poller;
mod probe;
mod registry;
mod reporter;
mod scheduler;

use config::Config;
use probe::A2sProber;
use registry::RegistryClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (structured logs)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse=info".into()),
        )
        .with_target(false)
        .init();

    info!("📡 Fleetpulse v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = Config::resolve_path();
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!(
        registry = %config.registry_url,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    let client = RegistryClient::new(&config).context("Failed to build registry client")?;
    let prober = A2sProber::new();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Fleetpulse daemon ready — entering poll loop");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    tokio::select! {
        _ = poller::run(&client, &prober, &config) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received — abandoning in-flight probes");
        }
    }

    Ok(())
}
