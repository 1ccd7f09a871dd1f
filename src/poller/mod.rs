//! The poll loop — refresh, order, probe, batch, sleep, repeat.
//!
//! Each provider refreshes its server list on a long interval and keeps
//! the interleaved ordering until the next refresh. A pass walks that
//! ordering with the recency window pacing region repeats, probes every
//! server, and feeds results to the batch reporter. Nothing in a pass
//! is fatal: a list fetch failure falls back to the last known list, a
//! probe failure is logged and skipped, a heartbeat failure drops the
//! batch and the walk continues.

use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::probe::{ProbeResult, StatusProber};
use crate::registry::{Endpoint, RegistryClient, RegistryError};
use crate::reporter::{BatchReporter, HeartbeatSink};
use crate::scheduler::{interleave, RecencyWindow};

/// Per-provider polling state, owned by the poll loop.
pub struct ProviderState {
    pub id: u64,
    endpoints: Vec<Endpoint>,
    last_refresh: Option<Instant>,
}

impl ProviderState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            endpoints: Vec::new(),
            last_refresh: None,
        }
    }

    /// A refresh is due at startup and whenever the interval has elapsed.
    pub fn refresh_due(&self, interval: Duration) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => at.elapsed() >= interval,
        }
    }

    /// Install a refresh outcome. The fetched list is replaced wholesale
    /// and re-ordered; a fetch failure keeps the previous list (or an
    /// empty one if this provider never fetched) and leaves the refresh
    /// timestamp alone so the next cycle tries again.
    pub fn apply_refresh(&mut self, fetched: Result<Vec<Endpoint>, RegistryError>) {
        match fetched {
            Ok(servers) => {
                info!(provider = self.id, servers = servers.len(), "Server list refreshed");
                self.endpoints = interleave(servers);
                self.last_refresh = Some(Instant::now());
            }
            Err(err) if self.endpoints.is_empty() => {
                warn!(
                    provider = self.id,
                    %err,
                    "Server list fetch failed with no previous list — polling nothing this cycle"
                );
            }
            Err(err) => {
                warn!(
                    provider = self.id,
                    %err,
                    fallback = self.endpoints.len(),
                    "Server list fetch failed — keeping previous list"
                );
            }
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Drive the poll loop until the process is terminated.
pub async fn run<P: StatusProber>(client: &RegistryClient, prober: &P, config: &Config) {
    let mut providers: Vec<ProviderState> =
        config.providers.iter().map(|&id| ProviderState::new(id)).collect();

    info!(providers = providers.len(), "Poll loop started");

    loop {
        for provider in &mut providers {
            if provider.refresh_due(config.refresh_interval()) {
                let fetched = client.list_servers(provider.id).await;
                provider.apply_refresh(fetched);
            }
            walk_provider(provider, client, prober, config).await;
        }

        sleep(config.cycle_sleep()).await;
    }
}

/// Walk one provider's ordered server list: pace, probe, batch, flush.
async fn walk_provider<P, S>(provider: &ProviderState, sink: &S, prober: &P, config: &Config)
where
    P: StatusProber,
    S: HeartbeatSink,
{
    let pass_start = Utc::now();
    let mut window = RecencyWindow::new(config.recency_window);
    let mut reporter = BatchReporter::new(sink, config.batch_size);
    let mut online = 0usize;
    let mut unreachable = 0usize;

    for endpoint in provider.endpoints() {
        let region = endpoint.region_key().to_string();
        if window.observed(&region) {
            sleep(config.pace_delay()).await;
        }

        let result = prober.probe(endpoint, config.probe_timeout()).await;
        window.push(&region);

        match &result {
            ProbeResult::Online { info, .. } => {
                online += 1;
                info!(
                    server = endpoint.id,
                    host = %endpoint.ip,
                    port = endpoint.port,
                    "Server responded: {}, {}/{}",
                    info.hostname,
                    info.online,
                    info.maxplayers
                );
            }
            ProbeResult::Unreachable { error, .. } => {
                unreachable += 1;
                warn!(
                    server = endpoint.id,
                    host = %endpoint.ip,
                    port = endpoint.port,
                    %error,
                    "Server failed to respond"
                );
            }
        }

        if let Err(err) = reporter.offer(result).await {
            warn!(provider = provider.id, %err, "Heartbeat submission failed — batch dropped");
        }
    }

    match reporter.flush_remainder().await {
        Ok(()) if online > 0 => {
            info!(provider = provider.id, "Provider heartbeat up to date");
        }
        Ok(()) => {}
        Err(err) => {
            warn!(provider = provider.id, %err, "Final heartbeat submission failed — batch dropped");
        }
    }

    info!(
        provider = provider.id,
        probed = provider.endpoints().len(),
        online,
        unreachable,
        duration_ms = (Utc::now() - pass_start).num_milliseconds(),
        "Provider pass complete"
    );
}
