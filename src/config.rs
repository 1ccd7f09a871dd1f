//! Daemon configuration — registry credentials, the provider list, and
//! the polling policy knobs.
//!
//! Loaded from a JSON file. Only the submission key, registry URL and
//! provider ids are required; every policy knob has a deployment default
//! so a minimal config stays three fields.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Shared submission key the registry uses to recognise this daemon.
    pub key: String,
    /// Base URL of the registry API.
    pub registry_url: String,
    /// Provider identifiers whose server pools are polled.
    pub providers: Vec<u64>,

    /// Successful probe results per heartbeat batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How many recent region keys count as "too soon" for a repeat probe.
    #[serde(default = "default_recency_window")]
    pub recency_window: usize,
    /// Delay inserted before probing a region that recurs too soon.
    #[serde(default = "default_pace_delay_secs")]
    pub pace_delay_secs: u64,
    /// How long a provider's server list stays fresh.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Sleep between full passes over all providers.
    #[serde(default = "default_cycle_sleep_secs")]
    pub cycle_sleep_secs: u64,
    /// Per-server status query budget.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Per-call registry request budget.
    #[serde(default = "default_registry_timeout_secs")]
    pub registry_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_recency_window() -> usize {
    6
}

fn default_pace_delay_secs() -> u64 {
    1
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_cycle_sleep_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    3
}

fn default_registry_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Resolution order: `FLEETPULSE_CONFIG`, then the working directory,
    /// then `~/.fleetpulse/config.json`.
    pub fn resolve_path() -> PathBuf {
        if let Ok(path) = std::env::var("FLEETPULSE_CONFIG") {
            return PathBuf::from(path);
        }

        let local = PathBuf::from("config.json");
        if local.exists() {
            return local;
        }

        dirs::home_dir()
            .map(|home| home.join(".fleetpulse").join("config.json"))
            .unwrap_or(local)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&raw).context("Config file is not valid JSON")?;

        if config.key.is_empty() {
            anyhow::bail!("Config is missing the registry submission key");
        }
        if config.providers.is_empty() {
            anyhow::bail!("Config lists no providers to poll");
        }

        Ok(config)
    }

    pub fn pace_delay(&self) -> Duration {
        Duration::from_secs(self.pace_delay_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn cycle_sleep(&self) -> Duration {
        Duration::from_secs(self.cycle_sleep_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }
}
