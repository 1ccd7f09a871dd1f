//! Registry API client — the two calls this daemon makes.
//!
//! `list_servers` fetches a provider's current server pool and
//! `submit_heartbeat` pushes a batch of probe results back. Neither call
//! retries; the poll loop decides what a failure means.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::probe::ServerInfo;
use crate::reporter::HeartbeatSink;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request timed out")]
    Timeout,
    #[error("registry returned {result}: {}", .message.as_deref().unwrap_or("no detail"))]
    NonSuccess {
        result: String,
        message: Option<String>,
    },
    #[error("registry transport error: {0}")]
    Transport(reqwest::Error),
    #[error("malformed registry response: {0}")]
    Malformed(#[from] serde_json::Error),
}

fn map_transport(err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout
    } else {
        RegistryError::Transport(err)
    }
}

// ── Wire Types ──────────────────────────────────────────────────────

/// One pollable server as the registry lists it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    pub id: u64,
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    /// Load-spreading bucket: the host up to and including its first dot,
    /// or the whole host when it has none. Not a real topology concept.
    pub fn region_key(&self) -> &str {
        match self.ip.find('.') {
            Some(dot) => &self.ip[..=dot],
            None => &self.ip,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    result: String,
    #[serde(default)]
    servers: Vec<Endpoint>,
}

/// One heartbeat entry: the registry keys on the server id and stores
/// the datapack blob without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerReport {
    pub id: u64,
    pub datapack: Datapack,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapack {
    pub info: ServerInfo,
}

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    key: &'a str,
    servers: &'a [ServerReport],
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    result: String,
    message: Option<String>,
}

// ── Client ──────────────────────────────────────────────────────────

pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl RegistryClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.registry_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
        })
    }

    /// Fetch the current server list for one provider.
    pub async fn list_servers(&self, provider: u64) -> Result<Vec<Endpoint>, RegistryError> {
        let url = format!("{}/IServers/GServerList?provider={}", self.base_url, provider);

        let resp = self.http.get(&url).send().await.map_err(map_transport)?;
        let body = resp.text().await.map_err(map_transport)?;
        let parsed: ListResponse = serde_json::from_str(&body)?;

        if parsed.result != "SUCCESS" {
            return Err(RegistryError::NonSuccess {
                result: parsed.result,
                message: None,
            });
        }

        Ok(parsed.servers)
    }

    /// Submit one batch of probe results. The registry echoes a result
    /// indicator; any diagnostic it attaches is surfaced in the error.
    pub async fn submit_heartbeat(&self, servers: &[ServerReport]) -> Result<(), RegistryError> {
        let url = format!("{}/IServers/GHeartbeat", self.base_url);
        let body = HeartbeatRequest {
            key: &self.key,
            servers,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;
        let raw = resp.text().await.map_err(map_transport)?;
        let reply: StatusReply = serde_json::from_str(&raw)?;

        if reply.result != "SUCCESS" {
            return Err(RegistryError::NonSuccess {
                result: reply.result,
                message: reply.message,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl HeartbeatSink for RegistryClient {
    async fn submit(&self, servers: &[ServerReport]) -> Result<(), RegistryError> {
        self.submit_heartbeat(servers).await
    }
}
