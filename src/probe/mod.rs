//! Status probing — one bounded-timeout query per server.
//!
//! The prober is the error-containment point for the unreliable query
//! protocol: whatever goes wrong on the wire comes back as a closed
//! `ProbeFailure` kind inside the result, never as a panic or an error
//! propagated past this boundary. One attempt per call, no retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::registry::Endpoint;

pub mod a2s;
pub use a2s::A2sProber;

// ── Outcomes ────────────────────────────────────────────────────────

/// Why a server failed to answer its status query.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("query timed out")]
    Timeout,
    #[error("connection refused")]
    Refused,
    #[error("cannot resolve host: {0}")]
    Unresolvable(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outcome of probing one server. Only `Online` results are reportable.
#[derive(Debug)]
pub enum ProbeResult {
    Online { id: u64, info: ServerInfo },
    Unreachable { id: u64, error: ProbeFailure },
}

/// Normalised status fields extracted from a query reply.
///
/// Forwarded to the registry as an opaque datapack; nothing in here is
/// interpreted by this daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub hostname: String,
    pub online: u8,
    pub maxplayers: u8,
    pub map: String,
    pub keywords: Option<String>,
    pub bots: u8,
    pub game: String,
    pub appid: u32,
    pub version: String,
    pub passworded: bool,
    pub vac_secure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetv_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetv_name: Option<String>,
}

// ── Prober Seam ─────────────────────────────────────────────────────

#[async_trait]
pub trait StatusProber: Send + Sync {
    /// Query one server, waiting at most `timeout` for the exchange.
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeResult;
}
