//! A2S_INFO client — the Source engine status query over UDP.
//!
//! Speaks just enough of the protocol for status polling: send the INFO
//! request, answer one challenge round if the server demands it, decode
//! the single-packet reply. Info replies fit a single datagram in
//! practice, so the multi-packet framing is not handled.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use super::{ProbeFailure, ProbeResult, ServerInfo, StatusProber};
use crate::registry::Endpoint;

const SIMPLE_HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const INFO_REQUEST: u8 = 0x54;
const INFO_REPLY: u8 = 0x49;
const CHALLENGE_REPLY: u8 = 0x41;
const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
const MAX_DATAGRAM: usize = 1400;

pub struct A2sProber;

impl A2sProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StatusProber for A2sProber {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeResult {
        match query_info(&endpoint.ip, endpoint.port, timeout).await {
            Ok(info) => ProbeResult::Online {
                id: endpoint.id,
                info,
            },
            Err(error) => ProbeResult::Unreachable {
                id: endpoint.id,
                error,
            },
        }
    }
}

/// Run the full INFO exchange against `host:port` within `timeout`.
/// The budget covers resolution, the challenge round and the reply.
async fn query_info(host: &str, port: u16, timeout: Duration) -> Result<ServerInfo, ProbeFailure> {
    tokio::time::timeout(timeout, async {
        let addr = resolve(host, port).await?;
        exchange(addr).await
    })
    .await
    .map_err(|_| ProbeFailure::Timeout)?
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProbeFailure> {
    lookup_host((host, port))
        .await
        .map_err(|e| ProbeFailure::Unresolvable(e.to_string()))?
        .next()
        .ok_or_else(|| ProbeFailure::Unresolvable(format!("no address for {host}")))
}

async fn exchange(addr: SocketAddr) -> Result<ServerInfo, ProbeFailure> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(socket_err)?;
    socket.connect(addr).await.map_err(socket_err)?;

    socket
        .send(&info_request(None))
        .await
        .map_err(socket_err)?;

    let mut buf = [0u8; MAX_DATAGRAM];
    let mut len = socket.recv(&mut buf).await.map_err(socket_err)?;

    // Servers may demand a challenge round before answering.
    if reply_kind(&buf[..len]) == Some(CHALLENGE_REPLY) {
        let challenge = parse_challenge(&buf[..len])?;
        debug!(%addr, "Answering status query challenge");
        socket
            .send(&info_request(Some(challenge)))
            .await
            .map_err(socket_err)?;
        len = socket.recv(&mut buf).await.map_err(socket_err)?;
    }

    parse_info(&buf[..len])
}

/// ICMP port-unreachable surfaces as a refused connection on the
/// connected socket; everything else is a plain transport failure.
fn socket_err(err: io::Error) -> ProbeFailure {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ProbeFailure::Refused,
        _ => ProbeFailure::Transport(err.to_string()),
    }
}

/// Build an INFO request datagram, echoing the challenge if present.
fn info_request(challenge: Option<[u8; 4]>) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + 1 + INFO_PAYLOAD.len() + 4);
    packet.extend_from_slice(&SIMPLE_HEADER);
    packet.push(INFO_REQUEST);
    packet.extend_from_slice(INFO_PAYLOAD);
    if let Some(challenge) = challenge {
        packet.extend_from_slice(&challenge);
    }
    packet
}

fn reply_kind(datagram: &[u8]) -> Option<u8> {
    if datagram.len() < 5 || datagram[..4] != SIMPLE_HEADER {
        return None;
    }
    Some(datagram[4])
}

fn parse_challenge(datagram: &[u8]) -> Result<[u8; 4], ProbeFailure> {
    if datagram.len() < 9 {
        return Err(ProbeFailure::Transport("short challenge reply".into()));
    }
    let mut challenge = [0u8; 4];
    challenge.copy_from_slice(&datagram[5..9]);
    Ok(challenge)
}

/// Decode a single-packet INFO reply into the reportable fields.
fn parse_info(datagram: &[u8]) -> Result<ServerInfo, ProbeFailure> {
    match reply_kind(datagram) {
        Some(INFO_REPLY) => {}
        Some(other) => {
            return Err(ProbeFailure::Transport(format!(
                "unexpected reply type 0x{other:02X}"
            )))
        }
        None => return Err(ProbeFailure::Transport("malformed reply header".into())),
    }

    let mut r = Reader::new(&datagram[5..]);
    let _protocol = r.u8()?;
    let hostname = r.cstring()?;
    let map = r.cstring()?;
    let _folder = r.cstring()?;
    let game = r.cstring()?;
    let appid = r.u16_le()? as u32;
    let online = r.u8()?;
    let maxplayers = r.u8()?;
    let bots = r.u8()?;
    let _server_type = r.u8()?;
    let _environment = r.u8()?;
    let passworded = r.u8()? != 0;
    let vac_secure = r.u8()? != 0;
    let version = r.cstring()?;

    // Extra data flag: decoded in wire order, keeping only the fields
    // that go into the datapack.
    let mut sourcetv_port = None;
    let mut sourcetv_name = None;
    let mut keywords = None;
    if let Ok(edf) = r.u8() {
        if edf & 0x80 != 0 {
            let _game_port = r.u16_le()?;
        }
        if edf & 0x10 != 0 {
            let _steam_id = r.u64_le()?;
        }
        if edf & 0x40 != 0 {
            sourcetv_port = Some(r.u16_le()?);
            sourcetv_name = Some(r.cstring()?);
        }
        if edf & 0x20 != 0 {
            keywords = Some(r.cstring()?);
        }
    }

    Ok(ServerInfo {
        hostname,
        online,
        maxplayers,
        map,
        keywords,
        bots,
        game,
        appid,
        version,
        passworded,
        vac_secure,
        sourcetv_port,
        sourcetv_name,
    })
}

/// Cursor over a reply payload; every read is bounds-checked.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, ProbeFailure> {
        let byte = *self.data.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16_le(&mut self) -> Result<u16, ProbeFailure> {
        let end = self.pos + 2;
        let bytes = self.data.get(self.pos..end).ok_or_else(truncated)?;
        let value = u16::from_le_bytes([bytes[0], bytes[1]]);
        self.pos = end;
        Ok(value)
    }

    fn u64_le(&mut self) -> Result<u64, ProbeFailure> {
        let end = self.pos + 8;
        let bytes = self.data.get(self.pos..end).ok_or_else(truncated)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        self.pos = end;
        Ok(u64::from_le_bytes(raw))
    }

    fn cstring(&mut self) -> Result<String, ProbeFailure> {
        let rest = &self.data[self.pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(truncated)?;
        let value = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(value)
    }
}

fn truncated() -> ProbeFailure {
    ProbeFailure::Transport("truncated reply".into())
}
