//! One-shot SNTPv4 query (RFC 4330 client mode).
//!
//! # Responsibilities
//! - Send a single client-mode packet and wait for the server reply
//! - Validate the reply (mode, origin timestamp, stratum, leap indicator)
//! - Derive clock offset and round-trip delay from the four timestamps
//!
//! # Design Decisions
//! - One fresh UDP socket per probe; no retransmission
//! - The local clock is only read, never adjusted

use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time;

use super::{ProbeError, ProbeSample, TimeProbe};

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
const PACKET_LEN: usize = 48;
/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0b00_100_011;
const MODE_SERVER: u8 = 4;
const LEAP_ALARM: u8 = 3;

/// Probe that queries a time server with a single SNTP request.
#[derive(Debug, Default, Clone)]
pub struct SntpProbe;

impl SntpProbe {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(&self, host: &str, port: u16) -> Result<ProbeSample, ProbeError> {
        let remote = resolve(host, port).await?;
        let bind_addr = if remote.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0u16))
        } else {
            SocketAddr::from(([0u16; 8], 0u16))
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(remote).await?;

        let started = Instant::now();
        let (request, sent_ts) = build_request(SystemTime::now());
        let t1 = ntp_to_unix_secs(sent_ts);
        socket.send(&request).await?;

        let mut buf = [0u8; 512];
        let len = socket.recv(&mut buf).await?;
        let t4 = unix_secs(SystemTime::now());
        let response_time = started.elapsed();

        let (offset, delay, stratum) = parse_response(&buf[..len], sent_ts, t1, t4)?;
        Ok(ProbeSample {
            response_time,
            offset,
            delay,
            stratum,
        })
    }
}

#[async_trait]
impl TimeProbe for SntpProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeSample, ProbeError> {
        match time::timeout(timeout, self.exchange(host, port)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProbeError> {
    lookup_host((host, port))
        .await
        .map_err(|e| ProbeError::Resolve(format!("{}:{} ({})", host, port, e)))?
        .next()
        .ok_or_else(|| ProbeError::Resolve(format!("{}:{}", host, port)))
}

fn unix_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn unix_to_ntp(t: SystemTime) -> u64 {
    let since_epoch = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_epoch.as_secs() + NTP_UNIX_OFFSET;
    let frac = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;
    (secs << 32) | frac
}

fn ntp_to_unix_secs(ts: u64) -> f64 {
    let secs = (ts >> 32) as f64 - NTP_UNIX_OFFSET as f64;
    let frac = (ts & 0xFFFF_FFFF) as f64 / 4_294_967_296.0;
    secs + frac
}

fn read_ts(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(raw)
}

/// Build a client request carrying `now` as its transmit timestamp.
fn build_request(now: SystemTime) -> ([u8; PACKET_LEN], u64) {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    let ts = unix_to_ntp(now);
    packet[40..48].copy_from_slice(&ts.to_be_bytes());
    (packet, ts)
}

/// Validate a reply and return `(offset, delay, stratum)`.
///
/// `t1` and `t4` are the local send/receive instants in Unix seconds.
fn parse_response(buf: &[u8], sent_ts: u64, t1: f64, t4: f64) -> Result<(f64, f64, u8), ProbeError> {
    if buf.len() < PACKET_LEN {
        return Err(ProbeError::InvalidResponse(format!("short packet ({} bytes)", buf.len())));
    }

    let leap = buf[0] >> 6;
    let mode = buf[0] & 0x07;
    let stratum = buf[1];

    if mode != MODE_SERVER {
        return Err(ProbeError::InvalidResponse(format!("unexpected mode {}", mode)));
    }
    if read_ts(buf, 24) != sent_ts {
        return Err(ProbeError::InvalidResponse("origin timestamp mismatch".to_string()));
    }
    if stratum == 0 {
        let code = String::from_utf8_lossy(&buf[12..16]).trim_end_matches('\0').to_string();
        return Err(ProbeError::Refused(format!("kiss code {}", code)));
    }
    if leap == LEAP_ALARM {
        return Err(ProbeError::Refused("server clock not synchronized".to_string()));
    }

    let t2 = ntp_to_unix_secs(read_ts(buf, 32));
    let t3 = ntp_to_unix_secs(read_ts(buf, 40));

    let offset = ((t2 - t1) + (t3 - t4)) / 2.0;
    let delay = ((t4 - t1) - (t3 - t2)).max(0.0);
    Ok((offset, delay, stratum))
}
