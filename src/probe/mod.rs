//! Time probe capability.
//!
//! # Data Flow
//! ```text
//! health checker
//!     → TimeProbe::probe(host, port, timeout)
//!     → one request/response round trip with the remote time server
//!     → ProbeSample (response time, offset, delay, stratum) or ProbeError
//! ```
//!
//! # Design Decisions
//! - The pool core only depends on the trait; the wire protocol stays behind it
//! - A probe never mutates pool state, it only returns a value
//! - `sntp.rs` is a minimal one-shot query used by the daemon

pub mod sntp;

use std::time::Duration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sntp::SntpProbe;

/// Measurements taken during one successful round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbeSample {
    /// Wall time between sending the request and receiving the reply.
    pub response_time: Duration,
    /// Estimated offset of the local clock relative to the server, in seconds.
    pub offset: f64,
    /// Round-trip network delay reported by the exchange, in seconds.
    pub delay: f64,
    pub stratum: u8,
}

/// Reasons a probe can fail.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not resolve {0}")]
    Resolve(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The server answered but refused service (kiss-o'-death or unsynchronized).
    #[error("server refused: {0}")]
    Refused(String),
}

/// A single health/latency check against one time server.
#[async_trait]
pub trait TimeProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeSample, ProbeError>;
}
