//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! get_next_server(pool)
//!     → pool manager builds candidates from the active servers
//!     → LoadBalanceMethod picks the strategy:
//!         - round_robin.rs (rotate through active servers)
//!         - weighted.rs (sample proportionally to weight)
//!         - least_conn.rs (fewest recent checks)
//!         - response_time.rs (lowest recent mean latency)
//!         - random.rs (uniform choice)
//!     → chosen server id, or None when nothing is active
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless; the round-robin cursor belongs to the pool
//! - Candidates are read-only views, selection never mutates server state
//! - Unrecognized method names fall back to round robin

pub mod least_conn;
pub mod random;
pub mod response_time;
pub mod round_robin;
pub mod weighted;

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::health::state::ServerRuntimeState;
use crate::pool::types::ServerId;

pub use least_conn::LeastConnections;
pub use random::Random;
pub use response_time::ResponseTime;
pub use round_robin::RoundRobin;
pub use weighted::Weighted;

/// Policy used to choose among active servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum LoadBalanceMethod {
    RoundRobin,
    #[default]
    Weighted,
    LeastConnections,
    ResponseTime,
    Random,
}

impl LoadBalanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalanceMethod::RoundRobin => "round_robin",
            LoadBalanceMethod::Weighted => "weighted",
            LoadBalanceMethod::LeastConnections => "least_connections",
            LoadBalanceMethod::ResponseTime => "response_time",
            LoadBalanceMethod::Random => "random",
        }
    }

    /// Parse a method name, falling back to round robin for anything unknown.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(method = %name, "Unknown load balance method, using round_robin");
            LoadBalanceMethod::RoundRobin
        })
    }

    fn strategy(&self) -> &'static dyn LoadBalancer {
        match self {
            LoadBalanceMethod::RoundRobin => &RoundRobin,
            LoadBalanceMethod::Weighted => &Weighted,
            LoadBalanceMethod::LeastConnections => &LeastConnections,
            LoadBalanceMethod::ResponseTime => &ResponseTime,
            LoadBalanceMethod::Random => &Random,
        }
    }
}

impl fmt::Display for LoadBalanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for method names that match no known policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown load balance method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for LoadBalanceMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(LoadBalanceMethod::RoundRobin),
            "weighted" => Ok(LoadBalanceMethod::Weighted),
            "least_connections" | "least_conn" => Ok(LoadBalanceMethod::LeastConnections),
            "response_time" => Ok(LoadBalanceMethod::ResponseTime),
            "random" => Ok(LoadBalanceMethod::Random),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

impl From<String> for LoadBalanceMethod {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

/// Read-only view of one active server offered to a strategy.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: ServerId,
    pub weight: f64,
    pub state: &'a ServerRuntimeState,
    /// Checks recorded for this server in the trailing window (least connections only).
    pub recent_checks: usize,
}

/// Inputs shared by every strategy for a single selection.
#[derive(Debug)]
pub struct Selection<'a, 'b> {
    /// Active servers in pool order.
    pub candidates: &'b [Candidate<'a>],
    /// Pool-scoped round-robin cursor.
    pub cursor: &'b mut usize,
    /// How many recent samples feed the response time mean.
    pub response_samples: usize,
}

/// A load balancing strategy.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Pick a server, or `None` if no candidate may be chosen.
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId>;
}

/// Select a server from `selection` using `method`.
pub fn select_server(method: LoadBalanceMethod, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
    if selection.candidates.is_empty() {
        return None;
    }
    method.strategy().next_server(selection)
}

/// Lowest-scoring candidate, ties broken by the lowest server id.
pub(crate) fn min_by_score<F>(candidates: &[Candidate<'_>], score: F) -> Option<ServerId>
where
    F: Fn(&Candidate<'_>) -> f64,
{
    candidates
        .iter()
        .map(|c| (score(c), c.id))
        .min_by(|(sa, ia), (sb, ib)| sa.total_cmp(sb).then(ia.cmp(ib)))
        .map(|(_, id)| id)
}
