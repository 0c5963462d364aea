//! Identifiers, server descriptors and pool error definitions.

use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::load_balancer::LoadBalanceMethod;

/// Default NTP port.
pub const DEFAULT_NTP_PORT: u16 = 123;

/// Server identifier for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl From<u64> for ServerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool identifier, assigned by the manager at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a time server that can join pools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Static weight for weighted selection.
    pub weight: f64,
    /// Disabled servers are skipped when a pool is assembled.
    pub enabled: bool,
}

impl ServerDescriptor {
    /// Create an enabled descriptor on the default NTP port with weight 1.
    pub fn new(id: impl Into<ServerId>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            id: id.into(),
            name: host.clone(),
            host,
            port: DEFAULT_NTP_PORT,
            weight: 1.0,
            enabled: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// `host:port` form used in logs and metric labels.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything needed to create a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<ServerId>,
    #[serde(default)]
    pub load_balance_method: LoadBalanceMethod,
    /// Per-member weight overrides. Members without an entry use their descriptor weight.
    #[serde(default)]
    pub weights: HashMap<ServerId, f64>,
    #[serde(default = "default_failover")]
    pub failover_enabled: bool,
}

fn default_failover() -> bool {
    true
}

impl PoolSpec {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = u64>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            members: members.into_iter().map(ServerId).collect(),
            load_balance_method: LoadBalanceMethod::default(),
            weights: HashMap::new(),
            failover_enabled: true,
        }
    }

    pub fn with_method(mut self, method: LoadBalanceMethod) -> Self {
        self.load_balance_method = method;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_weight(mut self, server: u64, weight: f64) -> Self {
        self.weights.insert(ServerId(server), weight);
        self
    }

    pub fn with_failover(mut self, enabled: bool) -> Self {
        self.failover_enabled = enabled;
        self
    }
}

/// Errors surfaced by pool operations.
///
/// Probe failures are not represented here; they are recorded per server
/// in the health check results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PoolError {
    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("invalid pool configuration: {0}")]
    InvalidPoolConfiguration(String),

    #[error("no available server in pool {0}")]
    NoAvailableServer(PoolId),

    #[error("server {server} is not a member of pool {pool}")]
    ServerNotInPool { pool: PoolId, server: ServerId },
}
