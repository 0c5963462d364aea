//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pool daemon.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::load_balancer::LoadBalanceMethod;
use crate::pool::manager::ManagerSettings;
use crate::pool::types::{PoolSpec, ServerDescriptor, ServerId, DEFAULT_NTP_PORT};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NtpPoolConfig {
    /// Health check and failover tunables.
    pub health_check: HealthCheckConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Known NTP servers.
    pub servers: Vec<ServerConfig>,

    /// Pools built from `servers`.
    pub pools: Vec<PoolConfigEntry>,
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Scheduler period in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum in-flight probes per batch.
    pub max_concurrency: usize,

    /// Consecutive failures before a server is marked failed.
    pub failover_threshold: u32,

    /// Pause after a failed scheduler cycle, in seconds.
    pub error_backoff_secs: u64,

    /// Response times kept per server.
    pub response_window: usize,

    /// Samples averaged by the response_time method.
    pub response_time_samples: usize,

    /// Trailing window counted by the least_connections method, in seconds.
    pub least_connections_window_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            timeout_secs: 5,
            max_concurrency: 10,
            failover_threshold: 3,
            error_backoff_secs: 60,
            response_window: 20,
            response_time_samples: 10,
            least_connections_window_secs: 3600,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    /// Manager tunables derived from this section.
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            check_timeout: Duration::from_secs(self.timeout_secs),
            max_concurrency: self.max_concurrency,
            failover_threshold: self.failover_threshold,
            response_window: self.response_window,
            response_time_samples: self.response_time_samples,
            least_connections_window: Duration::from_secs(self.least_connections_window_secs),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter; `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// NTP server definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    pub id: u64,

    /// Display name; defaults to the host.
    #[serde(default)]
    pub name: Option<String>,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_port() -> u16 {
    DEFAULT_NTP_PORT
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    pub fn descriptor(&self) -> ServerDescriptor {
        let mut server = ServerDescriptor::new(self.id, self.host.clone())
            .with_port(self.port)
            .with_weight(self.weight);
        if let Some(name) = &self.name {
            server = server.with_name(name.clone());
        }
        if !self.enabled {
            server = server.disabled();
        }
        server
    }
}

/// Pool definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolConfigEntry {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub load_balance_method: LoadBalanceMethod,

    #[serde(default = "default_true")]
    pub failover_enabled: bool,

    /// Member server ids.
    pub members: Vec<u64>,

    /// Weight overrides keyed by server id (TOML keys are strings).
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

impl PoolConfigEntry {
    /// Weight overrides with parsed ids. Keys that are not ids are skipped.
    pub fn parsed_weights(&self) -> HashMap<ServerId, f64> {
        self.weights
            .iter()
            .filter_map(|(key, weight)| key.trim().parse::<u64>().ok().map(|id| (ServerId(id), *weight)))
            .collect()
    }

    pub fn spec(&self) -> PoolSpec {
        PoolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            members: self.members.iter().copied().map(ServerId).collect(),
            load_balance_method: self.load_balance_method,
            weights: self.parsed_weights(),
            failover_enabled: self.failover_enabled,
        }
    }
}
