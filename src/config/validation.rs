//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (pools reference configured servers)
//! - Validate value ranges (intervals > 0, weights non-negative)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NtpPoolConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::NtpPoolConfig;
use crate::pool::manager::MIN_POOL_MEMBERS;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("health_check.{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("duplicate server id {0}")]
    DuplicateServerId(u64),

    #[error("server {0} has an empty host")]
    EmptyHost(u64),

    #[error("server {id} has invalid weight {weight}")]
    InvalidServerWeight { id: u64, weight: String },

    #[error("pool name must not be empty")]
    EmptyPoolName,

    #[error("duplicate pool name '{0}'")]
    DuplicatePoolName(String),

    #[error("pool '{pool}' references unknown server {server}")]
    UnknownMember { pool: String, server: u64 },

    #[error("pool '{pool}' needs at least {min} members, has {count}")]
    TooFewMembers { pool: String, count: usize, min: usize },

    #[error("pool '{pool}' has invalid weight '{key}' = {weight}")]
    InvalidPoolWeight { pool: String, key: String, weight: String },
}

/// Validate `config`, collecting every problem found.
pub fn validate_config(config: &NtpPoolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let hc = &config.health_check;
    for (field, value) in [
        ("interval_secs", hc.interval_secs),
        ("timeout_secs", hc.timeout_secs),
        ("max_concurrency", hc.max_concurrency as u64),
        ("failover_threshold", u64::from(hc.failover_threshold)),
        ("error_backoff_secs", hc.error_backoff_secs),
        ("response_window", hc.response_window as u64),
        ("response_time_samples", hc.response_time_samples as u64),
        ("least_connections_window_secs", hc.least_connections_window_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(obs.metrics_address.clone()));
    }

    let mut server_ids = HashSet::new();
    for server in &config.servers {
        if !server_ids.insert(server.id) {
            errors.push(ValidationError::DuplicateServerId(server.id));
        }
        if server.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost(server.id));
        }
        if !server.weight.is_finite() || server.weight < 0.0 {
            errors.push(ValidationError::InvalidServerWeight {
                id: server.id,
                weight: server.weight.to_string(),
            });
        }
    }

    let mut pool_names = HashSet::new();
    for pool in &config.pools {
        let name = pool.name.trim();
        if name.is_empty() {
            errors.push(ValidationError::EmptyPoolName);
        } else if !pool_names.insert(name.to_string()) {
            errors.push(ValidationError::DuplicatePoolName(name.to_string()));
        }

        for member in &pool.members {
            if !server_ids.contains(member) {
                errors.push(ValidationError::UnknownMember { pool: pool.name.clone(), server: *member });
            }
        }

        let distinct: HashSet<_> = pool.members.iter().collect();
        if distinct.len() < MIN_POOL_MEMBERS {
            errors.push(ValidationError::TooFewMembers {
                pool: pool.name.clone(),
                count: distinct.len(),
                min: MIN_POOL_MEMBERS,
            });
        }

        for (key, weight) in &pool.weights {
            let valid_key = key.trim().parse::<u64>().is_ok();
            if !valid_key || !weight.is_finite() || *weight < 0.0 {
                errors.push(ValidationError::InvalidPoolWeight {
                    pool: pool.name.clone(),
                    key: key.clone(),
                    weight: weight.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
