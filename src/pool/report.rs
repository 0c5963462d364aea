//! Reports returned by pool operations.

use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use crate::health::checker::HealthCheckResult;
use crate::health::state::ServerStatus;
use crate::load_balancer::LoadBalanceMethod;
use crate::pool::types::{PoolId, ServerId};

/// Aggregate pool health derived from the active share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    /// At least half of the members are active.
    Healthy,
    Degraded,
    /// No member is active.
    Failed,
}

impl PoolStatus {
    pub fn from_percentage(health_percentage: f64) -> Self {
        if health_percentage >= 50.0 {
            PoolStatus::Healthy
        } else if health_percentage > 0.0 {
            PoolStatus::Degraded
        } else {
            PoolStatus::Failed
        }
    }
}

/// `100 * active / total`, or 0 for an empty pool.
pub fn health_percentage(active: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    active as f64 / total as f64 * 100.0
}

/// Per-server outcome of one health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCheckOutcome {
    pub server_id: ServerId,
    pub server_name: String,
    /// Status after the result was applied.
    pub status: ServerStatus,
    pub consecutive_failures: u32,
    pub result: HealthCheckResult,
}

/// Result of `check_health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealthReport {
    pub pool_id: PoolId,
    pub pool_name: String,
    /// All members, maintenance included.
    pub total_servers: usize,
    /// Members whose probe succeeded in this batch.
    pub active_servers: usize,
    /// Members whose probe failed in this batch.
    pub failed_servers: usize,
    /// Members skipped because they are in maintenance.
    pub maintenance_servers: usize,
    pub health_percentage: f64,
    pub status: PoolStatus,
    pub checked_at: SystemTime,
    pub servers: Vec<ServerCheckOutcome>,
}

/// What happened to one failed server during a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    Recovered,
    StillFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecovery {
    pub server_id: ServerId,
    pub server_name: String,
    pub outcome: RecoveryOutcome,
    pub consecutive_failures: u32,
    pub result: HealthCheckResult,
}

/// Result of `attempt_recovery`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub pool_id: PoolId,
    pub attempted: usize,
    pub recovered: usize,
    /// Percentage of attempted servers that recovered (0 when nothing was attempted).
    pub recovery_rate: f64,
    pub servers: Vec<ServerRecovery>,
}

/// Response time summary in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeSummary {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub median_ms: f64,
    /// Sample standard deviation, 0 for a single sample.
    pub stddev_ms: f64,
    pub samples: usize,
}

impl ResponseTimeSummary {
    /// Summarize `samples`, `None` if there are none.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let stddev = if n > 1 {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Some(Self {
            mean_ms: mean,
            min_ms: min,
            max_ms: max,
            median_ms: median,
            stddev_ms: stddev,
            samples: n,
        })
    }
}

/// Per-server statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatistics {
    pub server_id: ServerId,
    pub server_name: String,
    pub status: ServerStatus,
    pub consecutive_failures: u32,
    pub last_success: Option<SystemTime>,
    pub response_time: Option<ResponseTimeSummary>,
}

/// Result of `get_statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub pool_id: PoolId,
    pub pool_name: String,
    pub load_balance_method: LoadBalanceMethod,
    pub failover_enabled: bool,
    pub total_servers: usize,
    pub active_servers: usize,
    pub failed_servers: usize,
    pub availability_percentage: f64,
    pub last_health_check: Option<SystemTime>,
    pub servers: Vec<ServerStatistics>,
    /// Aggregate over every sample of every member.
    pub performance: Option<ResponseTimeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_percentage() {
        assert_eq!(health_percentage(0, 1), 0.0);
        assert_eq!(health_percentage(1, 1), 100.0);
        assert_eq!(health_percentage(1, 4), 25.0);
        assert_eq!(health_percentage(0, 0), 0.0);
    }

    #[test]
    fn test_pool_status_thresholds() {
        assert_eq!(PoolStatus::from_percentage(100.0), PoolStatus::Healthy);
        assert_eq!(PoolStatus::from_percentage(50.0), PoolStatus::Healthy);
        assert_eq!(PoolStatus::from_percentage(33.3), PoolStatus::Degraded);
        assert_eq!(PoolStatus::from_percentage(0.0), PoolStatus::Failed);
    }

    #[test]
    fn test_summary() {
        let s = ResponseTimeSummary::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean_ms, 5.0);
        assert_eq!(s.min_ms, 2.0);
        assert_eq!(s.max_ms, 9.0);
        assert_eq!(s.median_ms, 4.5);
        // Sample variance is 32 / 7
        assert!((s.stddev_ms - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
        assert_eq!(s.samples, 8);
    }

    #[test]
    fn test_summary_single_and_empty() {
        assert!(ResponseTimeSummary::from_samples(&[]).is_none());
        let s = ResponseTimeSummary::from_samples(&[3.0]).unwrap();
        assert_eq!(s.median_ms, 3.0);
        assert_eq!(s.stddev_ms, 0.0);
    }
}
