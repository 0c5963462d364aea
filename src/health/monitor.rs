//! Periodic pool health monitoring.
//!
//! # Responsibilities
//! - Run `check_health` for one pool on a fixed interval
//! - Follow up with `attempt_recovery` while failed servers exist
//! - Back off after errors and stop on shutdown
//!
//! # Design Decisions
//! - One task per pool; pools never delay each other
//! - Shutdown is observed during a batch too; the dropped batch is never applied
//! - A deleted pool ends its monitor

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::lifecycle::Shutdown;
use crate::pool::manager::PoolManager;
use crate::pool::types::{PoolError, PoolId};

/// What the monitor does after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NextStep {
    Continue,
    Exit,
    Backoff,
}

impl NextStep {
    fn after(outcome: &Result<(), PoolError>) -> Self {
        match outcome {
            Ok(()) => NextStep::Continue,
            Err(PoolError::PoolNotFound(_)) => NextStep::Exit,
            // check_health and attempt_recovery only fail with PoolNotFound today;
            // any other error kind waits out the backoff and retries
            Err(_) => NextStep::Backoff,
        }
    }
}

pub struct PoolMonitor {
    manager: Arc<PoolManager>,
    pool_id: PoolId,
    interval: Duration,
    error_backoff: Duration,
}

impl PoolMonitor {
    pub fn new(manager: Arc<PoolManager>, pool_id: PoolId, config: &HealthCheckConfig) -> Self {
        Self::with_timing(manager, pool_id, config.interval(), config.error_backoff())
    }

    pub fn with_timing(manager: Arc<PoolManager>, pool_id: PoolId, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            manager,
            pool_id,
            interval: interval.max(Duration::from_millis(1)),
            error_backoff,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            pool = %self.pool_id,
            interval = ?self.interval,
            "Pool monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }

            let outcome = tokio::select! {
                outcome = self.cycle() => outcome,
                _ = shutdown.recv() => {
                    tracing::info!(pool = %self.pool_id, "Shutdown during health check, discarding batch");
                    break;
                }
            };

            match NextStep::after(&outcome) {
                NextStep::Continue => {}
                NextStep::Exit => {
                    tracing::info!(pool = %self.pool_id, "Pool no longer exists, monitor exiting");
                    return;
                }
                NextStep::Backoff => {
                    if let Err(e) = &outcome {
                        tracing::error!(pool = %self.pool_id, error = %e, backoff = ?self.error_backoff, "Health cycle failed");
                    }
                    tokio::select! {
                        _ = time::sleep(self.error_backoff) => {}
                        _ = shutdown.recv() => break,
                    }
                }
            }
        }

        tracing::info!(pool = %self.pool_id, "Pool monitor received shutdown signal, exiting loop");
    }

    /// One health check, plus a recovery attempt if anything is failed.
    async fn cycle(&self) -> Result<(), PoolError> {
        let report = self.manager.check_health(self.pool_id).await?;
        tracing::debug!(
            pool = %self.pool_id,
            status = ?report.status,
            health = report.health_percentage,
            "Scheduled health check finished"
        );

        if self.manager.has_failed_servers(self.pool_id)? {
            self.manager.attempt_recovery(self.pool_id).await?;
        }
        Ok(())
    }
}

/// Spawn a monitor for every pool currently known to `manager`.
pub fn spawn_all(manager: &Arc<PoolManager>, config: &HealthCheckConfig, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    manager
        .list_pools()
        .into_iter()
        .map(|pool| {
            let monitor = PoolMonitor::new(Arc::clone(manager), pool.id, config);
            tokio::spawn(monitor.run(shutdown.subscribe()))
        })
        .collect()
}
