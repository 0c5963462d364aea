//! Batch health checking.
//!
//! # Responsibilities
//! - Probe every member of a pool concurrently
//! - Bound the number of in-flight probes
//! - Turn probe errors and timeouts into failed results
//!
//! # Design Decisions
//! - A failing member never fails the batch
//! - Results come back in completion order, not input order
//! - Workers return values only; state is applied by the caller afterwards

use std::sync::Arc;
use std::time::{Duration, Instant};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::observability::metrics;
use crate::pool::types::{ServerDescriptor, ServerId};
use crate::probe::TimeProbe;

/// Upper bound on in-flight probes when the caller does not choose one.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Outcome of probing one server once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub server_id: ServerId,
    pub success: bool,
    pub response_time: Duration,
    /// Clock offset in seconds (0 on failure).
    pub offset: f64,
    /// Round-trip delay in seconds (0 on failure).
    pub delay: f64,
    pub stratum: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn success(server_id: ServerId, response_time: Duration, offset: f64, delay: f64, stratum: u8) -> Self {
        Self {
            server_id,
            success: true,
            response_time,
            offset,
            delay,
            stratum,
            error: None,
        }
    }

    pub fn failure(server_id: ServerId, response_time: Duration, error: impl Into<String>) -> Self {
        Self {
            server_id,
            success: false,
            response_time,
            offset: 0.0,
            delay: 0.0,
            stratum: 0,
            error: Some(error.into()),
        }
    }

    pub fn response_time_ms(&self) -> f64 {
        self.response_time.as_secs_f64() * 1000.0
    }
}

/// Effective concurrency for a batch of `pool_size` members.
pub fn effective_concurrency(pool_size: usize, max_concurrency: usize) -> usize {
    pool_size.min(max_concurrency).max(1)
}

/// Runs probes for pool members.
#[derive(Clone)]
pub struct HealthChecker {
    probe: Arc<dyn TimeProbe>,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker").finish_non_exhaustive()
    }
}

impl HealthChecker {
    pub fn new(probe: Arc<dyn TimeProbe>) -> Self {
        Self { probe }
    }

    /// Probe all `members`, at most `max_concurrency` at a time.
    pub async fn check_pool(
        &self,
        members: &[ServerDescriptor],
        timeout: Duration,
        max_concurrency: usize,
    ) -> Vec<HealthCheckResult> {
        if members.is_empty() {
            return Vec::new();
        }

        let limit = effective_concurrency(members.len(), max_concurrency);
        tracing::debug!(members = members.len(), concurrency = limit, "Starting health check batch");

        // Each probe future owns its checker and server so the batch stays `Send`
        stream::iter(members.to_vec())
            .map(|server| {
                let checker = self.clone();
                async move { checker.check_server(&server, timeout).await }
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Probe a single server, never returning an error.
    pub async fn check_server(&self, server: &ServerDescriptor, timeout: Duration) -> HealthCheckResult {
        let started = Instant::now();
        let outcome = time::timeout(timeout, self.probe.probe(&server.host, server.port, timeout)).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(Ok(sample)) => HealthCheckResult::success(
                server.id,
                sample.response_time,
                sample.offset,
                sample.delay,
                sample.stratum,
            ),
            Ok(Err(e)) => {
                tracing::warn!(server = %server.id, addr = %server.address(), error = %e, "Probe failed");
                HealthCheckResult::failure(server.id, elapsed, e.to_string())
            }
            Err(_) => {
                tracing::warn!(server = %server.id, addr = %server.address(), "Probe failed: timeout");
                HealthCheckResult::failure(server.id, elapsed, format!("probe timed out after {:?}", timeout))
            }
        };

        metrics::record_probe(result.success, elapsed);
        result
    }
}
