//! In-process health history.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::health::checker::HealthCheckResult;
use crate::pool::types::{PoolId, PoolSpec, ServerDescriptor, ServerId};
use crate::store::HealthStore;

/// Oldest record kept for any server.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// Hard cap on records per server.
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// One stored probe outcome.
#[derive(Debug, Clone)]
pub struct CheckRecord {
    pub at: Instant,
    pub pool: PoolId,
    pub result: HealthCheckResult,
}

/// A thread-safe, bounded history of probe results.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    checks: Arc<DashMap<ServerId, VecDeque<CheckRecord>>>,
    pools: Arc<DashMap<String, (PoolSpec, Vec<ServerDescriptor>)>>,
    retention: Duration,
    max_records: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_MAX_RECORDS)
    }
}

impl MemoryStore {
    pub fn new(retention: Duration, max_records: usize) -> Self {
        Self {
            checks: Arc::new(DashMap::new()),
            pools: Arc::new(DashMap::new()),
            retention,
            max_records: max_records.max(1),
        }
    }

    /// Register a pool definition for later `load_pool` calls.
    pub fn put_pool(&self, spec: PoolSpec, servers: Vec<ServerDescriptor>) {
        self.pools.insert(spec.name.clone(), (spec, servers));
    }

    /// Record a result as if it had been taken at `at`.
    pub fn record_at(&self, pool: PoolId, result: &HealthCheckResult, at: Instant) {
        let mut history = self.checks.entry(result.server_id).or_default();
        history.push_back(CheckRecord {
            at,
            pool,
            result: result.clone(),
        });

        while history.len() > self.max_records {
            history.pop_front();
        }
        let now = Instant::now();
        while history
            .front()
            .is_some_and(|r| now.saturating_duration_since(r.at) > self.retention)
        {
            history.pop_front();
        }
    }

    /// Most recent results for a server, newest first.
    pub fn recent_results(&self, server: ServerId, limit: usize) -> Vec<HealthCheckResult> {
        self.checks
            .get(&server)
            .map(|h| h.iter().rev().take(limit).map(|r| r.result.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of stored records across all servers.
    pub fn len(&self) -> usize {
        self.checks.iter().map(|h| h.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HealthStore for MemoryStore {
    fn save_result(&self, pool: PoolId, result: &HealthCheckResult) {
        self.record_at(pool, result, Instant::now());
    }

    fn recent_check_count(&self, server: ServerId, window: Duration) -> usize {
        let now = Instant::now();
        self.checks
            .get(&server)
            .map(|h| {
                h.iter()
                    .filter(|r| now.saturating_duration_since(r.at) <= window)
                    .count()
            })
            .unwrap_or(0)
    }

    fn load_pool(&self, name: &str) -> Option<(PoolSpec, Vec<ServerDescriptor>)> {
        self.pools.get(name).map(|entry| entry.value().clone())
    }
}
