//! Pool manager.
//!
//! # Responsibilities
//! - Own the server registry and every pool
//! - Run health checks and recovery attempts against a pool
//! - Hand out servers using each pool's load balancing method
//! - Administrative changes: membership, maintenance, configuration
//!
//! # Design Decisions
//! - Pools live in a `DashMap`; a pool is cloned out as `Arc` before any await
//! - Probing happens outside the pool lock; results are applied in one locked pass,
//!   so dropping a `check_health` future mid-batch leaves state untouched
//! - Probe failures are data, never errors
//! - Manager-wide tunables are swapped atomically on config reload
//!
//! # Data Flow
//! ```text
//! check_health(pool)
//!     → lock, snapshot non-maintenance members, unlock
//!     → HealthChecker::check_pool (bounded fan-out)
//!     → HealthStore::save_result for each result
//!     → lock, apply results, recompute active/failed, unlock
//!     → PoolEvent for every transition
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::health::checker::{HealthCheckResult, HealthChecker, DEFAULT_MAX_CONCURRENCY};
use crate::health::state::{
    ServerStatus, Transition, DEFAULT_FAILOVER_THRESHOLD, DEFAULT_RESPONSE_WINDOW,
};
use crate::load_balancer::LoadBalanceMethod;
use crate::observability::metrics;
use crate::pool::events::{EventBus, PoolEvent};
use crate::pool::report::{
    health_percentage, PoolHealthReport, PoolStatistics, PoolStatus, RecoveryOutcome,
    RecoveryReport, ServerCheckOutcome, ServerRecovery,
};
use crate::pool::runtime::{AppliedResult, BatchOutcome, Pool, PoolConfig, PoolSummary};
use crate::pool::types::{PoolError, PoolId, PoolSpec, ServerDescriptor, ServerId};
use crate::probe::TimeProbe;
use crate::store::{HealthStore, MemoryStore};

/// Minimum members a pool must keep.
pub const MIN_POOL_MEMBERS: usize = 2;

/// Tunables shared by every pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Per-probe timeout.
    pub check_timeout: Duration,
    pub max_concurrency: usize,
    pub failover_threshold: u32,
    /// Response times kept per server.
    pub response_window: usize,
    /// Samples averaged by the response time method.
    pub response_time_samples: usize,
    /// Trailing window counted by the least connections method.
    pub least_connections_window: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(5),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            failover_threshold: DEFAULT_FAILOVER_THRESHOLD,
            response_window: DEFAULT_RESPONSE_WINDOW,
            response_time_samples: 10,
            least_connections_window: Duration::from_secs(3600),
        }
    }
}

/// Partial update of a pool's configuration. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub load_balance_method: Option<LoadBalanceMethod>,
    pub failover_enabled: Option<bool>,
    /// Replaces the whole weight map.
    pub weights: Option<std::collections::HashMap<ServerId, f64>>,
}

/// Owns servers and pools.
pub struct PoolManager {
    servers: DashMap<ServerId, ServerDescriptor>,
    pools: DashMap<PoolId, Arc<Pool>>,
    /// Name index; the entry is claimed before a pool takes the name.
    pool_names: DashMap<String, PoolId>,
    checker: HealthChecker,
    store: Arc<dyn HealthStore>,
    events: EventBus,
    settings: ArcSwap<ManagerSettings>,
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("servers", &self.servers.len())
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}

impl PoolManager {
    /// Create a manager probing through `probe`, backed by an in-memory store.
    pub fn new(probe: Arc<dyn TimeProbe>, settings: ManagerSettings) -> Self {
        Self {
            servers: DashMap::new(),
            pools: DashMap::new(),
            pool_names: DashMap::new(),
            checker: HealthChecker::new(probe),
            store: Arc::new(MemoryStore::default()),
            events: EventBus::default(),
            settings: ArcSwap::from_pointee(settings),
        }
    }

    /// Replace the health store.
    pub fn with_store(mut self, store: Arc<dyn HealthStore>) -> Self {
        self.store = store;
        self
    }

    pub fn settings(&self) -> Arc<ManagerSettings> {
        self.settings.load_full()
    }

    /// Swap manager-wide tunables. Members already past a lowered threshold
    /// are failed immediately; everything else takes effect on the next operation.
    pub fn apply_settings(&self, settings: ManagerSettings) {
        tracing::info!(
            timeout = ?settings.check_timeout,
            threshold = settings.failover_threshold,
            concurrency = settings.max_concurrency,
            "Applying manager settings"
        );
        let settings = Arc::new(settings);
        self.settings.store(Arc::clone(&settings));

        let pools: Vec<Arc<Pool>> = self.pools.iter().map(|p| Arc::clone(p.value())).collect();
        for pool in pools {
            let (name, failed) = {
                let mut inner = pool.lock();
                (inner.config.name.clone(), inner.enforce_failover(&settings))
            };
            self.announce_failed(pool.id, &name, &failed);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    // --- Registry ---

    /// Register or replace a server. Existing pool members keep the descriptor
    /// they were created with.
    pub fn register_server(&self, server: ServerDescriptor) -> Option<ServerDescriptor> {
        tracing::debug!(server = %server.id, addr = %server.address(), "Registering server");
        self.servers.insert(server.id, server)
    }

    pub fn server(&self, id: ServerId) -> Option<ServerDescriptor> {
        self.servers.get(&id).map(|s| s.value().clone())
    }

    // --- Pool lifecycle ---

    /// Create a pool from `spec`.
    pub fn create_pool(&self, spec: PoolSpec) -> Result<PoolId, PoolError> {
        let name = spec.name.trim().to_string();
        if name.is_empty() {
            return Err(PoolError::InvalidPoolConfiguration("pool name must not be empty".into()));
        }
        validate_weights(&spec.weights)?;

        let members = self.resolve_members(&spec.members)?;
        if members.len() < MIN_POOL_MEMBERS {
            return Err(PoolError::InvalidPoolConfiguration(format!(
                "pool requires at least {} usable servers, got {}",
                MIN_POOL_MEMBERS,
                members.len()
            )));
        }

        let id = PoolId::new();
        self.reserve_name(&name, id)?;
        let config = PoolConfig {
            name: name.clone(),
            description: spec.description,
            load_balance_method: spec.load_balance_method,
            failover_enabled: spec.failover_enabled,
            weights: spec.weights,
        };
        let member_count = members.len();
        self.pools.insert(id, Arc::new(Pool::new(id, config, members)));

        tracing::info!(
            pool = %id,
            name = %name,
            members = member_count,
            method = %spec.load_balance_method,
            "Pool created"
        );
        Ok(id)
    }

    /// Register the servers of a pool kept in the store, then create it.
    pub fn load_pool(&self, name: &str) -> Result<PoolId, PoolError> {
        let (spec, servers) = self
            .store
            .load_pool(name)
            .ok_or_else(|| PoolError::InvalidPoolConfiguration(format!("no stored pool named '{}'", name)))?;
        for server in servers {
            self.register_server(server);
        }
        self.create_pool(spec)
    }

    pub fn delete_pool(&self, pool_id: PoolId) -> Result<(), PoolError> {
        let (_, pool) = self.pools.remove(&pool_id).ok_or(PoolError::PoolNotFound(pool_id))?;
        let name = pool.name();
        self.pool_names.remove_if(&name, |_, id| *id == pool_id);
        tracing::info!(pool = %pool_id, name = %name, "Pool deleted");
        Ok(())
    }

    pub fn list_pools(&self) -> Vec<PoolSummary> {
        let mut pools: Vec<PoolSummary> = self.pools.iter().map(|p| p.value().summary()).collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
    }

    pub fn find_pool(&self, name: &str) -> Option<PoolId> {
        self.pool_names.get(name).map(|entry| *entry.value())
    }

    /// Shared handle to a pool.
    pub fn pool(&self, pool_id: PoolId) -> Result<Arc<Pool>, PoolError> {
        self.pools
            .get(&pool_id)
            .map(|p| Arc::clone(p.value()))
            .ok_or(PoolError::PoolNotFound(pool_id))
    }

    // --- Health ---

    /// Probe every non-maintenance member and apply the results.
    pub async fn check_health(&self, pool_id: PoolId) -> Result<PoolHealthReport, PoolError> {
        let pool = self.pool(pool_id)?;
        let settings = self.settings.load_full();
        let targets = pool.probe_targets();

        let results = self
            .checker
            .check_pool(&targets, settings.check_timeout, settings.max_concurrency)
            .await;
        let healthy = results.iter().filter(|r| r.success).count();
        let unhealthy = results.len() - healthy;

        let outcome = self.apply_batch(&pool, results);
        let percentage = health_percentage(healthy, outcome.total);
        metrics::record_health_percentage(&outcome.pool_name, percentage);

        tracing::info!(
            pool = %pool_id,
            name = %outcome.pool_name,
            healthy,
            total = outcome.total,
            health = %format!("{:.1}%", percentage),
            "Health check complete"
        );

        Ok(PoolHealthReport {
            pool_id,
            pool_name: outcome.pool_name,
            total_servers: outcome.total,
            active_servers: healthy,
            failed_servers: unhealthy,
            maintenance_servers: outcome.maintenance,
            health_percentage: percentage,
            status: PoolStatus::from_percentage(percentage),
            checked_at: SystemTime::now(),
            servers: outcome
                .applied
                .into_iter()
                .map(|a| ServerCheckOutcome {
                    server_id: a.result.server_id,
                    server_name: a.server_name,
                    status: a.status,
                    consecutive_failures: a.consecutive_failures,
                    result: a.result,
                })
                .collect(),
        })
    }

    /// Probe only the failed members; successes move back to the active set.
    pub async fn attempt_recovery(&self, pool_id: PoolId) -> Result<RecoveryReport, PoolError> {
        let pool = self.pool(pool_id)?;
        let settings = self.settings.load_full();
        let targets = pool.failed_targets();

        if targets.is_empty() {
            return Ok(RecoveryReport {
                pool_id,
                attempted: 0,
                recovered: 0,
                recovery_rate: 0.0,
                servers: Vec::new(),
            });
        }

        tracing::info!(pool = %pool_id, failed = targets.len(), "Attempting recovery");
        let results = self
            .checker
            .check_pool(&targets, settings.check_timeout, settings.max_concurrency)
            .await;
        let outcome = self.apply_batch(&pool, results);

        let servers: Vec<ServerRecovery> = outcome
            .applied
            .into_iter()
            .map(|a| ServerRecovery {
                server_id: a.result.server_id,
                server_name: a.server_name,
                outcome: if a.status == ServerStatus::Active {
                    RecoveryOutcome::Recovered
                } else {
                    RecoveryOutcome::StillFailed
                },
                consecutive_failures: a.consecutive_failures,
                result: a.result,
            })
            .collect();

        let attempted = servers.len();
        let recovered = servers.iter().filter(|s| s.outcome == RecoveryOutcome::Recovered).count();
        tracing::info!(pool = %pool_id, attempted, recovered, "Recovery attempt complete");

        Ok(RecoveryReport {
            pool_id,
            attempted,
            recovered,
            recovery_rate: health_percentage(recovered, attempted),
            servers,
        })
    }

    /// Whether a pool currently has members in the failed set.
    pub fn has_failed_servers(&self, pool_id: PoolId) -> Result<bool, PoolError> {
        Ok(self.pool(pool_id)?.has_failed_servers())
    }

    /// Apply under the settings current at apply time, not those the batch started with.
    fn apply_batch(&self, pool: &Pool, results: Vec<HealthCheckResult>) -> BatchOutcome {
        for result in &results {
            self.store.save_result(pool.id, result);
        }

        let outcome = pool.apply_results(results, &self.settings.load());
        for applied in &outcome.applied {
            self.publish_transition(pool.id, &outcome.pool_name, applied);
        }
        outcome
    }

    fn publish_transition(&self, pool_id: PoolId, pool_name: &str, applied: &AppliedResult) {
        let server = applied.result.server_id;
        metrics::record_server_up(pool_name, server, applied.status == ServerStatus::Active);

        match applied.transition {
            Some(Transition::Failed) => self.publish_failed(pool_id, server, applied.consecutive_failures),
            Some(Transition::Recovered) => {
                tracing::info!(pool = %pool_id, server = %server, "Server recovered");
                metrics::record_transition(Transition::Recovered);
                self.events.publish(PoolEvent::ServerRecovered { pool: pool_id, server });
            }
            None => {}
        }
    }

    fn publish_failed(&self, pool_id: PoolId, server: ServerId, failures: u32) {
        tracing::warn!(pool = %pool_id, server = %server, failures, "Server marked failed");
        metrics::record_transition(Transition::Failed);
        self.events.publish(PoolEvent::ServerFailed { pool: pool_id, server });
    }

    /// Publish members failed by a policy change rather than a probe.
    fn announce_failed(&self, pool_id: PoolId, pool_name: &str, failed: &[(ServerId, u32)]) {
        for (server, failures) in failed {
            metrics::record_server_up(pool_name, *server, false);
            self.publish_failed(pool_id, *server, *failures);
        }
    }

    // --- Selection ---

    /// Choose a server from the pool's active set. Never performs I/O.
    pub fn get_next_server(&self, pool_id: PoolId) -> Result<ServerDescriptor, PoolError> {
        let pool = self.pool(pool_id)?;
        let settings = self.settings.load();
        let window = settings.least_connections_window;

        let (server, method) = pool
            .select(settings.response_time_samples, |id| self.store.recent_check_count(id, window))
            .ok_or_else(|| {
                tracing::warn!(pool = %pool_id, "No available server");
                PoolError::NoAvailableServer(pool_id)
            })?;

        tracing::debug!(pool = %pool_id, server = %server.id, method = %method, "Server selected");
        metrics::record_selection(&pool.name(), method);
        Ok(server)
    }

    pub fn get_statistics(&self, pool_id: PoolId) -> Result<PoolStatistics, PoolError> {
        Ok(self.pool(pool_id)?.statistics())
    }

    // --- Administration ---

    /// Enabling failover fails members already past the threshold.
    pub fn update_pool(&self, pool_id: PoolId, update: PoolUpdate) -> Result<(), PoolError> {
        let pool = self.pool(pool_id)?;

        let rename = match &update.name {
            Some(name) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(PoolError::InvalidPoolConfiguration("pool name must not be empty".into()));
                }
                Some(name.to_string())
            }
            None => None,
        };
        if let Some(weights) = &update.weights {
            validate_weights(weights)?;
        }
        if let Some(name) = &rename {
            self.reserve_name(name, pool_id)?;
        }

        let settings = self.settings.load_full();
        let mut inner = pool.lock();
        let previous_name = match rename {
            Some(name) if name != inner.config.name => Some(std::mem::replace(&mut inner.config.name, name)),
            _ => None,
        };
        if let Some(description) = update.description {
            inner.config.description = description;
        }
        if let Some(method) = update.load_balance_method {
            inner.config.load_balance_method = method;
        }
        if let Some(enabled) = update.failover_enabled {
            inner.config.failover_enabled = enabled;
        }
        if let Some(weights) = update.weights {
            inner.config.weights = weights;
        }
        let newly_failed = inner.enforce_failover(&settings);
        let pool_name = inner.config.name.clone();

        tracing::info!(
            pool = %pool_id,
            name = %pool_name,
            method = %inner.config.load_balance_method,
            failover = inner.config.failover_enabled,
            "Pool updated"
        );
        drop(inner);

        if let Some(old) = previous_name {
            self.pool_names.remove_if(&old, |_, id| *id == pool_id);
        }
        self.announce_failed(pool_id, &pool_name, &newly_failed);
        Ok(())
    }

    /// Claim `name` for `pool_id`; fails if another pool holds it.
    fn reserve_name(&self, name: &str, pool_id: PoolId) -> Result<(), PoolError> {
        match self.pool_names.entry(name.to_string()) {
            Entry::Occupied(entry) if *entry.get() != pool_id => Err(PoolError::InvalidPoolConfiguration(
                format!("pool name '{}' already in use", name),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(pool_id);
                Ok(())
            }
        }
    }

    /// Add a registered server to a pool. Adding an existing member is a no-op.
    pub fn add_member(&self, pool_id: PoolId, server_id: ServerId) -> Result<(), PoolError> {
        let pool = self.pool(pool_id)?;
        let server = self.server(server_id).ok_or_else(|| {
            PoolError::InvalidPoolConfiguration(format!("unknown server id {}", server_id))
        })?;
        if !server.enabled {
            return Err(PoolError::InvalidPoolConfiguration(format!(
                "server {} is disabled",
                server_id
            )));
        }

        let mut inner = pool.lock();
        if inner.is_member(server_id) {
            return Ok(());
        }
        inner.states.insert(server_id, Default::default());
        inner.members.push(server);
        inner.recompute();

        tracing::info!(pool = %pool_id, server = %server_id, "Member added");
        Ok(())
    }

    pub fn remove_member(&self, pool_id: PoolId, server_id: ServerId) -> Result<(), PoolError> {
        let pool = self.pool(pool_id)?;
        let mut inner = pool.lock();

        if !inner.is_member(server_id) {
            return Err(PoolError::ServerNotInPool { pool: pool_id, server: server_id });
        }
        if inner.members.len() <= MIN_POOL_MEMBERS {
            return Err(PoolError::InvalidPoolConfiguration(format!(
                "pool must keep at least {} members",
                MIN_POOL_MEMBERS
            )));
        }

        inner.members.retain(|m| m.id != server_id);
        inner.states.remove(&server_id);
        inner.config.weights.remove(&server_id);
        inner.recompute();

        tracing::info!(pool = %pool_id, server = %server_id, "Member removed");
        Ok(())
    }

    /// Enter or leave maintenance. Leaving resets the server to active.
    pub fn set_maintenance(&self, pool_id: PoolId, server_id: ServerId, on: bool) -> Result<(), PoolError> {
        let pool = self.pool(pool_id)?;
        let mut inner = pool.lock();

        let state = inner
            .states
            .get_mut(&server_id)
            .ok_or(PoolError::ServerNotInPool { pool: pool_id, server: server_id })?;
        state.set_maintenance(on);
        inner.recompute();

        tracing::info!(pool = %pool_id, server = %server_id, maintenance = on, "Maintenance updated");
        Ok(())
    }

    fn resolve_members(&self, ids: &[ServerId]) -> Result<Vec<ServerDescriptor>, PoolError> {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let server = self.server(*id).ok_or_else(|| {
                PoolError::InvalidPoolConfiguration(format!("unknown server id {}", id))
            })?;
            if !server.enabled {
                tracing::warn!(server = %id, "Skipping disabled server");
                continue;
            }
            members.push(server);
        }
        Ok(members)
    }
}

fn validate_weights(weights: &std::collections::HashMap<ServerId, f64>) -> Result<(), PoolError> {
    match weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        Some((id, w)) => Err(PoolError::InvalidPoolConfiguration(format!(
            "invalid weight {} for server {}",
            w, id
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeError, ProbeSample};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Succeeds for every host not listed as down.
    #[derive(Default)]
    struct SwitchProbe {
        down: Mutex<HashSet<String>>,
        probed: Mutex<Vec<String>>,
    }

    impl SwitchProbe {
        fn set_down(&self, host: &str, down: bool) {
            let mut set = self.down.lock().unwrap();
            if down {
                set.insert(host.to_string());
            } else {
                set.remove(host);
            }
        }

        fn take_probed(&self) -> Vec<String> {
            let mut probed = std::mem::take(&mut *self.probed.lock().unwrap());
            probed.sort();
            probed
        }
    }

    #[async_trait]
    impl TimeProbe for SwitchProbe {
        async fn probe(&self, host: &str, _port: u16, _timeout: Duration) -> Result<ProbeSample, ProbeError> {
            self.probed.lock().unwrap().push(host.to_string());
            if self.down.lock().unwrap().contains(host) {
                return Err(ProbeError::Timeout(Duration::from_millis(10)));
            }
            Ok(ProbeSample {
                response_time: Duration::from_millis(12),
                offset: 0.001,
                delay: 0.012,
                stratum: 2,
            })
        }
    }

    fn manager(n: u64) -> (PoolManager, Arc<SwitchProbe>) {
        let probe = Arc::new(SwitchProbe::default());
        let manager = PoolManager::new(probe.clone(), ManagerSettings::default());
        for i in 1..=n {
            manager.register_server(ServerDescriptor::new(i, format!("s{}", i)));
        }
        (manager, probe)
    }

    #[test]
    fn test_create_pool_validation() {
        let (m, _) = manager(3);

        let err = m.create_pool(PoolSpec::new("one", [1])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let err = m.create_pool(PoolSpec::new("dupes", [1, 1])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let err = m.create_pool(PoolSpec::new("unknown", [1, 42])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let err = m.create_pool(PoolSpec::new("", [1, 2])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let err = m.create_pool(PoolSpec::new("neg", [1, 2]).with_weight(1, -1.0)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let id = m.create_pool(PoolSpec::new("ok", [1, 2, 2, 3])).unwrap();
        assert_eq!(m.pool(id).unwrap().members().len(), 3);

        let err = m.create_pool(PoolSpec::new("ok", [1, 2])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));
    }

    #[test]
    fn test_disabled_servers_are_skipped() {
        let (m, _) = manager(2);
        m.register_server(ServerDescriptor::new(3, "s3").disabled());

        let err = m.create_pool(PoolSpec::new("p", [1, 3])).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        let id = m.create_pool(PoolSpec::new("p", [1, 2, 3])).unwrap();
        let members: Vec<_> = m.pool(id).unwrap().members().iter().map(|s| s.id).collect();
        assert_eq!(members, vec![ServerId(1), ServerId(2)]);
    }

    #[test]
    fn test_unknown_pool() {
        let (m, _) = manager(2);
        let ghost = PoolId::new();
        assert_eq!(m.get_next_server(ghost).unwrap_err(), PoolError::PoolNotFound(ghost));
        assert_eq!(m.get_statistics(ghost).unwrap_err(), PoolError::PoolNotFound(ghost));
        assert_eq!(m.delete_pool(ghost).unwrap_err(), PoolError::PoolNotFound(ghost));
    }

    #[tokio::test]
    async fn test_check_health_unknown_pool() {
        let (m, _) = manager(2);
        let ghost = PoolId::new();
        assert_eq!(m.check_health(ghost).await.unwrap_err(), PoolError::PoolNotFound(ghost));
        assert_eq!(m.attempt_recovery(ghost).await.unwrap_err(), PoolError::PoolNotFound(ghost));
    }

    #[tokio::test]
    async fn test_failover_after_threshold() {
        let (m, probe) = manager(2);
        let id = m.create_pool(PoolSpec::new("p", [1, 2]).with_method(LoadBalanceMethod::RoundRobin)).unwrap();
        let mut events = m.subscribe();
        probe.set_down("s2", true);

        let report = m.check_health(id).await.unwrap();
        assert_eq!(report.total_servers, 2);
        assert_eq!(report.active_servers, 1);
        assert_eq!(report.health_percentage, 50.0);
        assert_eq!(report.status, PoolStatus::Healthy);
        assert_eq!(m.pool(id).unwrap().runtime().active_servers.len(), 2);

        m.check_health(id).await.unwrap();
        m.check_health(id).await.unwrap();

        let runtime = m.pool(id).unwrap().runtime();
        assert_eq!(runtime.active_servers, vec![ServerId(1)]);
        assert!(runtime.failed_servers.contains(&ServerId(2)));
        assert_eq!(events.recv().await.unwrap(), PoolEvent::ServerFailed { pool: id, server: ServerId(2) });

        for _ in 0..4 {
            assert_eq!(m.get_next_server(id).unwrap().id, ServerId(1));
        }
    }

    #[tokio::test]
    async fn test_recovery_probes_only_failed() {
        let (m, probe) = manager(3);
        let id = m.create_pool(PoolSpec::new("p", [1, 2, 3])).unwrap();
        probe.set_down("s3", true);
        for _ in 0..3 {
            m.check_health(id).await.unwrap();
        }
        probe.take_probed();

        let report = m.attempt_recovery(id).await.unwrap();
        assert_eq!(probe.take_probed(), vec!["s3".to_string()]);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.recovered, 0);
        assert_eq!(report.servers[0].outcome, RecoveryOutcome::StillFailed);
        assert_eq!(report.servers[0].consecutive_failures, 4);

        probe.set_down("s3", false);
        let report = m.attempt_recovery(id).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.recovery_rate, 100.0);
        assert!(!m.has_failed_servers(id).unwrap());

        let report = m.attempt_recovery(id).await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_maintenance_servers_are_not_probed() {
        let (m, probe) = manager(3);
        let id = m.create_pool(PoolSpec::new("p", [1, 2, 3]).with_method(LoadBalanceMethod::RoundRobin)).unwrap();
        m.set_maintenance(id, ServerId(2), true).unwrap();

        let report = m.check_health(id).await.unwrap();
        assert_eq!(probe.take_probed(), vec!["s1".to_string(), "s3".to_string()]);
        assert_eq!(report.total_servers, 3);
        assert_eq!(report.maintenance_servers, 1);

        let picks: HashSet<_> = (0..4).map(|_| m.get_next_server(id).unwrap().id).collect();
        assert!(!picks.contains(&ServerId(2)));

        m.set_maintenance(id, ServerId(2), false).unwrap();
        assert_eq!(m.pool(id).unwrap().runtime().active_servers.len(), 3);

        let err = m.set_maintenance(id, ServerId(9), true).unwrap_err();
        assert_eq!(err, PoolError::ServerNotInPool { pool: id, server: ServerId(9) });
    }

    #[tokio::test]
    async fn test_failover_disabled_keeps_servers_active() {
        let (m, probe) = manager(2);
        let id = m.create_pool(PoolSpec::new("p", [1, 2]).with_failover(false)).unwrap();
        probe.set_down("s1", true);
        for _ in 0..5 {
            m.check_health(id).await.unwrap();
        }
        let pool = m.pool(id).unwrap();
        assert_eq!(pool.runtime().active_servers.len(), 2);
        assert_eq!(pool.server_state(ServerId(1)).unwrap().consecutive_failures, 5);
    }

    #[test]
    fn test_membership_changes() {
        let (m, _) = manager(4);
        let id = m.create_pool(PoolSpec::new("p", [1, 2])).unwrap();

        let err = m.remove_member(id, ServerId(1)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));

        m.add_member(id, ServerId(3)).unwrap();
        m.add_member(id, ServerId(3)).unwrap();
        assert_eq!(m.pool(id).unwrap().members().len(), 3);

        m.remove_member(id, ServerId(1)).unwrap();
        let active = m.pool(id).unwrap().runtime().active_servers;
        assert_eq!(active, vec![ServerId(2), ServerId(3)]);

        assert_eq!(
            m.remove_member(id, ServerId(4)).unwrap_err(),
            PoolError::ServerNotInPool { pool: id, server: ServerId(4) }
        );
        assert!(matches!(m.add_member(id, ServerId(99)), Err(PoolError::InvalidPoolConfiguration(_))));
    }

    #[test]
    fn test_update_pool() {
        let (m, _) = manager(3);
        let a = m.create_pool(PoolSpec::new("a", [1, 2])).unwrap();
        m.create_pool(PoolSpec::new("b", [2, 3])).unwrap();

        m.update_pool(
            a,
            PoolUpdate {
                name: Some("alpha".into()),
                load_balance_method: Some(LoadBalanceMethod::Random),
                ..Default::default()
            },
        )
        .unwrap();
        let config = m.pool(a).unwrap().config();
        assert_eq!(config.name, "alpha");
        assert_eq!(config.load_balance_method, LoadBalanceMethod::Random);
        assert_eq!(m.find_pool("alpha"), Some(a));
        assert_eq!(m.find_pool("a"), None);

        let err = m
            .update_pool(a, PoolUpdate { name: Some("b".into()), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidPoolConfiguration(_)));
    }

    #[test]
    fn test_weighted_all_zero_has_no_server() {
        let (m, _) = manager(2);
        let id = m
            .create_pool(
                PoolSpec::new("p", [1, 2])
                    .with_method(LoadBalanceMethod::Weighted)
                    .with_weight(1, 0.0)
                    .with_weight(2, 0.0),
            )
            .unwrap();
        assert_eq!(m.get_next_server(id).unwrap_err(), PoolError::NoAvailableServer(id));
    }

    #[test]
    fn test_list_and_delete() {
        let (m, _) = manager(3);
        let b = m.create_pool(PoolSpec::new("b", [1, 2])).unwrap();
        m.create_pool(PoolSpec::new("a", [2, 3])).unwrap();

        let names: Vec<_> = m.list_pools().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        m.delete_pool(b).unwrap();
        assert_eq!(m.list_pools().len(), 1);
        assert!(m.find_pool("b").is_none());
    }

    #[test]
    fn test_apply_settings_swaps_values() {
        let (m, _) = manager(2);
        let settings = ManagerSettings { failover_threshold: 1, ..Default::default() };
        m.apply_settings(settings.clone());
        assert_eq!(*m.settings(), settings);
    }

    #[tokio::test]
    async fn test_enabling_failover_fails_servers_past_threshold() {
        let (m, probe) = manager(2);
        let id = m
            .create_pool(PoolSpec::new("p", [1, 2]).with_method(LoadBalanceMethod::RoundRobin).with_failover(false))
            .unwrap();
        probe.set_down("s2", true);
        for _ in 0..5 {
            m.check_health(id).await.unwrap();
        }
        let mut events = m.subscribe();

        m.update_pool(id, PoolUpdate { failover_enabled: Some(true), ..Default::default() })
            .unwrap();

        let pool = m.pool(id).unwrap();
        let state = pool.server_state(ServerId(2)).unwrap();
        assert_eq!(state.status, ServerStatus::Failed);
        assert_eq!(state.consecutive_failures, 5);
        assert_eq!(pool.runtime().active_servers, vec![ServerId(1)]);
        assert_eq!(events.try_recv().unwrap(), PoolEvent::ServerFailed { pool: id, server: ServerId(2) });
        for _ in 0..4 {
            assert_eq!(m.get_next_server(id).unwrap().id, ServerId(1));
        }
    }

    #[tokio::test]
    async fn test_lowered_threshold_fails_servers_immediately() {
        let (m, probe) = manager(2);
        let id = m.create_pool(PoolSpec::new("p", [1, 2])).unwrap();
        probe.set_down("s2", true);
        m.check_health(id).await.unwrap();
        m.check_health(id).await.unwrap();
        assert!(m.pool(id).unwrap().server_state(ServerId(2)).unwrap().is_active());
        let mut events = m.subscribe();

        m.apply_settings(ManagerSettings { failover_threshold: 1, ..Default::default() });

        let state = m.pool(id).unwrap().server_state(ServerId(2)).unwrap();
        assert_eq!(state.status, ServerStatus::Failed);
        assert_eq!(state.consecutive_failures, 2);
        assert!(m.has_failed_servers(id).unwrap());
        assert_eq!(events.try_recv().unwrap(), PoolEvent::ServerFailed { pool: id, server: ServerId(2) });

        // The healthy member is untouched
        assert!(m.pool(id).unwrap().server_state(ServerId(1)).unwrap().is_active());
    }

    #[test]
    fn test_concurrent_creates_claim_a_name_once() {
        let (m, _) = manager(2);
        let m = Arc::new(m);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || m.create_pool(PoolSpec::new("shared", [1, 2])).is_ok())
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 1);
        assert_eq!(m.list_pools().len(), 1);
    }

    #[test]
    fn test_rename_frees_old_name() {
        let (m, _) = manager(3);
        let a = m.create_pool(PoolSpec::new("a", [1, 2])).unwrap();
        m.update_pool(a, PoolUpdate { name: Some("alpha".into()), ..Default::default() })
            .unwrap();
        // Renaming to its own name is allowed
        m.update_pool(a, PoolUpdate { name: Some("alpha".into()), ..Default::default() })
            .unwrap();

        let b = m.create_pool(PoolSpec::new("a", [2, 3])).unwrap();
        assert_eq!(m.find_pool("a"), Some(b));
        assert_eq!(m.find_pool("alpha"), Some(a));

        m.delete_pool(a).unwrap();
        assert_eq!(m.find_pool("alpha"), None);
        m.create_pool(PoolSpec::new("alpha", [1, 3])).unwrap();
    }

    #[test]
    fn test_load_pool_from_store() {
        let store = MemoryStore::default();
        store.put_pool(
            PoolSpec::new("stored", [7, 8]),
            vec![ServerDescriptor::new(7, "s7"), ServerDescriptor::new(8, "s8")],
        );
        let (m, _) = manager(0);
        let m = m.with_store(Arc::new(store));

        let id = m.load_pool("stored").unwrap();
        assert_eq!(m.find_pool("stored"), Some(id));
        assert!(m.server(ServerId(7)).is_some());
        assert!(matches!(m.load_pool("missing"), Err(PoolError::InvalidPoolConfiguration(_))));
    }
}
