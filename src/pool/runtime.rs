//! Per-pool configuration and runtime state.
//!
//! # Responsibilities
//! - Hold a pool's members, their runtime state and the derived active/failed lists
//! - Apply a finished batch of probe results under the pool lock
//! - Serve selections and statistics from cached state
//!
//! # Design Decisions
//! - One mutex per pool; it is never held across an await point
//! - Active/failed lists are recomputed after every mutation, never patched
//! - The round-robin cursor survives recomputation, reduced modulo the new size

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use crate::health::checker::HealthCheckResult;
use crate::health::state::{ServerRuntimeState, ServerStatus, TrackerPolicy, Transition};
use crate::load_balancer::{select_server, Candidate, LoadBalanceMethod, Selection};
use crate::pool::manager::ManagerSettings;
use crate::pool::report::{health_percentage, PoolStatistics, ResponseTimeSummary, ServerStatistics};
use crate::pool::types::{PoolId, ServerDescriptor, ServerId};

/// Operator-facing pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub description: String,
    pub load_balance_method: LoadBalanceMethod,
    pub failover_enabled: bool,
    /// Weight overrides by member; members without one use their descriptor weight.
    pub weights: HashMap<ServerId, f64>,
}

impl PoolConfig {
    pub fn weight_of(&self, server: &ServerDescriptor) -> f64 {
        self.weights.get(&server.id).copied().unwrap_or(server.weight)
    }
}

/// Derived view of which members may currently be selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRuntimeState {
    /// Active members in pool order.
    pub active_servers: Vec<ServerId>,
    pub failed_servers: BTreeSet<ServerId>,
    pub round_robin_cursor: usize,
}

impl PoolRuntimeState {
    /// Rebuild the active/failed partition from member states.
    pub fn recompute(&mut self, members: &[ServerDescriptor], states: &HashMap<ServerId, ServerRuntimeState>) {
        let previous = self.active_servers.len();
        self.active_servers.clear();
        self.failed_servers.clear();

        for member in members {
            match states.get(&member.id).map(|s| s.status) {
                Some(ServerStatus::Active) | None => self.active_servers.push(member.id),
                Some(ServerStatus::Failed) => {
                    self.failed_servers.insert(member.id);
                }
                Some(ServerStatus::Maintenance) => {}
            }
        }

        let len = self.active_servers.len();
        if len != previous {
            self.round_robin_cursor = if len == 0 { 0 } else { self.round_robin_cursor % len };
        }
    }
}

/// A result after it has been applied to its server.
#[derive(Debug, Clone)]
pub struct AppliedResult {
    pub result: HealthCheckResult,
    pub server_name: String,
    pub status: ServerStatus,
    pub consecutive_failures: u32,
    pub transition: Option<Transition>,
}

/// Pool-wide counts taken right after a batch was applied.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub pool_name: String,
    pub applied: Vec<AppliedResult>,
    pub total: usize,
    pub active: usize,
    pub failed: usize,
    pub maintenance: usize,
}

/// Short description of a pool for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSummary {
    pub id: PoolId,
    pub name: String,
    pub load_balance_method: LoadBalanceMethod,
    pub total_servers: usize,
    pub active_servers: usize,
    pub failed_servers: usize,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    pub config: PoolConfig,
    pub members: Vec<ServerDescriptor>,
    pub states: HashMap<ServerId, ServerRuntimeState>,
    pub runtime: PoolRuntimeState,
    pub last_health_check: Option<SystemTime>,
}

impl PoolInner {
    pub fn recompute(&mut self) {
        self.runtime.recompute(&self.members, &self.states);
    }

    pub fn is_member(&self, server: ServerId) -> bool {
        self.members.iter().any(|m| m.id == server)
    }

    fn policy(&self, settings: &ManagerSettings) -> TrackerPolicy {
        TrackerPolicy {
            failover_threshold: settings.failover_threshold,
            failover_enabled: self.config.failover_enabled,
            response_window: settings.response_window,
        }
    }

    /// Fail every Active member already past the threshold. Returns the newly
    /// failed members with their failure counts.
    pub fn enforce_failover(&mut self, settings: &ManagerSettings) -> Vec<(ServerId, u32)> {
        let policy = self.policy(settings);
        let mut failed = Vec::new();
        for member in &self.members {
            let Some(state) = self.states.get_mut(&member.id) else {
                continue;
            };
            if state.enforce(&policy).is_some() {
                failed.push((member.id, state.consecutive_failures));
            }
        }
        if !failed.is_empty() {
            self.recompute();
        }
        failed
    }

    fn member_name(&self, server: ServerId) -> String {
        self.members
            .iter()
            .find(|m| m.id == server)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| format!("server {}", server))
    }
}

/// A pool and its lock.
#[derive(Debug)]
pub struct Pool {
    pub id: PoolId,
    inner: Mutex<PoolInner>,
}

impl Pool {
    pub(crate) fn new(id: PoolId, config: PoolConfig, members: Vec<ServerDescriptor>) -> Self {
        let states = members.iter().map(|m| (m.id, ServerRuntimeState::new())).collect();
        let mut inner = PoolInner {
            config,
            members,
            states,
            runtime: PoolRuntimeState::default(),
            last_health_check: None,
        };
        inner.recompute();
        Self {
            id,
            inner: Mutex::new(inner),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> String {
        self.lock().config.name.clone()
    }

    pub fn config(&self) -> PoolConfig {
        self.lock().config.clone()
    }

    pub fn runtime(&self) -> PoolRuntimeState {
        self.lock().runtime.clone()
    }

    pub fn members(&self) -> Vec<ServerDescriptor> {
        self.lock().members.clone()
    }

    pub fn server_state(&self, server: ServerId) -> Option<ServerRuntimeState> {
        self.lock().states.get(&server).cloned()
    }

    pub fn summary(&self) -> PoolSummary {
        let inner = self.lock();
        PoolSummary {
            id: self.id,
            name: inner.config.name.clone(),
            load_balance_method: inner.config.load_balance_method,
            total_servers: inner.members.len(),
            active_servers: inner.runtime.active_servers.len(),
            failed_servers: inner.runtime.failed_servers.len(),
        }
    }

    /// Members a routine health check should probe (everything not in maintenance).
    pub fn probe_targets(&self) -> Vec<ServerDescriptor> {
        let inner = self.lock();
        inner
            .members
            .iter()
            .filter(|m| {
                inner
                    .states
                    .get(&m.id)
                    .map_or(true, |s| s.status != ServerStatus::Maintenance)
            })
            .cloned()
            .collect()
    }

    /// Members currently in the failed set.
    pub fn failed_targets(&self) -> Vec<ServerDescriptor> {
        let inner = self.lock();
        inner
            .members
            .iter()
            .filter(|m| inner.runtime.failed_servers.contains(&m.id))
            .cloned()
            .collect()
    }

    pub fn has_failed_servers(&self) -> bool {
        !self.lock().runtime.failed_servers.is_empty()
    }

    /// Apply a finished batch and recompute the runtime state.
    ///
    /// Results for servers that left the pool while the batch was running are dropped.
    pub fn apply_results(&self, results: Vec<HealthCheckResult>, settings: &ManagerSettings) -> BatchOutcome {
        let mut inner = self.lock();
        let policy = inner.policy(settings);

        let mut applied = Vec::with_capacity(results.len());
        for result in results {
            let server_name = inner.member_name(result.server_id);
            let Some(state) = inner.states.get_mut(&result.server_id) else {
                tracing::debug!(server = %result.server_id, "Dropping result for departed member");
                continue;
            };
            let transition = state.apply(&result, &policy);
            applied.push(AppliedResult {
                status: state.status,
                consecutive_failures: state.consecutive_failures,
                transition,
                server_name,
                result,
            });
        }

        inner.recompute();
        inner.last_health_check = Some(SystemTime::now());

        let maintenance = inner
            .states
            .values()
            .filter(|s| s.status == ServerStatus::Maintenance)
            .count();

        BatchOutcome {
            pool_name: inner.config.name.clone(),
            applied,
            total: inner.members.len(),
            active: inner.runtime.active_servers.len(),
            failed: inner.runtime.failed_servers.len(),
            maintenance,
        }
    }

    /// Pick the next server using the pool's method. Never performs I/O.
    pub fn select<F>(&self, response_samples: usize, recent_checks: F) -> Option<(ServerDescriptor, LoadBalanceMethod)>
    where
        F: Fn(ServerId) -> usize,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let method = inner.config.load_balance_method;
        let wants_counts = method == LoadBalanceMethod::LeastConnections;

        let candidates: Vec<Candidate<'_>> = inner
            .runtime
            .active_servers
            .iter()
            .filter_map(|id| {
                let descriptor = inner.members.iter().find(|m| m.id == *id)?;
                let state = inner.states.get(id)?;
                Some(Candidate {
                    id: *id,
                    weight: inner.config.weight_of(descriptor),
                    state,
                    recent_checks: if wants_counts { recent_checks(*id) } else { 0 },
                })
            })
            .collect();

        let mut selection = Selection {
            candidates: &candidates,
            cursor: &mut inner.runtime.round_robin_cursor,
            response_samples,
        };
        let chosen = select_server(method, &mut selection)?;

        inner
            .members
            .iter()
            .find(|m| m.id == chosen)
            .cloned()
            .map(|descriptor| (descriptor, method))
    }

    /// Statistics derived purely from member runtime state.
    pub fn statistics(&self) -> PoolStatistics {
        let inner = self.lock();
        let mut all_samples = Vec::new();
        let mut servers = Vec::with_capacity(inner.members.len());

        for member in &inner.members {
            let Some(state) = inner.states.get(&member.id) else {
                continue;
            };
            let samples: Vec<f64> = state.recent_response_ms.iter().copied().collect();
            all_samples.extend_from_slice(&samples);
            servers.push(ServerStatistics {
                server_id: member.id,
                server_name: member.name.clone(),
                status: state.status,
                consecutive_failures: state.consecutive_failures,
                last_success: state.last_success,
                response_time: ResponseTimeSummary::from_samples(&samples),
            });
        }

        let total = inner.members.len();
        let active = inner.runtime.active_servers.len();
        PoolStatistics {
            pool_id: self.id,
            pool_name: inner.config.name.clone(),
            load_balance_method: inner.config.load_balance_method,
            failover_enabled: inner.config.failover_enabled,
            total_servers: total,
            active_servers: active,
            failed_servers: inner.runtime.failed_servers.len(),
            availability_percentage: health_percentage(active, total),
            last_health_check: inner.last_health_check,
            servers,
            performance: ResponseTimeSummary::from_samples(&all_samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pool(n: u64, method: LoadBalanceMethod) -> Pool {
        let members = (1..=n).map(|i| ServerDescriptor::new(i, format!("s{}.example", i))).collect();
        let config = PoolConfig {
            name: "test".into(),
            description: String::new(),
            load_balance_method: method,
            failover_enabled: true,
            weights: HashMap::new(),
        };
        Pool::new(PoolId::new(), config, members)
    }

    fn fail(id: u64) -> HealthCheckResult {
        HealthCheckResult::failure(ServerId(id), Duration::from_millis(3), "unreachable")
    }

    fn ok(id: u64, ms: u64) -> HealthCheckResult {
        HealthCheckResult::success(ServerId(id), Duration::from_millis(ms), 0.0, 0.0, 1)
    }

    #[test]
    fn test_new_pool_is_all_active() {
        let p = pool(3, LoadBalanceMethod::RoundRobin);
        let rt = p.runtime();
        assert_eq!(rt.active_servers, vec![ServerId(1), ServerId(2), ServerId(3)]);
        assert!(rt.failed_servers.is_empty());
    }

    #[test]
    fn test_partition_is_disjoint() {
        let p = pool(3, LoadBalanceMethod::RoundRobin);
        let settings = ManagerSettings::default();
        for _ in 0..3 {
            p.apply_results(vec![ok(1, 5), fail(2), ok(3, 7)], &settings);
        }
        p.lock().states.get_mut(&ServerId(3)).unwrap().set_maintenance(true);
        p.lock().recompute();

        let rt = p.runtime();
        assert_eq!(rt.active_servers, vec![ServerId(1)]);
        assert_eq!(rt.failed_servers.iter().copied().collect::<Vec<_>>(), vec![ServerId(2)]);
        assert_eq!(p.probe_targets().len(), 2);
    }

    #[test]
    fn test_cursor_reduced_when_active_set_changes() {
        let p = pool(3, LoadBalanceMethod::RoundRobin);
        let settings = ManagerSettings::default();
        // Advance cursor to 2 (next pick would be server 3)
        p.select(10, |_| 0);
        p.select(10, |_| 0);
        assert_eq!(p.runtime().round_robin_cursor, 2);

        for _ in 0..3 {
            p.apply_results(vec![fail(1)], &settings);
        }
        let rt = p.runtime();
        assert_eq!(rt.active_servers, vec![ServerId(2), ServerId(3)]);
        assert_eq!(rt.round_robin_cursor, 0);
    }

    #[test]
    fn test_results_for_departed_members_are_dropped() {
        let p = pool(2, LoadBalanceMethod::RoundRobin);
        let outcome = p.apply_results(vec![ok(1, 4), fail(99)], &ManagerSettings::default());
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.total, 2);
    }

    #[test]
    fn test_statistics() {
        let p = pool(2, LoadBalanceMethod::ResponseTime);
        let settings = ManagerSettings::default();
        p.apply_results(vec![ok(1, 10), ok(2, 30)], &settings);
        p.apply_results(vec![ok(1, 20), fail(2)], &settings);

        let stats = p.statistics();
        assert_eq!(stats.total_servers, 2);
        assert_eq!(stats.availability_percentage, 100.0);
        let perf = stats.performance.unwrap();
        assert_eq!(perf.samples, 3);
        assert_eq!(perf.mean_ms, 20.0);
        assert_eq!(perf.median_ms, 20.0);
        let s1 = stats.servers.iter().find(|s| s.server_id == ServerId(1)).unwrap();
        assert_eq!(s1.response_time.unwrap().max_ms, 20.0);
        let s2 = stats.servers.iter().find(|s| s.server_id == ServerId(2)).unwrap();
        assert_eq!(s2.consecutive_failures, 1);
    }

    #[test]
    fn test_weight_override() {
        let mut config = pool(2, LoadBalanceMethod::Weighted).config();
        config.weights.insert(ServerId(1), 0.0);
        let d = ServerDescriptor::new(1, "a").with_weight(3.0);
        assert_eq!(config.weight_of(&d), 0.0);
        let d2 = ServerDescriptor::new(2, "b").with_weight(3.0);
        assert_eq!(config.weight_of(&d2), 3.0);
    }
}
