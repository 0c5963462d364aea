//! Per-server health state machine.
//!
//! # States
//! - Active: server receives traffic
//! - Failed: server excluded from selection until a probe succeeds
//! - Maintenance: set by an operator, ignored by probes
//!
//! # State Transitions
//! ```text
//! Active → Failed: consecutive failures >= failover_threshold
//! Failed → Active: one successful probe
//! any → Maintenance → Active: explicit administrative call only
//! ```
//!
//! # Design Decisions
//! - State is owned by the pool manager and mutated serially after a batch
//! - Counters keep incrementing while Failed (reporting only)
//! - Response times are kept in a bounded FIFO window

use std::collections::VecDeque;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};

use crate::health::checker::HealthCheckResult;

/// Default capacity of the rolling response time window.
pub const DEFAULT_RESPONSE_WINDOW: usize = 20;
/// Default consecutive failures before a server is marked Failed.
pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 3;

/// Server status within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Active,
    Failed,
    Maintenance,
}

/// Status change caused by applying a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Failed,
    Recovered,
}

/// Knobs the tracker needs when applying a result.
#[derive(Debug, Clone, Copy)]
pub struct TrackerPolicy {
    pub failover_threshold: u32,
    /// When false, failures are counted but never move a server to Failed.
    pub failover_enabled: bool,
    pub response_window: usize,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            failover_threshold: DEFAULT_FAILOVER_THRESHOLD,
            failover_enabled: true,
            response_window: DEFAULT_RESPONSE_WINDOW,
        }
    }
}

/// Runtime state of one server inside one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRuntimeState {
    pub status: ServerStatus,
    pub consecutive_failures: u32,
    pub last_check: Option<SystemTime>,
    pub last_success: Option<SystemTime>,
    /// Recent response times in milliseconds, oldest first.
    pub recent_response_ms: VecDeque<f64>,
}

impl Default for ServerRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerRuntimeState {
    /// A freshly added server starts Active with no history.
    pub fn new() -> Self {
        Self {
            status: ServerStatus::Active,
            consecutive_failures: 0,
            last_check: None,
            last_success: None,
            recent_response_ms: VecDeque::with_capacity(DEFAULT_RESPONSE_WINDOW),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ServerStatus::Active
    }

    /// Apply one probe result and report any status transition.
    pub fn apply(&mut self, result: &HealthCheckResult, policy: &TrackerPolicy) -> Option<Transition> {
        let now = SystemTime::now();
        self.last_check = Some(now);

        if self.status == ServerStatus::Maintenance {
            return None;
        }

        if result.success {
            self.consecutive_failures = 0;
            self.last_success = Some(now);
            self.record_response(result.response_time_ms(), policy.response_window);

            if self.status == ServerStatus::Failed {
                self.status = ServerStatus::Active;
                return Some(Transition::Recovered);
            }
            return None;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.enforce(policy)
    }

    /// Re-check an Active server against a changed policy, without a new probe.
    pub fn enforce(&mut self, policy: &TrackerPolicy) -> Option<Transition> {
        if self.status == ServerStatus::Active
            && policy.failover_enabled
            && self.consecutive_failures >= policy.failover_threshold
        {
            self.status = ServerStatus::Failed;
            return Some(Transition::Failed);
        }
        None
    }

    /// Enter or leave maintenance. Leaving resets the server to a clean Active state.
    pub fn set_maintenance(&mut self, on: bool) {
        if on {
            self.status = ServerStatus::Maintenance;
        } else if self.status == ServerStatus::Maintenance {
            self.status = ServerStatus::Active;
            self.consecutive_failures = 0;
        }
    }

    /// Mean of the newest `samples` response times, `None` when there are none.
    pub fn mean_recent_response(&self, samples: usize) -> Option<f64> {
        let take = samples.min(self.recent_response_ms.len());
        if take == 0 {
            return None;
        }
        let sum: f64 = self.recent_response_ms.iter().rev().take(take).sum();
        Some(sum / take as f64)
    }

    fn record_response(&mut self, ms: f64, capacity: usize) {
        let capacity = capacity.max(1);
        self.recent_response_ms.push_back(ms);
        while self.recent_response_ms.len() > capacity {
            self.recent_response_ms.pop_front();
        }
    }
}
