//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduled checks (monitor.rs):
//!     Periodic timer per pool
//!     → PoolManager::check_health
//!     → PoolManager::attempt_recovery while failed servers exist
//!
//! Batch probing (checker.rs):
//!     Pool members
//!     → bounded concurrent TimeProbe calls
//!     → Vec<HealthCheckResult>
//!
//! State machine (state.rs):
//!     Active ←→ Failed, Maintenance set by operators
//!     Consecutive failure threshold prevents flapping
//! ```
//!
//! # Design Decisions
//! - Probing never touches shared state; results are applied afterwards
//! - State transitions require consecutive failures; one success recovers
//! - Health state is per server per pool

pub mod checker;
pub mod monitor;
pub mod state;

pub use checker::{HealthCheckResult, HealthChecker};
pub use monitor::PoolMonitor;
pub use state::{ServerRuntimeState, ServerStatus, Transition};
