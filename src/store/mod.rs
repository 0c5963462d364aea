//! Health history storage.
//!
//! # Data Flow
//! ```text
//! check_health / attempt_recovery
//!     → HealthStore::save_result (fire-and-forget)
//!
//! get_next_server (least connections)
//!     → HealthStore::recent_check_count(server, window)
//!
//! startup
//!     → HealthStore::load_pool(name) (optional pool definitions)
//! ```
//!
//! # Design Decisions
//! - Calls are synchronous and must not block on I/O; slow backends buffer internally
//! - Store failures never affect pool correctness
//! - Pool runtime state is never persisted; it is rebuilt from config and probes

pub mod memory;

use std::time::Duration;

use crate::health::checker::HealthCheckResult;
use crate::pool::types::{PoolId, PoolSpec, ServerDescriptor, ServerId};

pub use memory::MemoryStore;

/// Storage collaborator for probe history and pool definitions.
pub trait HealthStore: Send + Sync {
    /// Record a probe result. Implementations swallow their own errors.
    fn save_result(&self, pool: PoolId, result: &HealthCheckResult);

    /// Number of checks recorded for `server` within the trailing `window`.
    fn recent_check_count(&self, server: ServerId, window: Duration) -> usize;

    /// Look up a stored pool definition by name.
    fn load_pool(&self, _name: &str) -> Option<(PoolSpec, Vec<ServerDescriptor>)> {
        None
    }
}
