//! Server pools.
//!
//! # Responsibilities
//! - Group registered NTP servers into named pools
//! - Track which members are active, failed or in maintenance
//! - Serve load-balanced selections and health reports
//!
//! # Data Flow
//! ```text
//! PoolManager (manager.rs)
//!     → Pool (runtime.rs): config + member state behind one mutex
//!     → HealthChecker / ServerRuntimeState (health/)
//!     → load_balancer::select_server
//!     → EventBus (events.rs) on failover and recovery
//! ```

pub mod events;
pub mod manager;
pub mod report;
pub mod runtime;
pub mod types;

pub use events::{EventBus, PoolEvent};
pub use manager::{ManagerSettings, PoolManager, PoolUpdate};
pub use report::{PoolHealthReport, PoolStatistics, PoolStatus, RecoveryOutcome, RecoveryReport};
pub use runtime::{Pool, PoolConfig, PoolRuntimeState, PoolSummary};
pub use types::{PoolError, PoolId, PoolSpec, ServerDescriptor, ServerId, DEFAULT_NTP_PORT};
