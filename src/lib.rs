//! NTP Server Pool Manager Library

// Core subsystems
pub mod config;
pub mod pool;
pub mod probe;
pub mod store;

// Health and selection
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::NtpPoolConfig;
pub use lifecycle::Shutdown;
pub use pool::{PoolError, PoolManager};
