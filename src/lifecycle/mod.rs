//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Register servers → Create pools → Start monitors
//!
//! Reload (startup.rs):
//!     Watcher delivers config → Swap manager settings → Retune existing pools
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Monitors drop in-flight batches → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then pools, then background tasks
//! - Shutdown has timeout: forced exit after deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
