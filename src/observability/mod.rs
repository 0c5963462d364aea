//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)
//! - The exporter is optional; disabling it leaves recording as a no-op

pub mod logging;
pub mod metrics;

use std::net::SocketAddr;

use crate::config::ObservabilityConfig;

/// Initialize logging and, when enabled, the metrics exporter.
pub fn init(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init_logging(config)?;

    if config.metrics_enabled {
        let addr: SocketAddr = config.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    tracing::info!(
        level = %config.log_level,
        json = config.json_logs,
        metrics = config.metrics_enabled,
        "Observability initialized"
    );
    Ok(())
}
