//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define pool metrics (probes, transitions, selections, health)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `ntp_pool_probe_total` (counter): probes by result
//! - `ntp_pool_probe_duration_seconds` (histogram): probe latency
//! - `ntp_pool_server_up` (gauge): 1=active, 0=not active, by pool and server
//! - `ntp_pool_transitions_total` (counter): failovers and recoveries
//! - `ntp_pool_selections_total` (counter): selections by pool and method
//! - `ntp_pool_health_percentage` (gauge): last health check result by pool
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library users
//!   and tests pay nothing
//! - Labels are bounded: pool names, server ids, method names

use std::net::SocketAddr;
use std::time::Duration;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::health::state::Transition;
use crate::load_balancer::LoadBalanceMethod;
use crate::pool::types::ServerId;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_probe(success: bool, elapsed: Duration) {
    let result = if success { "success" } else { "failure" };
    counter!("ntp_pool_probe_total", "result" => result).increment(1);
    histogram!("ntp_pool_probe_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_server_up(pool: &str, server: ServerId, up: bool) {
    gauge!(
        "ntp_pool_server_up",
        "pool" => pool.to_string(),
        "server" => server.to_string()
    )
    .set(if up { 1.0 } else { 0.0 });
}

pub fn record_transition(transition: Transition) {
    let kind = match transition {
        Transition::Failed => "failed",
        Transition::Recovered => "recovered",
    };
    counter!("ntp_pool_transitions_total", "kind" => kind).increment(1);
}

pub fn record_selection(pool: &str, method: LoadBalanceMethod) {
    counter!(
        "ntp_pool_selections_total",
        "pool" => pool.to_string(),
        "method" => method.as_str()
    )
    .increment(1);
}

pub fn record_health_percentage(pool: &str, percentage: f64) {
    gauge!("ntp_pool_health_percentage", "pool" => pool.to_string()).set(percentage);
}
