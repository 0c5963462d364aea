//! Least connections load balancing strategy.
//!
//! Time servers hold no long-lived connections, so the number of checks
//! recorded for a server in the trailing window stands in for load.

use crate::load_balancer::{min_by_score, LoadBalancer, Selection};
use crate::pool::types::ServerId;

/// Least connections selector.
/// Selects the server with the fewest recent checks; ties go to the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastConnections;

impl LoadBalancer for LeastConnections {
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
        min_by_score(selection.candidates, |c| c.recent_checks as f64)
    }
}
