//! Fastest-responder load balancing strategy.

use crate::load_balancer::{min_by_score, LoadBalancer, Selection};
use crate::pool::types::ServerId;

/// Picks the server with the lowest mean of its most recent response times.
/// Servers without samples rank last; ties go to the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseTime;

impl LoadBalancer for ResponseTime {
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
        let samples = selection.response_samples;
        min_by_score(selection.candidates, |c| {
            c.state.mean_recent_response(samples).unwrap_or(f64::INFINITY)
        })
    }
}
