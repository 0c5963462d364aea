//! Uniform random load balancing strategy.

use crate::load_balancer::{LoadBalancer, Selection};
use crate::pool::types::ServerId;

/// Picks any active server with equal probability.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl LoadBalancer for Random {
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
        if selection.candidates.is_empty() {
            return None;
        }
        let index = fastrand::usize(..selection.candidates.len());
        Some(selection.candidates[index].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{candidates, states};
    use std::collections::HashSet;

    #[test]
    fn test_random_covers_all_candidates() {
        let states = states(3);
        let candidates = candidates(&states);
        let mut cursor = 0;
        let mut seen = HashSet::new();
        for _ in 0..300 {
            let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
            seen.insert(Random.next_server(&mut selection).unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(cursor, 0);
    }
}
