//! Weighted random load balancing strategy.

use rand::distributions::{Distribution, WeightedIndex};

use crate::load_balancer::{LoadBalancer, Selection};
use crate::pool::types::ServerId;

/// Samples active servers proportionally to their weight.
/// Servers with a weight of zero (or an invalid weight) are never chosen.
#[derive(Debug, Default, Clone, Copy)]
pub struct Weighted;

impl LoadBalancer for Weighted {
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
        let eligible: Vec<_> = selection
            .candidates
            .iter()
            .filter(|c| c.weight.is_finite() && c.weight > 0.0)
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let dist = WeightedIndex::new(eligible.iter().map(|c| c.weight)).ok()?;
        let index = dist.sample(&mut rand::thread_rng());
        Some(eligible[index].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{candidates, states};

    #[test]
    fn test_zero_weight_never_selected() {
        let states = states(3);
        let mut candidates = candidates(&states);
        candidates[0].weight = 0.0;
        candidates[2].weight = 0.0;
        let mut cursor = 0;
        for _ in 0..200 {
            let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
            assert_eq!(Weighted.next_server(&mut selection), Some(ServerId(2)));
        }
    }

    #[test]
    fn test_all_zero_weights_select_nothing() {
        let states = states(2);
        let mut candidates = candidates(&states);
        for c in candidates.iter_mut() {
            c.weight = 0.0;
        }
        let mut cursor = 0;
        let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
        assert_eq!(Weighted.next_server(&mut selection), None);
    }

    #[test]
    fn test_distribution_follows_weights() {
        let states = states(2);
        let mut candidates = candidates(&states);
        candidates[0].weight = 9.0;
        candidates[1].weight = 1.0;
        let mut cursor = 0;
        let mut first = 0;
        for _ in 0..2000 {
            let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
            if Weighted.next_server(&mut selection) == Some(ServerId(1)) {
                first += 1;
            }
        }
        // Expected 1800; a wide band keeps this stable
        assert!(first > 1500 && first < 1950, "server 1 chosen {} times", first);
    }
}
