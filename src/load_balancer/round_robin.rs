//! Round-robin load balancing strategy.

use crate::load_balancer::{LoadBalancer, Selection};
use crate::pool::types::ServerId;

/// Round-robin selector.
/// Reads and advances the pool's cursor to rotate through active servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl LoadBalancer for RoundRobin {
    fn next_server(&self, selection: &mut Selection<'_, '_>) -> Option<ServerId> {
        let len = selection.candidates.len();
        if len == 0 {
            return None;
        }

        let index = *selection.cursor % len;
        *selection.cursor = (index + 1) % len;
        Some(selection.candidates[index].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{candidates, states};

    #[test]
    fn test_round_robin() {
        let states = states(3);
        let candidates = candidates(&states);
        let mut cursor = 0;
        let mut picks = Vec::new();
        for _ in 0..5 {
            let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
            picks.push(RoundRobin.next_server(&mut selection).unwrap().0);
        }
        assert_eq!(picks, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_cursor_wraps_when_active_set_shrinks() {
        let states = states(2);
        let candidates = candidates(&states);
        // Cursor left over from a larger active set
        let mut cursor = 7;
        let mut selection = Selection { candidates: &candidates, cursor: &mut cursor, response_samples: 10 };
        assert_eq!(RoundRobin.next_server(&mut selection), Some(ServerId(2)));
        assert_eq!(cursor, 0);
    }
}
