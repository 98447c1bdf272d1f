//! Strategy-effectiveness table.
//!
//! Tracks success/failure counts per experiment-design strategy. The
//! table only ever biases the strategy hint sent with future design
//! requests; it never bypasses validation of what a designer returns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Success/failure tally for one strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Experiments under this strategy that produced a supported,
    /// significant result
    pub successes: u64,
    /// Experiments under this strategy that did not
    pub failures: u64,
}

impl StrategyRecord {
    /// Laplace-smoothed success rate, so unseen strategies start at 0.5
    /// rather than 0 or 1.
    pub fn effectiveness(&self) -> f64 {
        (self.successes + 1) as f64 / (self.successes + self.failures + 2) as f64
    }
}

/// Per-strategy effectiveness table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    records: HashMap<String, StrategyRecord>,
}

impl StrategyStats {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome for a strategy.
    pub fn observe(&mut self, strategy: &str, success: bool) {
        let record = self.records.entry(strategy.to_string()).or_default();
        if success {
            record.successes += 1;
        } else {
            record.failures += 1;
        }
    }

    /// The record for a strategy, if any outcome was observed.
    pub fn record(&self, strategy: &str) -> Option<StrategyRecord> {
        self.records.get(strategy).copied()
    }

    /// Smoothed effectiveness for a strategy (0.5 when unobserved).
    pub fn effectiveness(&self, strategy: &str) -> f64 {
        self.records
            .get(strategy)
            .map(|r| r.effectiveness())
            .unwrap_or(0.5)
    }

    /// The most effective observed strategy, used as a design hint.
    /// Ties break lexicographically so the hint is deterministic.
    pub fn best_strategy(&self) -> Option<String> {
        self.records
            .iter()
            .max_by(|a, b| {
                a.1.effectiveness()
                    .total_cmp(&b.1.effectiveness())
                    .then_with(|| b.0.cmp(a.0))
            })
            .map(|(strategy, _)| strategy.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unobserved_strategy_is_neutral() {
        let stats = StrategyStats::new();
        assert_eq!(stats.effectiveness("factorial"), 0.5);
        assert!(stats.best_strategy().is_none());
    }

    #[test]
    fn test_observations_move_effectiveness() {
        let mut stats = StrategyStats::new();
        stats.observe("factorial", true);
        stats.observe("factorial", true);
        stats.observe("ablation", false);

        assert!(stats.effectiveness("factorial") > 0.5);
        assert!(stats.effectiveness("ablation") < 0.5);
        assert_eq!(stats.best_strategy().as_deref(), Some("factorial"));
    }

    #[test]
    fn test_best_strategy_tie_breaks_deterministically() {
        let mut stats = StrategyStats::new();
        stats.observe("ablation", true);
        stats.observe("factorial", true);
        // Identical records; lexicographically smaller name wins.
        assert_eq!(stats.best_strategy().as_deref(), Some("ablation"));
    }

    #[test]
    fn test_record_counts() {
        let mut stats = StrategyStats::new();
        stats.observe("replication", true);
        stats.observe("replication", false);
        let record = stats.record("replication").unwrap();
        assert_eq!(record.successes, 1);
        assert_eq!(record.failures, 1);
    }
}
