//! Configuration types

use crate::error::{ConfigError, SaganError, SaganResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hypothesis refiner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Consecutive non-supporting results that force retirement
    pub consecutive_failure_limit: u32,
    /// Confidence below which the Bayesian tier retires
    pub retire_threshold: f64,
    /// Confidence at or above which a stable hypothesis continues
    pub continue_threshold: f64,
    /// How many trailing confidence values must agree for "stable"
    pub stability_window: usize,
    /// Maximum spread across the stability window
    pub stability_spread: f64,
    /// Bayesian evidence learning rate
    pub learning_rate: f64,
    /// Significance level for support classification
    pub alpha: f64,
    /// Similarity at or above which two statements are compared for
    /// contradiction or merge
    pub similarity_threshold: f64,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_limit: 3,
            retire_threshold: 0.1,
            continue_threshold: 0.85,
            stability_window: 2,
            stability_spread: 0.05,
            learning_rate: 0.3,
            alpha: 0.05,
            similarity_threshold: 0.8,
        }
    }
}

/// Convergence detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Novelty below this value counts as "low"
    pub novelty_floor: f64,
    /// How many trailing novelty measurements the detector keeps
    pub novelty_window: usize,
    /// Estimated cost per new discovery above this ratio suggests stopping
    pub cost_budget_ratio: f64,
    /// Significance level used for the discovery rate
    pub alpha: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            novelty_floor: 0.2,
            novelty_window: 5,
            cost_budget_ratio: 5.0,
            alpha: 0.05,
        }
    }
}

/// Memory store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum number of entries before eviction
    pub capacity: usize,
    /// Entries below this importance are prune-eligible
    pub importance_floor: f64,
    /// Entries older than this are prune-eligible
    pub max_age_hours: f64,
    /// Recency decay half-life for relevance scoring
    pub half_life_hours: f64,
    /// Weight of the access-count boost in relevance scoring
    pub access_boost: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            importance_floor: 0.3,
            max_age_hours: 168.0,
            half_life_hours: 72.0,
            access_boost: 0.1,
        }
    }
}

/// Per-worker-kind concurrency limits and failure escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLimits {
    /// Maximum in-flight hypothesis-generation requests
    pub max_generation: usize,
    /// Maximum in-flight experiment-design requests
    pub max_design: usize,
    /// Maximum in-flight execution requests
    pub max_execution: usize,
    /// Maximum in-flight analysis requests
    pub max_analysis: usize,
    /// Consecutive errors from one worker kind that escalate to Error
    pub consecutive_error_limit: u32,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            max_generation: 1,
            max_design: 2,
            max_execution: 4,
            max_analysis: 4,
            consecutive_error_limit: 3,
        }
    }
}

/// Retry policy for generation-oracle calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRetryConfig {
    /// Parse retries before falling back to the default decision
    pub max_parse_retries: u32,
    /// Initial backoff between retries
    pub initial_backoff: Duration,
}

impl Default for OracleRetryConfig {
    fn default() -> Self {
        Self {
            max_parse_retries: 1,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Master configuration struct.
/// Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SaganConfig {
    /// Hypothesis refiner settings
    #[serde(default)]
    pub refiner: RefinerConfig,
    /// Convergence detector settings
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Worker concurrency and escalation settings
    #[serde(default)]
    pub workers: WorkerLimits,
    /// Oracle retry policy
    #[serde(default)]
    pub oracle_retry: OracleRetryConfig,
    /// Whether optional convergence criteria require confirmation before
    /// the run halts
    #[serde(default)]
    pub require_confirmation: bool,
}

impl SaganConfig {
    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(SaganError::Config) if invalid.
    pub fn validate(&self) -> SaganResult<()> {
        if self.refiner.consecutive_failure_limit == 0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "refiner.consecutive_failure_limit".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        for (field, value) in [
            ("refiner.retire_threshold", self.refiner.retire_threshold),
            ("refiner.continue_threshold", self.refiner.continue_threshold),
            ("refiner.learning_rate", self.refiner.learning_rate),
            ("refiner.alpha", self.refiner.alpha),
            (
                "refiner.similarity_threshold",
                self.refiner.similarity_threshold,
            ),
            ("convergence.novelty_floor", self.convergence.novelty_floor),
            ("convergence.alpha", self.convergence.alpha),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SaganError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "must be between 0.0 and 1.0".to_string(),
                }));
            }
        }
        if self.refiner.retire_threshold >= self.refiner.continue_threshold {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "refiner.retire_threshold".to_string(),
                value: self.refiner.retire_threshold.to_string(),
                reason: "must be below continue_threshold".to_string(),
            }));
        }
        if self.convergence.novelty_window == 0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "convergence.novelty_window".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        if self.convergence.cost_budget_ratio <= 0.0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "convergence.cost_budget_ratio".to_string(),
                value: self.convergence.cost_budget_ratio.to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        if self.memory.capacity == 0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "memory.capacity".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        if self.memory.half_life_hours <= 0.0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "memory.half_life_hours".to_string(),
                value: self.memory.half_life_hours.to_string(),
                reason: "must be positive".to_string(),
            }));
        }
        if self.workers.consecutive_error_limit == 0 {
            return Err(SaganError::Config(ConfigError::InvalidValue {
                field: "workers.consecutive_error_limit".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }));
        }
        for (field, value) in [
            ("workers.max_generation", self.workers.max_generation),
            ("workers.max_design", self.workers.max_design),
            ("workers.max_execution", self.workers.max_execution),
            ("workers.max_analysis", self.workers.max_analysis),
        ] {
            if value == 0 {
                return Err(SaganError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                }));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SaganConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = SaganConfig::default();
        config.memory.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SaganError::Config(_)));
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let mut config = SaganConfig::default();
        config.refiner.retire_threshold = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_alpha_rejected() {
        let mut config = SaganConfig::default();
        config.refiner.alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_error_limit_rejected() {
        let mut config = SaganConfig::default();
        config.workers.consecutive_error_limit = 0;
        assert!(config.validate().is_err());
    }
}
