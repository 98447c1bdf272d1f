//! Run configuration loading for the SAGAN director.
//!
//! All fields are required unless explicitly marked optional.

use sagan_core::{SaganConfig, SaganResult};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Top-level run configuration, loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// The research question driving the run
    pub question: String,
    /// Hard iteration limit
    pub iteration_limit: u32,
    /// Component settings; defaults apply when the section is omitted
    #[serde(default)]
    pub sagan: SaganConfig,
}

/// Errors loading a run configuration file.
#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] sagan_core::SaganError),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl RunConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, RunConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), RunConfigError> {
        if self.question.trim().is_empty() {
            return Err(RunConfigError::InvalidValue {
                field: "question",
                reason: "must not be empty".to_string(),
            });
        }
        if self.iteration_limit == 0 {
            return Err(RunConfigError::InvalidValue {
                field: "iteration_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        self.sagan.validate()?;
        Ok(())
    }
}

/// Validate a component configuration directly.
pub fn validate_sagan_config(config: &SaganConfig) -> SaganResult<()> {
    config.validate()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = RunConfig::from_toml(
            r#"
            question = "does caffeine improve recall?"
            iteration_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.iteration_limit, 5);
        assert_eq!(config.sagan.memory.capacity, 1000);
        assert_eq!(config.sagan.refiner.consecutive_failure_limit, 3);
    }

    #[test]
    fn test_section_overrides_apply() {
        let config = RunConfig::from_toml(
            r#"
            question = "q"
            iteration_limit = 2

            [sagan.memory]
            capacity = 50
            importance_floor = 0.2
            max_age_hours = 24.0
            half_life_hours = 12.0
            access_boost = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.sagan.memory.capacity, 50);
    }

    #[test]
    fn test_empty_question_rejected() {
        let err = RunConfig::from_toml(
            r#"
            question = "  "
            iteration_limit = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RunConfigError::InvalidValue { field: "question", .. }));
    }

    #[test]
    fn test_zero_iteration_limit_rejected() {
        let err = RunConfig::from_toml(
            r#"
            question = "q"
            iteration_limit = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunConfigError::InvalidValue {
                field: "iteration_limit",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = RunConfig::from_toml(
            r#"
            question = "q"
            iteration_limit = 5
            surprise = true
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RunConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_component_config_rejected() {
        let err = RunConfig::from_toml(
            r#"
            question = "q"
            iteration_limit = 5

            [sagan.convergence]
            novelty_floor = 3.0
            novelty_window = 5
            cost_budget_ratio = 5.0
            alpha = 0.05
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RunConfigError::Invalid(_)));
    }
}
