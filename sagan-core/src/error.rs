//! Error types for SAGAN operations

use crate::{HypothesisId, WorkerKind, WorkflowState};
use thiserror::Error;
use uuid::Uuid;

/// Workflow state machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Workflow is in terminal state {state}, no transitions possible")]
    Terminal { state: WorkflowState },
}

/// Worker agent errors, as reported by or about a worker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("{kind} request {correlation_id} failed: {reason}")]
    RequestFailed {
        kind: WorkerKind,
        correlation_id: Uuid,
        reason: String,
    },

    #[error("{kind} request {correlation_id} timed out")]
    Timeout {
        kind: WorkerKind,
        correlation_id: Uuid,
    },

    #[error("No worker registered for kind {kind}")]
    NotRegistered { kind: WorkerKind },

    #[error("{kind} failed {count} consecutive times")]
    ConsecutiveFailures { kind: WorkerKind, count: u32 },
}

/// Generation-oracle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("No generation oracle configured")]
    NotConfigured,

    #[error("Oracle request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Oracle completion did not match expected schema {schema}: {reason}")]
    ParseFailed { schema: String, reason: String },
}

/// Memory store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory store over capacity: {count} entries, capacity {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },

    #[error("Memory import rejected: {reason}")]
    ImportFailed { reason: String },
}

/// Hypothesis refiner errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefinerError {
    #[error("Unknown hypothesis: {id}")]
    UnknownHypothesis { id: HypothesisId },

    #[error("Hypothesis {id} is retired and cannot be re-activated")]
    Retired { id: HypothesisId },

    #[error("Cannot merge fewer than two hypotheses (got {count})")]
    MergeTooFew { count: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all SAGAN errors.
#[derive(Debug, Clone, Error)]
pub enum SaganError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Refiner error: {0}")]
    Refiner(#[from] RefinerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for SAGAN operations.
pub type SaganResult<T> = Result<T, SaganError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_error_display_illegal_transition() {
        let err = WorkflowError::IllegalTransition {
            from: WorkflowState::Initializing,
            to: WorkflowState::Executing,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Illegal transition"));
        assert!(msg.contains("Initializing"));
        assert!(msg.contains("Executing"));
    }

    #[test]
    fn test_worker_error_display_consecutive_failures() {
        let err = WorkerError::ConsecutiveFailures {
            kind: WorkerKind::ExperimentExecutor,
            count: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ExperimentExecutor"));
        assert!(msg.contains("3"));
    }

    #[test]
    fn test_oracle_error_display_parse_failed() {
        let err = OracleError::ParseFailed {
            schema: "verdict".to_string(),
            reason: "missing decision field".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("verdict"));
        assert!(msg.contains("missing decision field"));
    }

    #[test]
    fn test_sagan_error_from_variants() {
        let workflow = SaganError::from(WorkflowError::Terminal {
            state: WorkflowState::Converged,
        });
        assert!(matches!(workflow, SaganError::Workflow(_)));

        let worker = SaganError::from(WorkerError::NotRegistered {
            kind: WorkerKind::ResultAnalyzer,
        });
        assert!(matches!(worker, SaganError::Worker(_)));

        let oracle = SaganError::from(OracleError::NotConfigured);
        assert!(matches!(oracle, SaganError::Oracle(_)));

        let memory = SaganError::from(MemoryError::CapacityExceeded {
            count: 1001,
            capacity: 1000,
        });
        assert!(matches!(memory, SaganError::Memory(_)));

        let refiner = SaganError::from(RefinerError::MergeTooFew { count: 1 });
        assert!(matches!(refiner, SaganError::Refiner(_)));

        let config = SaganError::from(ConfigError::MissingRequired {
            field: "question".to_string(),
        });
        assert!(matches!(config, SaganError::Config(_)));
    }
}
