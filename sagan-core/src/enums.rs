//! Enum types for SAGAN entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Phase of a research run.
///
/// `Converged` and `Error` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Run is being set up, no work issued yet
    Initializing,
    /// Hypothesis-generation workers are being driven
    GeneratingHypotheses,
    /// Experiment-design workers are being driven
    DesigningExperiments,
    /// Execution workers are being driven
    Executing,
    /// Analysis workers are being driven
    Analyzing,
    /// The refiner is deciding hypothesis fates
    Refining,
    /// Run finished by a convergence decision (terminal)
    Converged,
    /// Run is suspended by an external stop signal
    Paused,
    /// Run aborted after repeated worker failures or state-machine misuse (terminal)
    Error,
}

impl WorkflowState {
    /// Convert to canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Initializing => "Initializing",
            WorkflowState::GeneratingHypotheses => "GeneratingHypotheses",
            WorkflowState::DesigningExperiments => "DesigningExperiments",
            WorkflowState::Executing => "Executing",
            WorkflowState::Analyzing => "Analyzing",
            WorkflowState::Refining => "Refining",
            WorkflowState::Converged => "Converged",
            WorkflowState::Paused => "Paused",
            WorkflowState::Error => "Error",
        }
    }

    /// Parse from canonical string representation.
    pub fn parse_str(s: &str) -> Result<Self, WorkflowStateParseError> {
        match s.to_lowercase().as_str() {
            "initializing" => Ok(WorkflowState::Initializing),
            "generatinghypotheses" | "generating_hypotheses" => {
                Ok(WorkflowState::GeneratingHypotheses)
            }
            "designingexperiments" | "designing_experiments" => {
                Ok(WorkflowState::DesigningExperiments)
            }
            "executing" => Ok(WorkflowState::Executing),
            "analyzing" => Ok(WorkflowState::Analyzing),
            "refining" => Ok(WorkflowState::Refining),
            "converged" => Ok(WorkflowState::Converged),
            "paused" => Ok(WorkflowState::Paused),
            "error" => Ok(WorkflowState::Error),
            _ => Err(WorkflowStateParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Converged | WorkflowState::Error)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = WorkflowStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

/// Error when parsing an invalid workflow state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStateParseError(pub String);

impl fmt::Display for WorkflowStateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid workflow state: {}", self.0)
    }
}

impl std::error::Error for WorkflowStateParseError {}

/// Status of a hypothesis in its evaluation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HypothesisStatus {
    /// No experiment has run against this hypothesis yet
    #[default]
    Untested,
    /// At least one experiment is in flight
    Testing,
    /// Accumulated evidence supports the hypothesis
    Supported,
    /// Accumulated evidence refutes the hypothesis
    Refuted,
    /// Removed from the active pool; never re-activated
    Retired,
}

impl HypothesisStatus {
    /// Convert to canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            HypothesisStatus::Untested => "Untested",
            HypothesisStatus::Testing => "Testing",
            HypothesisStatus::Supported => "Supported",
            HypothesisStatus::Refuted => "Refuted",
            HypothesisStatus::Retired => "Retired",
        }
    }

    /// Parse from canonical string representation.
    pub fn parse_str(s: &str) -> Result<Self, HypothesisStatusParseError> {
        match s.to_lowercase().as_str() {
            "untested" => Ok(HypothesisStatus::Untested),
            "testing" => Ok(HypothesisStatus::Testing),
            "supported" => Ok(HypothesisStatus::Supported),
            "refuted" => Ok(HypothesisStatus::Refuted),
            "retired" => Ok(HypothesisStatus::Retired),
            _ => Err(HypothesisStatusParseError(s.to_string())),
        }
    }

    /// Check if the hypothesis is still part of the active pool.
    pub fn is_active(&self) -> bool {
        !matches!(self, HypothesisStatus::Retired)
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HypothesisStatus {
    type Err = HypothesisStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

/// Error when parsing an invalid hypothesis status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HypothesisStatusParseError(pub String);

impl fmt::Display for HypothesisStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid hypothesis status: {}", self.0)
    }
}

impl std::error::Error for HypothesisStatusParseError {}

/// Category of a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryCategory {
    /// A protocol/approach that produced a significant, supported result
    SuccessPattern,
    /// A protocol/approach that failed, with its failure mode
    FailurePattern,
    /// An explored path that should never be retried; pruning-exempt
    DeadEnd,
    /// Extracted knowledge worth surfacing in future prompts
    Insight,
    /// Anything else worth keeping
    General,
}

impl MemoryCategory {
    /// Default importance weight for entries of this category.
    /// Dead ends carry the highest weight so they are never pruned
    /// and failed paths are never repeated.
    pub fn default_importance(&self) -> f64 {
        match self {
            MemoryCategory::DeadEnd => 1.0,
            MemoryCategory::FailurePattern => 0.8,
            MemoryCategory::SuccessPattern => 0.7,
            MemoryCategory::Insight => 0.6,
            MemoryCategory::General => 0.4,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryCategory::SuccessPattern => "success-pattern",
            MemoryCategory::FailurePattern => "failure-pattern",
            MemoryCategory::DeadEnd => "dead-end",
            MemoryCategory::Insight => "insight",
            MemoryCategory::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// Rule-based classification of a failed or unconvincing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    /// The worker reported an execution error
    ExecutionError,
    /// Large effect but non-significant p-value: sample too small
    Underpowered,
    /// Significant p-value but negligible effect size
    StatisticalNoise,
    /// Support rejected despite a large sample: the idea itself is wrong
    ConceptualFlaw,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::ExecutionError => "execution-error",
            FailureCategory::Underpowered => "underpowered",
            FailureCategory::StatisticalNoise => "statistical-noise",
            FailureCategory::ConceptualFlaw => "conceptual-flaw",
        };
        write!(f, "{}", s)
    }
}

/// Kind of worker agent the director can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    /// Proposes new hypotheses for the research question
    HypothesisGenerator,
    /// Turns a hypothesis into an experiment protocol
    ExperimentDesigner,
    /// Runs an experiment protocol and reports raw outcomes
    ExperimentExecutor,
    /// Turns a raw outcome into an analyzed result
    ResultAnalyzer,
}

impl WorkerKind {
    /// Convert to canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::HypothesisGenerator => "HypothesisGenerator",
            WorkerKind::ExperimentDesigner => "ExperimentDesigner",
            WorkerKind::ExperimentExecutor => "ExperimentExecutor",
            WorkerKind::ResultAnalyzer => "ResultAnalyzer",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action recorded in a hypothesis's evolution history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefinementAction {
    /// Hypothesis was created from scratch
    Created,
    /// Hypothesis was refined into a higher-generation child
    Refined,
    /// A sibling variant was spawned to explore a related angle
    Spawned,
    /// Hypothesis was merged with others into a combined child
    Merged,
    /// Hypothesis was retired
    Retired,
    /// Hypothesis was flagged for directed re-evaluation
    FlaggedForReview,
}

impl fmt::Display for RefinementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefinementAction::Created => "created",
            RefinementAction::Refined => "refined",
            RefinementAction::Spawned => "spawned",
            RefinementAction::Merged => "merged",
            RefinementAction::Retired => "retired",
            RefinementAction::FlaggedForReview => "flagged-for-review",
        };
        write!(f, "{}", s)
    }
}

/// Which tier of the refiner cascade produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionSource {
    /// The consecutive-failure rule tier
    Rule,
    /// The running-confidence Bayesian tier
    Bayesian,
    /// The generation-oracle tier
    Oracle,
    /// The oracle tier's parse-failure fallback
    OracleFallback,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionSource::Rule => "rule",
            DecisionSource::Bayesian => "bayesian",
            DecisionSource::Oracle => "oracle",
            DecisionSource::OracleFallback => "oracle-fallback",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_state_roundtrip() {
        for state in [
            WorkflowState::Initializing,
            WorkflowState::GeneratingHypotheses,
            WorkflowState::DesigningExperiments,
            WorkflowState::Executing,
            WorkflowState::Analyzing,
            WorkflowState::Refining,
            WorkflowState::Converged,
            WorkflowState::Paused,
            WorkflowState::Error,
        ] {
            let parsed: WorkflowState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_workflow_state_terminal() {
        assert!(WorkflowState::Converged.is_terminal());
        assert!(WorkflowState::Error.is_terminal());
        assert!(!WorkflowState::Paused.is_terminal());
        assert!(!WorkflowState::Refining.is_terminal());
    }

    #[test]
    fn test_workflow_state_parse_rejects_unknown() {
        assert!(WorkflowState::parse_str("running").is_err());
    }

    #[test]
    fn test_hypothesis_status_active() {
        assert!(HypothesisStatus::Untested.is_active());
        assert!(HypothesisStatus::Supported.is_active());
        assert!(!HypothesisStatus::Retired.is_active());
    }

    #[test]
    fn test_hypothesis_status_roundtrip() {
        for status in [
            HypothesisStatus::Untested,
            HypothesisStatus::Testing,
            HypothesisStatus::Supported,
            HypothesisStatus::Refuted,
            HypothesisStatus::Retired,
        ] {
            let parsed: HypothesisStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_dead_end_importance_is_highest() {
        let dead_end = MemoryCategory::DeadEnd.default_importance();
        for category in [
            MemoryCategory::SuccessPattern,
            MemoryCategory::FailurePattern,
            MemoryCategory::Insight,
            MemoryCategory::General,
        ] {
            assert!(dead_end > category.default_importance());
        }
    }

    #[test]
    fn test_failure_category_display() {
        assert_eq!(FailureCategory::Underpowered.to_string(), "underpowered");
        assert_eq!(
            FailureCategory::ConceptualFlaw.to_string(),
            "conceptual-flaw"
        );
    }
}
