//! Typed request/response messages exchanged with worker agents.
//!
//! Each worker kind has its own request and response payload; every
//! message carries a correlation id so in-flight work can be tracked.
//! The director never assumes ordering across different worker kinds.

use chrono::Utc;
use sagan_core::{
    CorrelationId, ExperimentProtocol, ExperimentResult, Hypothesis, RawOutcome, Timestamp,
    WorkerKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// REQUESTS
// ============================================================================

/// Request payload, one variant per worker kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    /// Propose new hypotheses for the research question.
    GenerateHypotheses {
        question: String,
        /// Existing statements, so the worker avoids repeats
        existing: Vec<String>,
        /// Known dead ends the worker must steer clear of
        dead_ends: Vec<String>,
        /// How many proposals to aim for
        count: usize,
    },
    /// Turn one hypothesis into an experiment protocol.
    DesignExperiment {
        hypothesis: Hypothesis,
        /// Design strategy suggestion from the effectiveness table
        strategy_hint: Option<String>,
        /// Failure patterns worth designing around
        known_failures: Vec<String>,
    },
    /// Execute one experiment protocol.
    ExecuteExperiment { protocol: ExperimentProtocol },
    /// Analyze one raw outcome into a result.
    AnalyzeOutcome {
        outcome: RawOutcome,
        /// Significance level the analysis should use
        alpha: f64,
    },
}

impl RequestPayload {
    /// The worker kind this payload targets.
    pub fn kind(&self) -> WorkerKind {
        match self {
            RequestPayload::GenerateHypotheses { .. } => WorkerKind::HypothesisGenerator,
            RequestPayload::DesignExperiment { .. } => WorkerKind::ExperimentDesigner,
            RequestPayload::ExecuteExperiment { .. } => WorkerKind::ExperimentExecutor,
            RequestPayload::AnalyzeOutcome { .. } => WorkerKind::ResultAnalyzer,
        }
    }

    /// One-line summary for the pending-request registry.
    pub fn summary(&self) -> String {
        match self {
            RequestPayload::GenerateHypotheses { count, .. } => {
                format!("generate {count} hypotheses")
            }
            RequestPayload::DesignExperiment { hypothesis, .. } => {
                format!("design experiment for {}", hypothesis.hypothesis_id)
            }
            RequestPayload::ExecuteExperiment { protocol } => {
                format!("execute {}", protocol.experiment_id)
            }
            RequestPayload::AnalyzeOutcome { outcome, .. } => {
                format!("analyze outcome of {}", outcome.experiment_id)
            }
        }
    }
}

/// A request to a worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation id tying the eventual response back to this request
    pub correlation_id: CorrelationId,
    /// Worker kind the request targets
    pub kind: WorkerKind,
    /// The work to do
    pub payload: RequestPayload,
    /// When the request was issued
    pub issued_at: Timestamp,
}

impl WorkerRequest {
    /// Wrap a payload with a fresh correlation id.
    pub fn new(payload: RequestPayload) -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            kind: payload.kind(),
            payload,
            issued_at: Utc::now(),
        }
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Response payload, one variant per worker kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Proposed hypotheses
    Hypotheses(Vec<Hypothesis>),
    /// A designed protocol
    Design(ExperimentProtocol),
    /// A raw execution outcome
    Execution(RawOutcome),
    /// An analyzed result
    Analysis(ExperimentResult),
}

/// Success-or-failure wrapper for a worker response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseOutcome {
    /// The worker completed the request
    Success(ResponsePayload),
    /// The worker failed (a timeout is reported the same way)
    Failure { reason: String },
}

/// A response from a worker agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Correlation id of the originating request
    pub correlation_id: CorrelationId,
    /// Worker kind that produced this response
    pub kind: WorkerKind,
    /// The outcome
    pub outcome: ResponseOutcome,
}

impl WorkerResponse {
    /// Build a success response for a request.
    pub fn success(request: &WorkerRequest, payload: ResponsePayload) -> Self {
        Self {
            correlation_id: request.correlation_id,
            kind: request.kind,
            outcome: ResponseOutcome::Success(payload),
        }
    }

    /// Build a failure response for a request.
    pub fn failure(request: &WorkerRequest, reason: impl Into<String>) -> Self {
        Self {
            correlation_id: request.correlation_id,
            kind: request.kind,
            outcome: ResponseOutcome::Failure {
                reason: reason.into(),
            },
        }
    }

    /// Whether the worker reported success.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Success(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sagan_core::new_entity_id;

    #[test]
    fn test_payload_kind_mapping() {
        let generate = RequestPayload::GenerateHypotheses {
            question: "q".to_string(),
            existing: vec![],
            dead_ends: vec![],
            count: 3,
        };
        assert_eq!(generate.kind(), WorkerKind::HypothesisGenerator);

        let analyze = RequestPayload::AnalyzeOutcome {
            outcome: RawOutcome::new(new_entity_id(), new_entity_id()),
            alpha: 0.05,
        };
        assert_eq!(analyze.kind(), WorkerKind::ResultAnalyzer);
    }

    #[test]
    fn test_request_gets_fresh_correlation_ids() {
        let payload = RequestPayload::GenerateHypotheses {
            question: "q".to_string(),
            existing: vec![],
            dead_ends: vec![],
            count: 1,
        };
        let a = WorkerRequest::new(payload.clone());
        let b = WorkerRequest::new(payload);
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_response_echoes_correlation_id() {
        let request = WorkerRequest::new(RequestPayload::GenerateHypotheses {
            question: "q".to_string(),
            existing: vec![],
            dead_ends: vec![],
            count: 1,
        });
        let response = WorkerResponse::failure(&request, "worker offline");
        assert_eq!(response.correlation_id, request.correlation_id);
        assert_eq!(response.kind, request.kind);
        assert!(!response.is_success());
    }
}
