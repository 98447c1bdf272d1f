//! SAGAN Test Utilities
//!
//! Centralized test infrastructure for the SAGAN workspace:
//! - Fixture builders for hypotheses, results, and plans
//! - A scriptable mock generation oracle
//! - Mock worker agents for driving the director loop
//! - Proptest generators for entity types

// Re-export core types for convenience
pub use sagan_core::{
    ExperimentProtocol, ExperimentResult, Hypothesis, HypothesisStatus, MemoryCategory,
    MemoryEntry, RawOutcome, ResearchPlan, SaganConfig, WorkerKind,
};

use async_trait::async_trait;
use proptest::prelude::*;
use sagan_core::{new_entity_id, OracleError};
use sagan_director::{
    RequestPayload, ResponsePayload, WorkerAgent, WorkerRequest, WorkerResponse,
};
use sagan_oracle::{GenerationOracle, OracleRequest};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// FIXTURES
// ============================================================================

/// A first-generation hypothesis with a sensible default domain.
pub fn hypothesis(statement: &str) -> Hypothesis {
    Hypothesis::new(statement, "pharmacology")
}

/// A supporting, significant result for a hypothesis.
pub fn supporting_result(hypothesis: &Hypothesis) -> ExperimentResult {
    ExperimentResult::new(new_entity_id(), hypothesis.hypothesis_id)
        .with_statistics(0.01, 0.8, 100)
        .with_support(true)
        .with_novelty(0.9)
}

/// A non-supporting result for a hypothesis.
pub fn failing_result(hypothesis: &Hypothesis) -> ExperimentResult {
    ExperimentResult::new(new_entity_id(), hypothesis.hypothesis_id)
        .with_statistics(0.6, 0.1, 40)
        .with_novelty(0.2)
}

/// A plan pre-stocked with hypotheses.
pub fn plan_with(question: &str, iteration_limit: u32, statements: &[&str]) -> ResearchPlan {
    let mut plan = ResearchPlan::new(question, iteration_limit);
    for statement in statements {
        plan.add_hypothesis(hypothesis(statement));
    }
    plan
}

// ============================================================================
// MOCK ORACLE
// ============================================================================

/// Scriptable generation oracle.
///
/// Scripted responses are consumed in order; once exhausted (or when no
/// script was provided) every call answers with the default completion.
pub struct MockOracle {
    scripted: Mutex<Vec<String>>,
    default: String,
    calls: AtomicUsize,
}

impl MockOracle {
    /// Oracle that always returns one completion.
    pub fn always(completion: &str) -> Self {
        Self {
            scripted: Mutex::new(Vec::new()),
            default: completion.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Oracle that plays a script, then falls back to a default.
    pub fn scripted(responses: Vec<String>, default: &str) -> Self {
        Self {
            scripted: Mutex::new(responses),
            default: default.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Oracle that always chooses `continue`.
    pub fn always_continue() -> Self {
        Self::always(r#"{"decision": "continue"}"#)
    }

    /// How many completions this oracle has served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationOracle for MockOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scripted = self.scripted.lock().unwrap();
        if scripted.is_empty() {
            Ok(self.default.clone())
        } else {
            Ok(scripted.remove(0))
        }
    }
}

// ============================================================================
// MOCK WORKERS
// ============================================================================

/// Generator that serves pre-built batches, then empty batches.
pub struct QueueGenerator {
    batches: Mutex<Vec<Vec<Hypothesis>>>,
}

impl QueueGenerator {
    /// Serve these batches in order.
    pub fn new(batches: Vec<Vec<Hypothesis>>) -> Self {
        Self {
            batches: Mutex::new(batches),
        }
    }

    /// Serve one batch built from statements, then run dry.
    pub fn single_batch(statements: &[&str]) -> Self {
        Self::new(vec![statements.iter().map(|s| hypothesis(s)).collect()])
    }
}

#[async_trait]
impl WorkerAgent for QueueGenerator {
    fn kind(&self) -> WorkerKind {
        WorkerKind::HypothesisGenerator
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        let mut batches = self.batches.lock().unwrap();
        let batch = if batches.is_empty() {
            Vec::new()
        } else {
            batches.remove(0)
        };
        WorkerResponse::success(&request, ResponsePayload::Hypotheses(batch))
    }
}

/// Designer that produces a fresh, unique protocol per request.
#[derive(Default)]
pub struct CountingDesigner {
    counter: AtomicUsize,
}

impl CountingDesigner {
    /// Create a designer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerAgent for CountingDesigner {
    fn kind(&self) -> WorkerKind {
        WorkerKind::ExperimentDesigner
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        let RequestPayload::DesignExperiment {
            hypothesis,
            strategy_hint,
            ..
        } = &request.payload
        else {
            return WorkerResponse::failure(&request, "unexpected request payload");
        };
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let strategy = strategy_hint.clone().unwrap_or_else(|| "exploratory".to_string());
        let protocol = ExperimentProtocol::new(
            hypothesis.hypothesis_id,
            format!("protocol-{n}"),
            "randomized trial",
        )
        .with_parameter("trial", n.to_string())
        .with_strategy(strategy)
        .with_sample_size(100);
        WorkerResponse::success(&request, ResponsePayload::Design(protocol))
    }
}

/// Executor that emits a fixed statistical payload for every protocol.
pub struct StaticExecutor {
    /// P-value embedded in each outcome
    pub p_value: f64,
    /// Effect size embedded in each outcome
    pub effect_size: f64,
    /// Support flag embedded in each outcome
    pub supports: bool,
    /// Novelty embedded in each outcome
    pub novelty: f64,
}

impl StaticExecutor {
    /// Executor whose experiments all strongly support their hypotheses.
    pub fn supportive() -> Self {
        Self {
            p_value: 0.01,
            effect_size: 0.8,
            supports: true,
            novelty: 0.9,
        }
    }

    /// Executor whose experiments never support their hypotheses.
    pub fn refuting() -> Self {
        Self {
            p_value: 0.01,
            effect_size: 0.9,
            supports: false,
            novelty: 0.3,
        }
    }
}

#[async_trait]
impl WorkerAgent for StaticExecutor {
    fn kind(&self) -> WorkerKind {
        WorkerKind::ExperimentExecutor
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        let RequestPayload::ExecuteExperiment { protocol } = &request.payload else {
            return WorkerResponse::failure(&request, "unexpected request payload");
        };
        let outcome = RawOutcome::new(protocol.experiment_id, protocol.hypothesis_id)
            .with_payload(serde_json::json!({
                "p_value": self.p_value,
                "effect_size": self.effect_size,
                "supports": self.supports,
                "novelty": self.novelty,
                "sample_size": protocol.sample_size,
            }));
        WorkerResponse::success(&request, ResponsePayload::Execution(outcome))
    }
}

/// Analyzer that lifts the executor's JSON payload into a result.
#[derive(Default)]
pub struct PassthroughAnalyzer;

impl PassthroughAnalyzer {
    /// Create an analyzer.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerAgent for PassthroughAnalyzer {
    fn kind(&self) -> WorkerKind {
        WorkerKind::ResultAnalyzer
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        let RequestPayload::AnalyzeOutcome { outcome, .. } = &request.payload else {
            return WorkerResponse::failure(&request, "unexpected request payload");
        };
        let field = |name: &str| outcome.payload.get(name).and_then(|v| v.as_f64());
        let supports = outcome
            .payload
            .get("supports")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let sample_size = outcome
            .payload
            .get("sample_size")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let mut result = ExperimentResult::new(outcome.experiment_id, outcome.hypothesis_id)
            .with_statistics(
                field("p_value").unwrap_or(1.0),
                field("effect_size").unwrap_or(0.0),
                sample_size,
            )
            .with_support(supports)
            .with_novelty(field("novelty").unwrap_or(0.0));
        result.payload = outcome.payload.clone();
        if !outcome.execution_ok {
            result = result.with_execution_error("execution failed upstream");
        }
        WorkerResponse::success(&request, ResponsePayload::Analysis(result))
    }
}

/// Worker that fails every request, for escalation tests.
pub struct FailingWorker {
    kind: WorkerKind,
    reason: String,
}

impl FailingWorker {
    /// Create a failing worker of the given kind.
    pub fn new(kind: WorkerKind, reason: &str) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl WorkerAgent for FailingWorker {
    fn kind(&self) -> WorkerKind {
        self.kind
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        WorkerResponse::failure(&request, self.reason.clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Strategy producing arbitrary hypothesis statements.
pub fn arb_statement() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "caffeine improves delayed recall",
        "caffeine impairs delayed recall",
        "magnesium improves deep sleep",
        "creatine improves working memory",
        "exercise reduces cortisol levels",
    ])
    .prop_map(str::to_string)
}

/// Strategy producing hypotheses with random confidence.
pub fn arb_hypothesis() -> impl Strategy<Value = Hypothesis> {
    (arb_statement(), 0.0f64..=1.0).prop_map(|(statement, confidence)| {
        Hypothesis::new(statement, "pharmacology").with_confidence(confidence)
    })
}

/// Strategy producing results with random statistics.
pub fn arb_result() -> impl Strategy<Value = ExperimentResult> {
    (
        0.0f64..=1.0,
        0.0f64..=1.5,
        1u64..=1000,
        any::<bool>(),
        0.0f64..=1.0,
    )
        .prop_map(|(p, effect, n, supports, novelty)| {
            ExperimentResult::new(new_entity_id(), new_entity_id())
                .with_statistics(p, effect, n)
                .with_support(supports)
                .with_novelty(novelty)
        })
}

/// Strategy producing memory entries across all categories.
pub fn arb_memory_entry() -> impl Strategy<Value = MemoryEntry> {
    (
        prop::sample::select(vec![
            MemoryCategory::SuccessPattern,
            MemoryCategory::FailurePattern,
            MemoryCategory::DeadEnd,
            MemoryCategory::Insight,
            MemoryCategory::General,
        ]),
        arb_statement(),
    )
        .prop_map(|(category, content)| MemoryEntry::new(category, content))
}

// =============================================================================
// TESTS
// =============================================================================
