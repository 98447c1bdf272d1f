//! Experiment protocols, analyzed results, and dedup signatures.

use crate::{
    canonicalize_text, compute_content_hash, ContentHash, ExperimentId, HypothesisId, ResultId,
    Timestamp,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// An experiment protocol designed for a specific hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentProtocol {
    /// Unique identifier for this protocol
    pub experiment_id: ExperimentId,
    /// Hypothesis this protocol tests
    pub hypothesis_id: HypothesisId,
    /// Short protocol name
    pub name: String,
    /// Method description
    pub method: String,
    /// Canonical parameters. BTreeMap keeps iteration order deterministic
    /// so signatures are stable.
    pub parameters: BTreeMap<String, String>,
    /// Design strategy tag used by the director's effectiveness table
    pub strategy: String,
    /// Planned sample size
    pub sample_size: u64,
    /// When this protocol was designed
    pub created_at: Timestamp,
}

impl ExperimentProtocol {
    /// Create a new protocol for a hypothesis.
    pub fn new(
        hypothesis_id: HypothesisId,
        name: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: Uuid::now_v7(),
            hypothesis_id,
            name: name.into(),
            method: method.into(),
            parameters: BTreeMap::new(),
            strategy: "exploratory".to_string(),
            sample_size: 0,
            created_at: Utc::now(),
        }
    }

    /// Add a canonical parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the design strategy tag.
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Set the planned sample size.
    pub fn with_sample_size(mut self, sample_size: u64) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Hash of the canonical parameter map.
    pub fn parameters_hash(&self) -> ContentHash {
        let mut canonical = String::new();
        for (key, value) in &self.parameters {
            canonical.push_str(key);
            canonical.push('=');
            canonical.push_str(value);
            canonical.push(';');
        }
        compute_content_hash(canonical.as_bytes())
    }
}

/// An analyzed experiment result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Unique identifier for this result
    pub result_id: ResultId,
    /// Protocol that produced this result
    pub experiment_id: ExperimentId,
    /// Hypothesis the experiment tested
    pub hypothesis_id: HypothesisId,
    /// Whether execution itself succeeded
    pub execution_ok: bool,
    /// P-value of the primary test
    pub p_value: f64,
    /// Effect size of the primary test
    pub effect_size: f64,
    /// Actual sample size
    pub sample_size: u64,
    /// Whether the result supports the hypothesis
    pub supports: bool,
    /// Novelty measurement in [0, 1] relative to prior results
    pub novelty: f64,
    /// Analyst summary
    pub summary: String,
    /// Raw analysis payload
    pub payload: serde_json::Value,
    /// When the analysis completed
    pub completed_at: Timestamp,
}

impl ExperimentResult {
    /// Create a result for a protocol.
    pub fn new(experiment_id: ExperimentId, hypothesis_id: HypothesisId) -> Self {
        Self {
            result_id: Uuid::now_v7(),
            experiment_id,
            hypothesis_id,
            execution_ok: true,
            p_value: 1.0,
            effect_size: 0.0,
            sample_size: 0,
            supports: false,
            novelty: 0.0,
            summary: String::new(),
            payload: serde_json::Value::Null,
            completed_at: Utc::now(),
        }
    }

    /// Set the primary statistics.
    pub fn with_statistics(mut self, p_value: f64, effect_size: f64, sample_size: u64) -> Self {
        self.p_value = p_value;
        self.effect_size = effect_size;
        self.sample_size = sample_size;
        self
    }

    /// Set the support flag.
    pub fn with_support(mut self, supports: bool) -> Self {
        self.supports = supports;
        self
    }

    /// Set the novelty measurement.
    pub fn with_novelty(mut self, novelty: f64) -> Self {
        self.novelty = novelty.clamp(0.0, 1.0);
        self
    }

    /// Mark execution as failed.
    pub fn with_execution_error(mut self, summary: impl Into<String>) -> Self {
        self.execution_ok = false;
        self.summary = summary.into();
        self
    }

    /// Whether the result is statistically significant at the given alpha.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.execution_ok && self.p_value < alpha
    }
}

/// Raw outcome of an executed experiment, before analysis.
///
/// Execution workers emit these; the analyzer worker turns each one into
/// an [`ExperimentResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    /// Protocol that was executed
    pub experiment_id: ExperimentId,
    /// Hypothesis the experiment tested
    pub hypothesis_id: HypothesisId,
    /// Whether execution succeeded
    pub execution_ok: bool,
    /// Raw measurement payload
    pub payload: serde_json::Value,
    /// When execution finished
    pub collected_at: Timestamp,
}

impl RawOutcome {
    /// Create a successful raw outcome.
    pub fn new(experiment_id: ExperimentId, hypothesis_id: HypothesisId) -> Self {
        Self {
            experiment_id,
            hypothesis_id,
            execution_ok: true,
            payload: serde_json::Value::Null,
            collected_at: Utc::now(),
        }
    }

    /// Attach the measurement payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Mark execution as failed.
    pub fn failed(mut self) -> Self {
        self.execution_ok = false;
        self
    }
}

/// Deterministic hash identifying a specific hypothesis+protocol pairing.
///
/// Combines a hash of the canonical hypothesis statement and a hash of the
/// protocol's canonical parameters. Two equal signatures mean the same
/// pair was already tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentSignature {
    /// Hash of the canonical hypothesis statement
    pub hypothesis_hash: ContentHash,
    /// Hash of the canonical protocol parameters
    pub protocol_hash: ContentHash,
}

impl ExperimentSignature {
    /// Compute the signature for a statement and protocol.
    pub fn compute(statement: &str, protocol: &ExperimentProtocol) -> Self {
        Self {
            hypothesis_hash: compute_content_hash(canonicalize_text(statement).as_bytes()),
            protocol_hash: protocol.parameters_hash(),
        }
    }

    /// Same hypothesis, different protocol: a near-duplicate candidate.
    pub fn same_hypothesis(&self, other: &ExperimentSignature) -> bool {
        self.hypothesis_hash == other.hypothesis_hash
    }
}

impl fmt::Display for ExperimentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            hex::encode(&self.hypothesis_hash[..8]),
            hex::encode(&self.protocol_hash[..8])
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
