//! SAGAN Oracle - Generation Oracle Boundary
//!
//! Provider-agnostic trait for the generation oracle plus structured
//! completion parsing. The oracle is an opaque service that accepts a
//! structured prompt and returns a structured completion; which model sits
//! behind it is not this crate's concern. Actual oracle implementations
//! are user-supplied.
//!
//! Expected outputs are tagged sum types with exhaustive matching and an
//! explicit fallback arm: a completion that fails to parse after the
//! configured retries resolves to the safe default (`Continue`), never to
//! a crash.

use async_trait::async_trait;
use sagan_core::{DecisionSource, OracleError, OracleRetryConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Which completion schema the caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedSchema {
    /// Forced-choice hypothesis verdict
    Verdict,
    /// Merged-hypothesis statement
    Merge,
}

impl ExpectedSchema {
    /// Schema name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedSchema::Verdict => "verdict",
            ExpectedSchema::Merge => "merge",
        }
    }
}

impl fmt::Display for ExpectedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured prompt for the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// The prompt text
    pub prompt: String,
    /// The schema the completion must satisfy
    pub expected_schema: ExpectedSchema,
}

impl OracleRequest {
    /// Build a verdict request.
    pub fn verdict(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expected_schema: ExpectedSchema::Verdict,
        }
    }

    /// Build a merge request.
    pub fn merge(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            expected_schema: ExpectedSchema::Merge,
        }
    }
}

// ============================================================================
// COMPLETION TYPES
// ============================================================================

/// Forced-choice verdict completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum VerdictCompletion {
    /// Retire the hypothesis
    Retire {
        #[serde(default)]
        rationale: String,
    },
    /// Refine the hypothesis into a new statement
    Refine {
        statement: String,
        #[serde(default)]
        rationale: String,
        /// Whether the refinement supersedes (retires) the original
        #[serde(default)]
        supersede: bool,
    },
    /// Keep testing as-is
    Continue {
        #[serde(default)]
        rationale: String,
    },
}

impl VerdictCompletion {
    /// The safe default used when parsing fails.
    pub fn fallback() -> Self {
        VerdictCompletion::Continue {
            rationale: "oracle completion unusable, defaulting to continue".to_string(),
        }
    }
}

/// Merged-hypothesis completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeCompletion {
    /// The combined statement
    pub statement: String,
    /// Why the merge is sound
    #[serde(default)]
    pub rationale: String,
}

/// Parse a verdict completion from raw oracle output.
pub fn parse_verdict(completion: &str) -> Result<VerdictCompletion, OracleError> {
    serde_json::from_str(strip_fences(completion)).map_err(|e| OracleError::ParseFailed {
        schema: ExpectedSchema::Verdict.as_str().to_string(),
        reason: e.to_string(),
    })
}

/// Parse a merge completion from raw oracle output.
pub fn parse_merge(completion: &str) -> Result<MergeCompletion, OracleError> {
    serde_json::from_str(strip_fences(completion)).map_err(|e| OracleError::ParseFailed {
        schema: ExpectedSchema::Merge.as_str().to_string(),
        reason: e.to_string(),
    })
}

/// Oracles often wrap JSON in markdown fences; strip them before parsing.
fn strip_fences(completion: &str) -> &str {
    let trimmed = completion.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// ============================================================================
// ORACLE TRAIT
// ============================================================================

/// Trait for generation oracles.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct ClaudeOracle { /* ... */ }
///
/// #[async_trait]
/// impl GenerationOracle for ClaudeOracle {
///     async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
///         // Call the model API
///     }
/// }
/// ```
#[async_trait]
pub trait GenerationOracle: Send + Sync {
    /// Produce a raw completion for a structured prompt.
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Registry for the generation oracle.
/// The oracle must be explicitly registered - no auto-discovery.
#[derive(Default)]
pub struct OracleRegistry {
    oracle: Option<Arc<dyn GenerationOracle>>,
}

impl OracleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self { oracle: None }
    }

    /// Register an oracle, replacing any previous registration.
    pub fn register(&mut self, oracle: Arc<dyn GenerationOracle>) {
        self.oracle = Some(oracle);
    }

    /// Get the registered oracle.
    pub fn oracle(&self) -> Result<Arc<dyn GenerationOracle>, OracleError> {
        self.oracle.clone().ok_or(OracleError::NotConfigured)
    }

    /// Check whether an oracle is registered.
    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }
}

impl fmt::Debug for OracleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleRegistry")
            .field("oracle", &self.oracle.is_some())
            .finish()
    }
}

// ============================================================================
// ORACLE CLIENT
// ============================================================================

/// Retry-and-fallback wrapper around a [`GenerationOracle`].
#[derive(Clone)]
pub struct OracleClient {
    oracle: Arc<dyn GenerationOracle>,
    retry: OracleRetryConfig,
}

impl OracleClient {
    /// Wrap an oracle with a retry policy.
    pub fn new(oracle: Arc<dyn GenerationOracle>, retry: OracleRetryConfig) -> Self {
        Self { oracle, retry }
    }

    /// Ask for a verdict. Request failures and unparsable completions are
    /// retried up to the configured limit, then resolve to the fallback
    /// (`Continue`) with `DecisionSource::OracleFallback`.
    pub async fn verdict(&self, prompt: &str) -> (VerdictCompletion, DecisionSource) {
        let request = OracleRequest::verdict(prompt);
        let attempts = 1 + self.retry.max_parse_retries;
        for attempt in 0..attempts {
            match self.oracle.complete(&request).await {
                Ok(completion) => match parse_verdict(&completion) {
                    Ok(verdict) => return (verdict, DecisionSource::Oracle),
                    Err(e) => {
                        warn!(attempt, error = %e, "oracle verdict did not parse");
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "oracle verdict request failed");
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry.initial_backoff * (attempt + 1)).await;
            }
        }
        (VerdictCompletion::fallback(), DecisionSource::OracleFallback)
    }

    /// Ask for a merged statement. Returns `None` when the oracle cannot
    /// produce a usable completion; the caller skips the merge.
    pub async fn merge(&self, prompt: &str) -> Option<MergeCompletion> {
        let request = OracleRequest::merge(prompt);
        let attempts = 1 + self.retry.max_parse_retries;
        for attempt in 0..attempts {
            match self.oracle.complete(&request).await {
                Ok(completion) => match parse_merge(&completion) {
                    Ok(merge) => return Some(merge),
                    Err(e) => {
                        warn!(attempt, error = %e, "oracle merge did not parse");
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "oracle merge request failed");
                }
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(self.retry.initial_backoff * (attempt + 1)).await;
            }
        }
        None
    }
}

impl fmt::Debug for OracleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleClient")
            .field("retry", &self.retry)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
