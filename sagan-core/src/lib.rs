//! SAGAN Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no orchestration logic.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod config;
pub mod enums;
pub mod error;
pub mod experiment;
pub mod hypothesis;
pub mod memory;
pub mod plan;

pub use config::{
    ConvergenceConfig, MemoryConfig, OracleRetryConfig, RefinerConfig, SaganConfig, WorkerLimits,
};
pub use enums::{
    DecisionSource, FailureCategory, HypothesisStatus, HypothesisStatusParseError, MemoryCategory,
    RefinementAction, WorkerKind, WorkflowState, WorkflowStateParseError,
};
pub use error::{
    ConfigError, MemoryError, OracleError, RefinerError, SaganError, SaganResult, WorkerError,
    WorkflowError,
};
pub use experiment::{ExperimentProtocol, ExperimentResult, ExperimentSignature, RawOutcome};
pub use hypothesis::{EvolutionEntry, Hypothesis};
pub use memory::MemoryEntry;
pub use plan::ResearchPlan;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Identifier of a hypothesis.
pub type HypothesisId = Uuid;

/// Identifier of an experiment protocol.
pub type ExperimentId = Uuid;

/// Identifier of an experiment result.
pub type ResultId = Uuid;

/// Identifier of a research plan.
pub type PlanId = Uuid;

/// Identifier of a memory entry.
pub type MemoryId = Uuid;

/// Correlation identifier for in-flight worker requests.
pub type CorrelationId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for deduplication and integrity verification.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Canonicalize free text before hashing: trim, lowercase, collapse
/// internal whitespace runs to a single space.
pub fn canonicalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// TESTS
// =============================================================================
