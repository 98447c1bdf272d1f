//! Memory entry type shared between the memory store and its callers.

use crate::enums::MemoryCategory;
use crate::experiment::ExperimentSignature;
use crate::{MemoryId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One record in the memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier for this entry
    pub memory_id: MemoryId,
    /// Entry category; drives default importance and pruning exemption
    pub category: MemoryCategory,
    /// Free-text content
    pub content: String,
    /// Search tags
    pub tags: Vec<String>,
    /// Importance weight; category default unless overridden
    pub importance: f64,
    /// Signature of the experiment this entry records, if experiment-shaped
    pub signature: Option<ExperimentSignature>,
    /// When this entry was created
    pub created_at: Timestamp,
    /// When this entry was last returned by a query
    pub last_accessed: Timestamp,
    /// How many times a query has returned this entry
    pub access_count: u64,
}

impl MemoryEntry {
    /// Create an entry with the category's default importance.
    pub fn new(category: MemoryCategory, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            memory_id: Uuid::now_v7(),
            category,
            content: content.into(),
            tags: Vec::new(),
            importance: category.default_importance(),
            signature: None,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Add search tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Override the category-default importance.
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Attach an experiment signature, making this entry dedup-eligible.
    pub fn with_signature(mut self, signature: ExperimentSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Record a query hit.
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
    }

    /// Age of the entry in whole hours.
    pub fn age_hours(&self, now: Timestamp) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 3600.0
    }
}

// =============================================================================
// TESTS
// =============================================================================
