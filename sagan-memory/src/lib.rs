//! SAGAN Memory - Content-Addressed Experiment Memory
//!
//! A bounded log of past experiments and extracted knowledge. Experiment
//! signatures give exact-duplicate rejection so the loop never repeats a
//! hypothesis+protocol pair; relevance scoring (importance x recency decay
//! x access boost) orders query results and picks eviction victims.
//! Dead-end entries are pruning-exempt regardless of age.

use chrono::Utc;
use sagan_core::{
    ExperimentSignature, MemoryCategory, MemoryConfig, MemoryEntry, MemoryError, MemoryId,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// RECORD OUTCOME
// ============================================================================

/// What happened when an entry was offered to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// Entry was stored
    Stored(MemoryId),
    /// Exact signature match: entry was NOT stored, the caller should
    /// skip this hypothesis+protocol pair
    Duplicate(MemoryId),
    /// Same hypothesis under a different protocol: stored, but flagged
    NearDuplicate(MemoryId),
}

impl RecordOutcome {
    /// Whether the offered entry ended up in the store.
    pub fn was_stored(&self) -> bool {
        !matches!(self, RecordOutcome::Duplicate(_))
    }
}

// ============================================================================
// QUERY FILTER
// ============================================================================

/// Filter for memory queries. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Match only this category
    pub category: Option<MemoryCategory>,
    /// Match entries carrying any of these tags
    pub tags: Vec<String>,
    /// Match only entries at or above this importance
    pub min_importance: Option<f64>,
    /// Cap the number of returned entries
    pub limit: Option<usize>,
}

impl QueryFilter {
    /// Filter by category.
    pub fn category(category: MemoryCategory) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// Add a tag requirement.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the importance floor.
    pub fn with_min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    /// Cap the result count.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if entry.importance < min {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.tags.contains(t)) {
            return false;
        }
        true
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Bounded, signature-deduplicated memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    config: MemoryConfig,
    entries: HashMap<MemoryId, MemoryEntry>,
    by_signature: HashMap<ExperimentSignature, MemoryId>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_signature: HashMap::new(),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry recorded for a signature, if any.
    pub fn entry_for_signature(&self, signature: &ExperimentSignature) -> Option<&MemoryEntry> {
        self.by_signature
            .get(signature)
            .and_then(|id| self.entries.get(id))
    }

    /// Offer an entry to the store.
    ///
    /// Experiment-shaped entries (those carrying a signature) are
    /// deduplicated: an exact signature match is rejected as
    /// `Duplicate`; a same-hypothesis/different-protocol match is stored
    /// but reported as `NearDuplicate`. Exceeding capacity triggers
    /// eviction of the least relevant non-dead-end entries.
    pub fn record(&mut self, entry: MemoryEntry) -> RecordOutcome {
        let near_duplicate = match entry.signature {
            Some(signature) => {
                if let Some(existing) = self.by_signature.get(&signature) {
                    debug!(signature = %signature, "rejecting duplicate experiment entry");
                    return RecordOutcome::Duplicate(*existing);
                }
                self.by_signature
                    .keys()
                    .any(|s| s.same_hypothesis(&signature))
            }
            None => false,
        };

        let id = entry.memory_id;
        if let Some(signature) = entry.signature {
            self.by_signature.insert(signature, id);
        }
        self.entries.insert(id, entry);

        if self.entries.len() > self.config.capacity {
            self.evict_to_capacity();
        }

        if near_duplicate {
            debug!(memory_id = %id, "stored near-duplicate (same hypothesis, new protocol)");
            RecordOutcome::NearDuplicate(id)
        } else {
            RecordOutcome::Stored(id)
        }
    }

    /// Query matching entries ordered by relevance, most relevant first.
    /// Returned entries have their access tracking updated.
    pub fn query(&mut self, filter: &QueryFilter) -> Vec<MemoryEntry> {
        let now = Utc::now();
        let mut ids: Vec<(MemoryId, f64)> = self
            .entries
            .values()
            .filter(|e| filter.matches(e))
            .map(|e| (e.memory_id, self.relevance(e, now)))
            .collect();
        ids.sort_by(|a, b| b.1.total_cmp(&a.1));
        if let Some(limit) = filter.limit {
            ids.truncate(limit);
        }

        ids.iter()
            .filter_map(|(id, _)| {
                self.entries.get_mut(id).map(|entry| {
                    entry.touch();
                    entry.clone()
                })
            })
            .collect()
    }

    /// Relevance score: importance x recency decay x access-count boost.
    pub fn relevance(&self, entry: &MemoryEntry, now: Timestamp) -> f64 {
        let age_hours = entry.age_hours(now);
        let decay = (-age_hours * std::f64::consts::LN_2 / self.config.half_life_hours).exp();
        let boost = 1.0 + self.config.access_boost * ((1 + entry.access_count) as f64).ln();
        entry.importance * decay * boost
    }

    /// Remove entries that are simultaneously below the importance floor
    /// and older than the configured age. Dead-end entries are never
    /// removed regardless of age. Returns the number of entries removed.
    pub fn prune(&mut self) -> usize {
        let now = Utc::now();
        let victims: Vec<MemoryId> = self
            .entries
            .values()
            .filter(|e| {
                e.category != MemoryCategory::DeadEnd
                    && e.importance < self.config.importance_floor
                    && e.age_hours(now) > self.config.max_age_hours
            })
            .map(|e| e.memory_id)
            .collect();
        for id in &victims {
            self.remove(id);
        }
        if !victims.is_empty() {
            debug!(removed = victims.len(), "pruned stale low-importance entries");
        }
        victims.len()
    }

    /// Bulk export of all entries for backup.
    pub fn export(&self) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.memory_id);
        entries
    }

    /// Bulk import, replacing current contents. The signature index is
    /// rebuilt; entries whose signatures collide are rejected wholesale
    /// so a corrupted backup cannot half-load.
    pub fn import(&mut self, entries: Vec<MemoryEntry>) -> Result<usize, MemoryError> {
        let mut by_signature = HashMap::new();
        for entry in &entries {
            if let Some(signature) = entry.signature {
                if by_signature.insert(signature, entry.memory_id).is_some() {
                    return Err(MemoryError::ImportFailed {
                        reason: format!("duplicate signature {signature} in import set"),
                    });
                }
            }
        }

        self.entries = entries
            .into_iter()
            .map(|e| (e.memory_id, e))
            .collect();
        self.by_signature = by_signature;

        if self.entries.len() > self.config.capacity {
            self.evict_to_capacity();
        }
        Ok(self.entries.len())
    }

    fn remove(&mut self, id: &MemoryId) {
        if let Some(entry) = self.entries.remove(id) {
            if let Some(signature) = entry.signature {
                self.by_signature.remove(&signature);
            }
        }
    }

    /// Evict least-relevant non-dead-end entries until at capacity.
    fn evict_to_capacity(&mut self) {
        let now = Utc::now();
        while self.entries.len() > self.config.capacity {
            let victim = self
                .entries
                .values()
                .filter(|e| e.category != MemoryCategory::DeadEnd)
                .map(|e| (e.memory_id, self.relevance(e, now)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            match victim {
                Some((id, _)) => {
                    debug!(memory_id = %id, "evicting least-relevant entry over capacity");
                    self.remove(&id);
                }
                None => {
                    warn!(
                        count = self.entries.len(),
                        capacity = self.config.capacity,
                        "store over capacity but only dead-end entries remain"
                    );
                    break;
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sagan_core::{new_entity_id, ExperimentProtocol};

    fn store() -> MemoryStore {
        MemoryStore::new(MemoryConfig::default())
    }

    fn signature(statement: &str, dose: &str) -> ExperimentSignature {
        let protocol = ExperimentProtocol::new(new_entity_id(), "dose", "trial")
            .with_parameter("dose_mg", dose);
        ExperimentSignature::compute(statement, &protocol)
    }

    fn experiment_entry(statement: &str, dose: &str) -> MemoryEntry {
        MemoryEntry::new(
            MemoryCategory::General,
            format!("{statement} at {dose}mg"),
        )
        .with_signature(signature(statement, dose))
    }

    #[test]
    fn test_identical_signatures_dedup_to_one_entry() {
        let mut store = store();
        let first = store.record(experiment_entry("caffeine improves recall", "200"));
        let second = store.record(experiment_entry("caffeine improves recall", "200"));
        assert!(matches!(first, RecordOutcome::Stored(_)));
        match (first, second) {
            (RecordOutcome::Stored(original), RecordOutcome::Duplicate(reported)) => {
                assert_eq!(original, reported)
            }
            other => panic!("expected duplicate rejection, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_hypothesis_different_protocol_stores_both() {
        let mut store = store();
        let first = store.record(experiment_entry("caffeine improves recall", "200"));
        let second = store.record(experiment_entry("caffeine improves recall", "400"));
        assert!(matches!(first, RecordOutcome::Stored(_)));
        assert!(matches!(second, RecordOutcome::NearDuplicate(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dedup_is_idempotent_across_repeats() {
        let mut store = store();
        for _ in 0..5 {
            store.record(experiment_entry("caffeine improves recall", "200"));
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_eviction_keeps_exactly_capacity() {
        let mut store = MemoryStore::new(MemoryConfig {
            capacity: 1000,
            ..MemoryConfig::default()
        });
        let mut lowest = None;
        for i in 0..1001 {
            // Give one entry a clearly lowest importance so the eviction
            // victim is deterministic.
            let importance = if i == 500 { 0.01 } else { 0.5 };
            let entry = MemoryEntry::new(MemoryCategory::General, format!("entry {i}"))
                .with_importance(importance);
            if i == 500 {
                lowest = Some(entry.memory_id);
            }
            store.record(entry);
        }
        assert_eq!(store.len(), 1000);
        assert!(!store.entries.contains_key(&lowest.unwrap()));
    }

    #[test]
    fn test_dead_end_entries_survive_capacity_pressure() {
        let mut store = MemoryStore::new(MemoryConfig {
            capacity: 2,
            ..MemoryConfig::default()
        });
        store.record(MemoryEntry::new(MemoryCategory::DeadEnd, "never retry A"));
        store.record(MemoryEntry::new(MemoryCategory::DeadEnd, "never retry B"));
        store.record(MemoryEntry::new(MemoryCategory::General, "note"));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store
                .export()
                .iter()
                .filter(|e| e.category == MemoryCategory::DeadEnd)
                .count(),
            2
        );
    }

    #[test]
    fn test_prune_requires_both_low_importance_and_old_age() {
        let mut store = MemoryStore::new(MemoryConfig {
            importance_floor: 0.5,
            max_age_hours: 24.0,
            ..MemoryConfig::default()
        });
        let old = chrono::Utc::now() - chrono::Duration::hours(48);

        let mut old_low = MemoryEntry::new(MemoryCategory::General, "old low");
        old_low.created_at = old;
        let old_low_id = old_low.memory_id;

        let mut old_important =
            MemoryEntry::new(MemoryCategory::Insight, "old important").with_importance(0.9);
        old_important.created_at = old;

        let fresh_low = MemoryEntry::new(MemoryCategory::General, "fresh low");

        let mut old_dead_end = MemoryEntry::new(MemoryCategory::DeadEnd, "old dead end");
        old_dead_end.created_at = old;
        old_dead_end.importance = 0.1; // Even artificially low, exempt.

        store.record(old_low);
        store.record(old_important);
        store.record(fresh_low);
        store.record(old_dead_end);

        assert_eq!(store.prune(), 1);
        assert_eq!(store.len(), 3);
        assert!(!store.entries.contains_key(&old_low_id));
    }

    #[test]
    fn test_query_orders_by_relevance() {
        let mut store = store();
        store.record(MemoryEntry::new(MemoryCategory::General, "minor").with_importance(0.2));
        store.record(MemoryEntry::new(MemoryCategory::Insight, "major").with_importance(0.9));
        let results = store.query(&QueryFilter::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "major");
        assert_eq!(results[1].content, "minor");
    }

    #[test]
    fn test_query_filters_and_touches() {
        let mut store = store();
        store.record(
            MemoryEntry::new(MemoryCategory::FailurePattern, "underpowered at n=10")
                .with_tags(vec!["underpowered".to_string()]),
        );
        store.record(MemoryEntry::new(MemoryCategory::Insight, "unrelated"));

        let results = store.query(&QueryFilter::category(MemoryCategory::FailurePattern));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].access_count, 1);

        let again = store.query(
            &QueryFilter::category(MemoryCategory::FailurePattern).with_tag("underpowered"),
        );
        assert_eq!(again[0].access_count, 2);
    }

    #[test]
    fn test_query_limit() {
        let mut store = store();
        for i in 0..10 {
            store.record(MemoryEntry::new(MemoryCategory::General, format!("e{i}")));
        }
        let results = store.query(&QueryFilter::default().with_limit(3));
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut store = store();
        store.record(experiment_entry("caffeine improves recall", "200"));
        store.record(MemoryEntry::new(MemoryCategory::DeadEnd, "never again"));
        let exported = store.export();

        let mut restored = MemoryStore::new(MemoryConfig::default());
        assert_eq!(restored.import(exported.clone()).unwrap(), 2);
        assert_eq!(restored.export(), exported);

        // The rebuilt signature index still deduplicates.
        let outcome = restored.record(experiment_entry("caffeine improves recall", "200"));
        assert!(matches!(outcome, RecordOutcome::Duplicate(_)));
    }

    #[test]
    fn test_import_rejects_colliding_signatures() {
        let mut store = store();
        let sig = signature("caffeine improves recall", "200");
        let a = MemoryEntry::new(MemoryCategory::General, "a").with_signature(sig);
        let b = MemoryEntry::new(MemoryCategory::General, "b").with_signature(sig);
        let err = store.import(vec![a, b]).unwrap_err();
        assert!(matches!(err, MemoryError::ImportFailed { .. }));
    }
}
