//! Hypothesis entity and its evolution history.

use crate::enums::{HypothesisStatus, RefinementAction};
use crate::error::RefinerError;
use crate::{HypothesisId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step in a hypothesis's evolution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEntry {
    /// What happened
    pub action: RefinementAction,
    /// When it happened
    pub timestamp: Timestamp,
    /// Why it happened
    pub rationale: String,
}

impl EvolutionEntry {
    /// Create a new evolution entry stamped with the current time.
    pub fn new(action: RefinementAction, rationale: impl Into<String>) -> Self {
        Self {
            action,
            timestamp: Utc::now(),
            rationale: rationale.into(),
        }
    }
}

/// A working hypothesis in the research plan.
///
/// Generation starts at 1 and increases by exactly one on every
/// refine/spawn/merge step, so a child's generation is always strictly
/// greater than its parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique identifier for this hypothesis
    pub hypothesis_id: HypothesisId,
    /// The testable statement
    pub statement: String,
    /// Domain tag (e.g., "pharmacology", "materials")
    pub domain: String,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    /// Current lifecycle status
    pub status: HypothesisStatus,
    /// Refinement generation, starting at 1
    pub generation: u32,
    /// Parent hypothesis, if this one was refined or spawned from another
    pub parent_id: Option<HypothesisId>,
    /// All parents, for hypotheses produced by a merge
    pub lineage: Vec<HypothesisId>,
    /// How many times this hypothesis has been refined
    pub refinement_count: u32,
    /// Ordered history of what happened to this hypothesis
    pub evolution: Vec<EvolutionEntry>,
    /// When this hypothesis was created
    pub created_at: Timestamp,
    /// When this hypothesis was last updated
    pub updated_at: Timestamp,
}

impl Hypothesis {
    /// Create a new first-generation hypothesis.
    pub fn new(statement: impl Into<String>, domain: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            hypothesis_id: Uuid::now_v7(),
            statement: statement.into(),
            domain: domain.into(),
            confidence: 0.5,
            status: HypothesisStatus::Untested,
            generation: 1,
            parent_id: None,
            lineage: Vec::new(),
            refinement_count: 0,
            evolution: vec![EvolutionEntry::new(
                RefinementAction::Created,
                "initial hypothesis",
            )],
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the prior confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the domain tag.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Change status, rejecting any attempt to re-activate a retired
    /// hypothesis.
    pub fn set_status(&mut self, status: HypothesisStatus) -> Result<(), RefinerError> {
        if self.status == HypothesisStatus::Retired && status != HypothesisStatus::Retired {
            return Err(RefinerError::Retired {
                id: self.hypothesis_id,
            });
        }
        self.status = status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Retire this hypothesis, appending the rationale to its history.
    pub fn retire(&mut self, rationale: impl Into<String>) {
        self.status = HypothesisStatus::Retired;
        self.record(RefinementAction::Retired, rationale);
    }

    /// Append an evolution entry and bump the update timestamp.
    pub fn record(&mut self, action: RefinementAction, rationale: impl Into<String>) {
        self.evolution.push(EvolutionEntry::new(action, rationale));
        self.updated_at = Utc::now();
    }

    /// Create a refined child: generation + 1, parent set to this
    /// hypothesis. The parent's own history records the refinement.
    pub fn refine_into(&mut self, statement: impl Into<String>, rationale: &str) -> Hypothesis {
        self.refinement_count += 1;
        self.record(RefinementAction::Refined, rationale);

        let mut child = Hypothesis::new(statement, self.domain.clone());
        child.generation = self.generation + 1;
        child.parent_id = Some(self.hypothesis_id);
        child.confidence = self.confidence;
        child.evolution = vec![EvolutionEntry::new(RefinementAction::Refined, rationale)];
        child
    }

    /// Create a sibling variant: generation + 1, same parent linkage,
    /// without retiring this hypothesis.
    pub fn spawn_variant(&mut self, statement: impl Into<String>, rationale: &str) -> Hypothesis {
        self.record(RefinementAction::Spawned, rationale);

        let mut sibling = Hypothesis::new(statement, self.domain.clone());
        sibling.generation = self.generation + 1;
        sibling.parent_id = Some(self.hypothesis_id);
        sibling.evolution = vec![EvolutionEntry::new(RefinementAction::Spawned, rationale)];
        sibling
    }

    /// Combine supported hypotheses into a single higher-generation child
    /// whose lineage points at all parents. Returns an error for fewer
    /// than two parents.
    pub fn merged_from(
        parents: &[&Hypothesis],
        statement: impl Into<String>,
        rationale: &str,
    ) -> Result<Hypothesis, RefinerError> {
        if parents.len() < 2 {
            return Err(RefinerError::MergeTooFew {
                count: parents.len(),
            });
        }
        let max_generation = parents.iter().map(|p| p.generation).max().unwrap_or(1);
        let mean_confidence =
            parents.iter().map(|p| p.confidence).sum::<f64>() / parents.len() as f64;

        let mut merged = Hypothesis::new(statement, parents[0].domain.clone());
        merged.generation = max_generation + 1;
        merged.parent_id = Some(parents[0].hypothesis_id);
        merged.lineage = parents.iter().map(|p| p.hypothesis_id).collect();
        merged.confidence = mean_confidence.clamp(0.0, 1.0);
        merged.evolution = vec![EvolutionEntry::new(RefinementAction::Merged, rationale)];
        Ok(merged)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Hypothesis {
        Hypothesis::new("caffeine improves recall", "pharmacology")
    }

    #[test]
    fn test_new_hypothesis_defaults() {
        let h = sample();
        assert_eq!(h.generation, 1);
        assert_eq!(h.status, HypothesisStatus::Untested);
        assert_eq!(h.confidence, 0.5);
        assert!(h.parent_id.is_none());
        assert_eq!(h.evolution.len(), 1);
        assert_eq!(h.evolution[0].action, RefinementAction::Created);
    }

    #[test]
    fn test_with_confidence_clamps() {
        let h = sample().with_confidence(1.7);
        assert_eq!(h.confidence, 1.0);
        let h = sample().with_confidence(-0.3);
        assert_eq!(h.confidence, 0.0);
    }

    #[test]
    fn test_retired_hypothesis_cannot_reactivate() {
        let mut h = sample();
        h.retire("dead end");
        let err = h.set_status(HypothesisStatus::Testing).unwrap_err();
        assert!(matches!(err, RefinerError::Retired { .. }));
        assert_eq!(h.status, HypothesisStatus::Retired);
    }

    #[test]
    fn test_refine_increments_generation() {
        let mut parent = sample();
        let child = parent.refine_into("caffeine improves short-term recall", "narrow the claim");
        assert_eq!(child.generation, parent.generation + 1);
        assert_eq!(child.parent_id, Some(parent.hypothesis_id));
        assert_eq!(parent.refinement_count, 1);
        assert!(parent
            .evolution
            .iter()
            .any(|e| e.action == RefinementAction::Refined));
        // Refine does not retire the parent by itself.
        assert_eq!(parent.status, HypothesisStatus::Untested);
    }

    #[test]
    fn test_spawn_variant_keeps_original_active() {
        let mut original = sample();
        let sibling = original.spawn_variant("caffeine improves reaction time", "related angle");
        assert_eq!(sibling.generation, original.generation + 1);
        assert_eq!(sibling.parent_id, Some(original.hypothesis_id));
        assert_eq!(original.refinement_count, 0);
        assert!(original.status.is_active());
    }

    #[test]
    fn test_merge_requires_two_parents() {
        let a = sample();
        let err = Hypothesis::merged_from(&[&a], "merged", "why").unwrap_err();
        assert!(matches!(err, RefinerError::MergeTooFew { count: 1 }));
    }

    #[test]
    fn test_merge_lineage_and_generation() {
        let mut a = sample();
        let mut b = Hypothesis::new("caffeine improves memory encoding", "pharmacology");
        a.generation = 2;
        b.generation = 3;
        let merged =
            Hypothesis::merged_from(&[&a, &b], "caffeine improves memory", "compatible").unwrap();
        assert_eq!(merged.generation, 4);
        assert_eq!(merged.lineage, vec![a.hypothesis_id, b.hypothesis_id]);
        assert!(merged.generation > a.generation && merged.generation > b.generation);
    }
}
