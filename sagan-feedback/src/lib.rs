//! SAGAN Feedback - Learning Signals From Completed Results
//!
//! Converts completed experiment outcomes into reusable learning signals:
//! success/failure patterns keyed by a coarse statistical signature (so a
//! recurring failure mode increments a counter instead of piling up as
//! fresh entries), bounded confidence nudges for the refiner, and strategy
//! adjustments for the director's effectiveness table.

use chrono::Utc;
use sagan_core::{
    ExperimentResult, FailureCategory, Hypothesis, HypothesisId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Learning rate applied to supporting evidence.
pub const SUCCESS_LEARNING_RATE: f64 = 0.3;

/// Learning rate applied to non-supporting evidence. Deliberately higher
/// than the success rate: the loop backs off failing directions faster
/// than it commits to promising ones.
pub const FAILURE_LEARNING_RATE: f64 = 0.4;

// ============================================================================
// PATTERN IDENTITY
// ============================================================================

/// Coarse p-value bucket for pattern identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PValueBucket {
    /// p < 0.01
    Strong,
    /// 0.01 <= p < 0.05
    Significant,
    /// p >= 0.05
    NotSignificant,
}

impl PValueBucket {
    /// Bucket a raw p-value.
    pub fn from_p(p: f64) -> Self {
        if p < 0.01 {
            PValueBucket::Strong
        } else if p < 0.05 {
            PValueBucket::Significant
        } else {
            PValueBucket::NotSignificant
        }
    }
}

/// Coarse effect-size bucket for pattern identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectBucket {
    /// |effect| >= 0.8
    Large,
    /// 0.5 <= |effect| < 0.8
    Medium,
    /// 0.2 <= |effect| < 0.5
    Small,
    /// |effect| < 0.2
    Negligible,
}

impl EffectBucket {
    /// Bucket a raw effect size.
    pub fn from_effect(effect: f64) -> Self {
        let magnitude = effect.abs();
        if magnitude >= 0.8 {
            EffectBucket::Large
        } else if magnitude >= 0.5 {
            EffectBucket::Medium
        } else if magnitude >= 0.2 {
            EffectBucket::Small
        } else {
            EffectBucket::Negligible
        }
    }
}

/// Kind of pattern a result produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternKind {
    /// A supported, significant outcome
    Success,
    /// A categorized failure mode
    Failure(FailureCategory),
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Success => write!(f, "success"),
            PatternKind::Failure(category) => write!(f, "{category}"),
        }
    }
}

/// Pattern identity: kind plus coarse statistical signature. Two results
/// with the same key are treated as recurrences of one pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternKey {
    /// What kind of outcome this pattern records
    pub kind: PatternKind,
    /// Coarse p-value bucket
    pub p_bucket: PValueBucket,
    /// Coarse effect-size bucket
    pub effect_bucket: EffectBucket,
}

impl PatternKey {
    /// Derive the key for a result under the given kind.
    pub fn for_result(kind: PatternKind, result: &ExperimentResult) -> Self {
        Self {
            kind,
            p_bucket: PValueBucket::from_p(result.p_value),
            effect_bucket: EffectBucket::from_effect(result.effect_size),
        }
    }
}

/// A pattern with its occurrence count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Identity of the pattern
    pub key: PatternKey,
    /// Human-readable description from the first occurrence
    pub description: String,
    /// How often this pattern has recurred
    pub occurrences: u64,
    /// First time this pattern was seen
    pub first_seen: Timestamp,
    /// Most recent occurrence
    pub last_seen: Timestamp,
}

// ============================================================================
// FEEDBACK SIGNALS
// ============================================================================

/// Typed signal derived from a completed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedbackSignal {
    /// A success pattern was recorded or recurred
    SuccessPattern(PatternRecord),
    /// A failure pattern was recorded or recurred
    FailurePattern(PatternRecord),
    /// The hypothesis's confidence should move
    HypothesisUpdate {
        hypothesis_id: HypothesisId,
        old_confidence: f64,
        new_confidence: f64,
        supporting: bool,
    },
    /// The director's strategy-effectiveness table should be adjusted
    StrategyAdjustment { strategy: String, success: bool },
}

// ============================================================================
// FEEDBACK LOOP
// ============================================================================

/// Derives learning signals from completed results and tracks pattern
/// recurrence.
#[derive(Debug, Clone)]
pub struct FeedbackLoop {
    alpha: f64,
    patterns: HashMap<PatternKey, PatternRecord>,
}

impl FeedbackLoop {
    /// Create a feedback loop using the given significance level.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            patterns: HashMap::new(),
        }
    }

    /// All recorded patterns.
    pub fn patterns(&self) -> Vec<&PatternRecord> {
        let mut all: Vec<_> = self.patterns.values().collect();
        all.sort_by_key(|p| p.first_seen);
        all
    }

    /// Occurrences recorded for a pattern key.
    pub fn occurrences(&self, key: &PatternKey) -> u64 {
        self.patterns.get(key).map(|p| p.occurrences).unwrap_or(0)
    }

    /// Rule-based failure categorization.
    ///
    /// Returns `None` for results that are neither successes nor clear
    /// failures (e.g., a mildly non-significant small effect).
    pub fn categorize_failure(&self, result: &ExperimentResult) -> Option<FailureCategory> {
        if !result.execution_ok {
            return Some(FailureCategory::ExecutionError);
        }
        if result.p_value >= self.alpha && result.effect_size.abs() >= 0.5 {
            return Some(FailureCategory::Underpowered);
        }
        if result.p_value < self.alpha && result.effect_size.abs() < 0.2 {
            return Some(FailureCategory::StatisticalNoise);
        }
        if !result.supports && result.sample_size >= 100 {
            return Some(FailureCategory::ConceptualFlaw);
        }
        None
    }

    /// Process one completed result into signals.
    ///
    /// The confidence nudge uses the same bounded-update shape as the
    /// refiner's Bayesian tier, with the feedback-specific learning rates.
    pub fn process_result(
        &mut self,
        hypothesis: &Hypothesis,
        strategy: &str,
        result: &ExperimentResult,
    ) -> Vec<FeedbackSignal> {
        let mut signals = Vec::new();
        let succeeded = result.supports && result.is_significant(self.alpha);

        if succeeded {
            let record = self.record_pattern(
                PatternKey::for_result(PatternKind::Success, result),
                format!(
                    "supported: {} (p={:.3}, effect={:.2})",
                    hypothesis.statement, result.p_value, result.effect_size
                ),
            );
            signals.push(FeedbackSignal::SuccessPattern(record));
        } else if let Some(category) = self.categorize_failure(result) {
            let record = self.record_pattern(
                PatternKey::for_result(PatternKind::Failure(category), result),
                format!(
                    "{category}: {} (p={:.3}, effect={:.2}, n={})",
                    hypothesis.statement, result.p_value, result.effect_size, result.sample_size
                ),
            );
            signals.push(FeedbackSignal::FailurePattern(record));
        }

        let new_confidence = nudge_confidence(hypothesis.confidence, result, self.alpha);
        if (new_confidence - hypothesis.confidence).abs() > f64::EPSILON {
            signals.push(FeedbackSignal::HypothesisUpdate {
                hypothesis_id: hypothesis.hypothesis_id,
                old_confidence: hypothesis.confidence,
                new_confidence,
                supporting: result.supports,
            });
        }

        signals.push(FeedbackSignal::StrategyAdjustment {
            strategy: strategy.to_string(),
            success: succeeded,
        });

        debug!(
            hypothesis = %hypothesis.hypothesis_id,
            strategy,
            succeeded,
            signals = signals.len(),
            "processed result into feedback signals"
        );
        signals
    }

    fn record_pattern(&mut self, key: PatternKey, description: String) -> PatternRecord {
        let now = Utc::now();
        let record = self.patterns.entry(key).or_insert_with(|| PatternRecord {
            key,
            description,
            occurrences: 0,
            first_seen: now,
            last_seen: now,
        });
        record.occurrences += 1;
        record.last_seen = now;
        record.clone()
    }
}

/// Bounded confidence nudge with asymmetric learning rates.
pub fn nudge_confidence(confidence: f64, result: &ExperimentResult, alpha: f64) -> f64 {
    let evidence = (1.0 - result.p_value).max(0.0) * result.effect_size.abs().min(1.0);
    let nudged = if result.supports && result.is_significant(alpha) {
        confidence + (1.0 - confidence) * evidence * SUCCESS_LEARNING_RATE
    } else if !result.supports {
        confidence * (1.0 - evidence * FAILURE_LEARNING_RATE)
    } else {
        confidence
    };
    nudged.clamp(0.0, 1.0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sagan_core::new_entity_id;

    fn hypothesis() -> Hypothesis {
        Hypothesis::new("caffeine improves recall", "pharmacology")
    }

    fn result(p: f64, effect: f64, n: u64, supports: bool) -> ExperimentResult {
        ExperimentResult::new(new_entity_id(), new_entity_id())
            .with_statistics(p, effect, n)
            .with_support(supports)
    }

    #[test]
    fn test_execution_error_category() {
        let feedback = FeedbackLoop::new(0.05);
        let failed = result(0.5, 0.0, 10, false).with_execution_error("crashed");
        assert_eq!(
            feedback.categorize_failure(&failed),
            Some(FailureCategory::ExecutionError)
        );
    }

    #[test]
    fn test_underpowered_category() {
        let feedback = FeedbackLoop::new(0.05);
        let underpowered = result(0.2, 0.7, 12, false);
        assert_eq!(
            feedback.categorize_failure(&underpowered),
            Some(FailureCategory::Underpowered)
        );
    }

    #[test]
    fn test_statistical_noise_category() {
        let feedback = FeedbackLoop::new(0.05);
        let noise = result(0.01, 0.05, 10_000, true);
        assert_eq!(
            feedback.categorize_failure(&noise),
            Some(FailureCategory::StatisticalNoise)
        );
    }

    #[test]
    fn test_conceptual_flaw_category() {
        let feedback = FeedbackLoop::new(0.05);
        let flawed = result(0.4, 0.3, 500, false);
        assert_eq!(
            feedback.categorize_failure(&flawed),
            Some(FailureCategory::ConceptualFlaw)
        );
    }

    #[test]
    fn test_ambiguous_result_has_no_category() {
        let feedback = FeedbackLoop::new(0.05);
        let ambiguous = result(0.3, 0.3, 20, true);
        assert_eq!(feedback.categorize_failure(&ambiguous), None);
    }

    #[test]
    fn test_recurring_pattern_increments_counter() {
        let mut feedback = FeedbackLoop::new(0.05);
        let h = hypothesis();
        // Same failure mode, slightly different statistics within the
        // same coarse buckets.
        feedback.process_result(&h, "factorial", &result(0.2, 0.7, 12, false));
        feedback.process_result(&h, "factorial", &result(0.25, 0.65, 15, false));

        let key = PatternKey {
            kind: PatternKind::Failure(FailureCategory::Underpowered),
            p_bucket: PValueBucket::NotSignificant,
            effect_bucket: EffectBucket::Medium,
        };
        assert_eq!(feedback.occurrences(&key), 2);
        assert_eq!(feedback.patterns().len(), 1);
    }

    #[test]
    fn test_success_emits_success_pattern_and_strategy_win() {
        let mut feedback = FeedbackLoop::new(0.05);
        let h = hypothesis();
        let signals = feedback.process_result(&h, "ablation", &result(0.01, 0.8, 100, true));

        assert!(signals
            .iter()
            .any(|s| matches!(s, FeedbackSignal::SuccessPattern(_))));
        assert!(signals.iter().any(|s| matches!(
            s,
            FeedbackSignal::StrategyAdjustment { success: true, .. }
        )));
        let update = signals
            .iter()
            .find_map(|s| match s {
                FeedbackSignal::HypothesisUpdate {
                    old_confidence,
                    new_confidence,
                    ..
                } => Some((*old_confidence, *new_confidence)),
                _ => None,
            })
            .unwrap();
        assert!(update.1 > update.0);
    }

    #[test]
    fn test_failure_nudges_confidence_down() {
        let h = hypothesis();
        let new = nudge_confidence(h.confidence, &result(0.6, 0.7, 12, false), 0.05);
        assert!(new < h.confidence);
    }

    #[test]
    fn test_failure_rate_is_stronger_than_success_rate() {
        // Symmetric evidence, asymmetric movement.
        let up = nudge_confidence(0.5, &result(0.01, 0.8, 100, true), 0.05) - 0.5;
        let down = 0.5 - nudge_confidence(0.5, &result(0.01, 0.8, 100, false), 0.05);
        assert!(down > up);
    }

    proptest! {
        /// Nudged confidence always stays in [0, 1].
        #[test]
        fn prop_nudge_stays_bounded(
            confidence in 0.0f64..=1.0,
            p in 0.0f64..=1.0,
            effect in -2.0f64..=2.0,
            supports in any::<bool>(),
        ) {
            let r = result(p, effect, 50, supports);
            let nudged = nudge_confidence(confidence, &r, 0.05);
            prop_assert!((0.0..=1.0).contains(&nudged));
        }
    }
}
