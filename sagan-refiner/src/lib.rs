//! SAGAN Refiner - Hypothesis Fate Decisions
//!
//! Decides the fate of each hypothesis with at least one new result using
//! an ordered chain of tiers, composed left-to-right, first match wins:
//!
//! 1. **Rule tier** - enough consecutive non-supporting results force
//!    retirement, regardless of anything the later tiers would say.
//! 2. **Bayesian tier** - a running heuristic confidence update; clearly
//!    dead or clearly healthy hypotheses resolve here.
//! 3. **Oracle tier** - ambiguous trends go to the generation oracle for
//!    a forced choice, with a safe `Continue` fallback on parse failure.
//!
//! Each tier is a pure function returning either a decision or "defer to
//! the next tier", which keeps every tier independently testable.

pub mod similarity;

pub use similarity::{
    check_contradiction, direction_of, directions_conflict, find_contradictions,
    jaccard_similarity, merge_groups, ContradictionFlag, Direction,
};

use sagan_core::{
    DecisionSource, ExperimentResult, Hypothesis, HypothesisId, RefinerConfig,
};
use sagan_oracle::{OracleClient, VerdictCompletion};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// VERDICTS
// ============================================================================

/// What should happen to a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    /// Keep testing as-is
    Continue,
    /// Remove from the active pool
    Retire { rationale: String },
    /// Produce a refined child
    Refine {
        statement: String,
        rationale: String,
        /// Whether the refinement supersedes (retires) the original
        supersede: bool,
    },
}

/// A complete refiner decision for one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinerDecision {
    /// Hypothesis the decision applies to
    pub hypothesis_id: HypothesisId,
    /// The verdict
    pub verdict: Verdict,
    /// Which tier produced the verdict
    pub source: DecisionSource,
    /// Confidence after the Bayesian update, whether or not that tier
    /// decided
    pub confidence_after: f64,
}

// ============================================================================
// RULE TIER
// ============================================================================

/// Count of trailing consecutive non-supporting results.
pub fn trailing_failures(results: &[&ExperimentResult]) -> u32 {
    results
        .iter()
        .rev()
        .take_while(|r| !r.supports)
        .count() as u32
}

/// Rule tier: retire after enough consecutive non-supporting results.
/// Returns `None` to defer.
pub fn rule_tier(results: &[&ExperimentResult], limit: u32) -> Option<Verdict> {
    let failures = trailing_failures(results);
    if failures >= limit {
        Some(Verdict::Retire {
            rationale: format!("{failures} consecutive non-supporting results"),
        })
    } else {
        None
    }
}

// ============================================================================
// BAYESIAN TIER
// ============================================================================

/// One heuristic confidence update for a single result.
///
/// Evidence strength is (1 - p) x min(|effect|, 1.0); supporting results
/// move confidence toward 1, non-supporting results scale it down. This
/// is a deliberate heuristic, not a formal posterior.
pub fn update_confidence(confidence: f64, result: &ExperimentResult, learning_rate: f64) -> f64 {
    let evidence = (1.0 - result.p_value).max(0.0) * result.effect_size.abs().min(1.0);
    let updated = if result.supports {
        confidence + (1.0 - confidence) * evidence * learning_rate
    } else {
        confidence * (1.0 - evidence * learning_rate)
    };
    updated.clamp(0.0, 1.0)
}

/// Bayesian tier outcome: the post-update confidence trajectory and an
/// optional verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianOutcome {
    /// Confidence after each new result, in order
    pub trajectory: Vec<f64>,
    /// Final confidence
    pub confidence: f64,
    /// Verdict, if the tier resolved
    pub verdict: Option<Verdict>,
}

/// Bayesian tier: run the confidence update over the new results.
///
/// Retires below the retire threshold; continues when confidence is high
/// and stable across the configured window; otherwise defers.
pub fn bayesian_tier(
    prior: f64,
    new_results: &[&ExperimentResult],
    config: &RefinerConfig,
) -> BayesianOutcome {
    let mut confidence = prior.clamp(0.0, 1.0);
    let mut trajectory = Vec::with_capacity(new_results.len());
    for result in new_results {
        confidence = update_confidence(confidence, result, config.learning_rate);
        trajectory.push(confidence);
    }

    let verdict = if confidence < config.retire_threshold {
        Some(Verdict::Retire {
            rationale: format!(
                "confidence {confidence:.3} fell below {:.2}",
                config.retire_threshold
            ),
        })
    } else if is_high_and_stable(&trajectory, config) {
        Some(Verdict::Continue)
    } else {
        None
    };

    BayesianOutcome {
        trajectory,
        confidence,
        verdict,
    }
}

/// High and stable: the last `stability_window` post-update values all sit
/// at or above the continue threshold with spread within tolerance.
fn is_high_and_stable(trajectory: &[f64], config: &RefinerConfig) -> bool {
    if trajectory.len() < config.stability_window {
        return false;
    }
    let window = &trajectory[trajectory.len() - config.stability_window..];
    let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    min >= config.continue_threshold && (max - min) <= config.stability_spread
}

// ============================================================================
// ORACLE TIER
// ============================================================================

/// Build the structured summary the oracle tier submits.
pub fn verdict_prompt(hypothesis: &Hypothesis, results: &[&ExperimentResult]) -> String {
    let mut prompt = format!(
        "Hypothesis under review (generation {}, confidence {:.2}):\n  {}\n\nResults:\n",
        hypothesis.generation, hypothesis.confidence, hypothesis.statement
    );
    for result in results {
        prompt.push_str(&format!(
            "  - p={:.4}, effect={:.2}, n={}, supports={}\n",
            result.p_value, result.effect_size, result.sample_size, result.supports
        ));
    }
    prompt.push_str(
        "\nThe trend is ambiguous. Choose exactly one fate and answer as JSON:\n\
         {\"decision\": \"retire\", \"rationale\": \"...\"}\n\
         {\"decision\": \"refine\", \"statement\": \"...\", \"rationale\": \"...\", \"supersede\": true|false}\n\
         {\"decision\": \"continue\", \"rationale\": \"...\"}\n",
    );
    prompt
}

fn verdict_from_completion(completion: VerdictCompletion) -> Verdict {
    match completion {
        VerdictCompletion::Retire { rationale } => Verdict::Retire { rationale },
        VerdictCompletion::Refine {
            statement,
            rationale,
            supersede,
        } => Verdict::Refine {
            statement,
            rationale,
            supersede,
        },
        VerdictCompletion::Continue { .. } => Verdict::Continue,
    }
}

// ============================================================================
// REFINER
// ============================================================================

/// The three-tier hypothesis refiner.
#[derive(Debug, Clone)]
pub struct Refiner {
    config: RefinerConfig,
    oracle: OracleClient,
}

impl Refiner {
    /// Create a refiner.
    pub fn new(config: RefinerConfig, oracle: OracleClient) -> Self {
        Self { config, oracle }
    }

    /// The refiner's configuration.
    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Decide the fate of one hypothesis.
    ///
    /// `all_results` is the hypothesis's full result history (the rule
    /// tier counts trailing failures over it); `new_results` are the
    /// results the Bayesian tier has not yet absorbed.
    pub async fn decide(
        &self,
        hypothesis: &Hypothesis,
        all_results: &[&ExperimentResult],
        new_results: &[&ExperimentResult],
    ) -> RefinerDecision {
        let bayes = bayesian_tier(hypothesis.confidence, new_results, &self.config);

        if let Some(verdict) = rule_tier(all_results, self.config.consecutive_failure_limit) {
            debug!(hypothesis = %hypothesis.hypothesis_id, "rule tier retired hypothesis");
            return RefinerDecision {
                hypothesis_id: hypothesis.hypothesis_id,
                verdict,
                source: DecisionSource::Rule,
                confidence_after: bayes.confidence,
            };
        }

        if let Some(verdict) = bayes.verdict.clone() {
            debug!(
                hypothesis = %hypothesis.hypothesis_id,
                confidence = bayes.confidence,
                "bayesian tier resolved hypothesis"
            );
            return RefinerDecision {
                hypothesis_id: hypothesis.hypothesis_id,
                verdict,
                source: DecisionSource::Bayesian,
                confidence_after: bayes.confidence,
            };
        }

        let prompt = verdict_prompt(hypothesis, all_results);
        let (completion, source) = self.oracle.verdict(&prompt).await;
        debug!(
            hypothesis = %hypothesis.hypothesis_id,
            %source,
            "oracle tier resolved ambiguous hypothesis"
        );
        RefinerDecision {
            hypothesis_id: hypothesis.hypothesis_id,
            verdict: verdict_from_completion(completion),
            source,
            confidence_after: bayes.confidence,
        }
    }

    /// Merge a group of supported hypotheses into one combined child via
    /// the oracle. Returns `None` when the oracle cannot produce a usable
    /// combined statement; the caller keeps the group as-is.
    pub async fn merge(&self, group: &[&Hypothesis]) -> Option<Hypothesis> {
        if group.len() < 2 {
            return None;
        }
        let mut prompt = String::from(
            "These supported hypotheses describe the same effect and are \
             directionally compatible. Combine them into one statement. \
             Answer as JSON: {\"statement\": \"...\", \"rationale\": \"...\"}\n\n",
        );
        for hypothesis in group {
            prompt.push_str(&format!("  - {}\n", hypothesis.statement));
        }
        let completion = self.oracle.merge(&prompt).await?;
        Hypothesis::merged_from(group, completion.statement, &completion.rationale).ok()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use sagan_core::{new_entity_id, OracleError, OracleRetryConfig};
    use sagan_oracle::{GenerationOracle, OracleRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Oracle that always answers with a fixed completion and counts calls.
    struct FixedOracle {
        completion: String,
        calls: AtomicUsize,
    }

    impl FixedOracle {
        fn new(completion: &str) -> Arc<Self> {
            Arc::new(Self {
                completion: completion.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationOracle for FixedOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.completion.clone())
        }
    }

    fn refiner_with(oracle: Arc<FixedOracle>) -> Refiner {
        Refiner::new(
            RefinerConfig::default(),
            OracleClient::new(oracle, OracleRetryConfig::default()),
        )
    }

    fn result(p: f64, effect: f64, supports: bool) -> ExperimentResult {
        ExperimentResult::new(new_entity_id(), new_entity_id())
            .with_statistics(p, effect, 100)
            .with_support(supports)
    }

    fn refs(results: &[ExperimentResult]) -> Vec<&ExperimentResult> {
        results.iter().collect()
    }

    #[tokio::test]
    async fn test_rule_tier_short_circuits_other_tiers() {
        // The oracle would say continue; the rule tier must win without
        // the oracle ever being consulted.
        let oracle = FixedOracle::new(r#"{"decision": "continue"}"#);
        let refiner = refiner_with(oracle.clone());
        let hypothesis = Hypothesis::new("caffeine improves recall", "pharmacology");
        let results = vec![
            result(0.4, 0.1, false),
            result(0.5, 0.2, false),
            result(0.6, 0.1, false),
        ];

        let decision = refiner
            .decide(&hypothesis, &refs(&results), &refs(&results))
            .await;
        assert!(matches!(decision.verdict, Verdict::Retire { .. }));
        assert_eq!(decision.source, DecisionSource::Rule);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rule_tier_counts_trailing_failures_only() {
        let results = vec![
            result(0.01, 0.8, true),
            result(0.4, 0.1, false),
            result(0.5, 0.2, false),
        ];
        assert_eq!(trailing_failures(&refs(&results)), 2);
        assert!(rule_tier(&refs(&results), 3).is_none());
    }

    #[test]
    fn test_single_supporting_update_strictly_increases() {
        let config = RefinerConfig::default();
        let r = result(0.01, 0.8, true);
        let updated = update_confidence(0.5, &r, config.learning_rate);
        assert!(updated > 0.5);
        // evidence = 0.99 * 0.8 = 0.792; delta = 0.5 * 0.792 * 0.3
        assert!((updated - (0.5 + 0.5 * 0.792 * 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_three_supporting_results_stay_below_one() {
        let config = RefinerConfig::default();
        let mut confidence = 0.5;
        for _ in 0..3 {
            let next = update_confidence(confidence, &result(0.01, 0.8, true), config.learning_rate);
            assert!(next > confidence);
            assert!(next < 1.0);
            confidence = next;
        }
    }

    #[test]
    fn test_bayesian_tier_retires_at_low_confidence() {
        let config = RefinerConfig::default();
        let results: Vec<ExperimentResult> =
            (0..8).map(|_| result(0.01, 1.0, false)).collect();
        let outcome = bayesian_tier(0.5, &refs(&results), &config);
        assert!(outcome.confidence < config.retire_threshold);
        assert!(matches!(outcome.verdict, Some(Verdict::Retire { .. })));
    }

    #[test]
    fn test_bayesian_tier_continues_when_high_and_stable() {
        let config = RefinerConfig::default();
        // Strong supporting evidence pushes confidence above the continue
        // threshold; weak follow-ups keep it there with a tight spread.
        let results = vec![
            result(0.001, 1.0, true),
            result(0.001, 1.0, true),
            result(0.001, 1.0, true),
            result(0.5, 0.01, true),
            result(0.5, 0.01, true),
        ];
        let outcome = bayesian_tier(0.8, &refs(&results), &config);
        assert!(outcome.confidence >= config.continue_threshold);
        assert_eq!(outcome.verdict, Some(Verdict::Continue));
    }

    #[test]
    fn test_bayesian_tier_defers_on_single_result() {
        let config = RefinerConfig::default();
        // One strong supporting result: high but not "stable across >= 2".
        let results = vec![result(0.001, 1.0, true)];
        let outcome = bayesian_tier(0.9, &refs(&results), &config);
        assert!(outcome.verdict.is_none() || outcome.trajectory.len() >= 2);
    }

    #[tokio::test]
    async fn test_ambiguous_trend_defers_to_oracle() {
        let oracle = FixedOracle::new(
            r#"{"decision": "refine", "statement": "caffeine improves recall at low doses", "rationale": "dose effect", "supersede": true}"#,
        );
        let refiner = refiner_with(oracle.clone());
        let hypothesis = Hypothesis::new("caffeine improves recall", "pharmacology");
        // Mixed evidence: no trailing failure run, confidence mid-range.
        let results = vec![result(0.04, 0.4, true), result(0.3, 0.3, false)];

        let decision = refiner
            .decide(&hypothesis, &refs(&results), &refs(&results))
            .await;
        assert_eq!(decision.source, DecisionSource::Oracle);
        match decision.verdict {
            Verdict::Refine {
                statement,
                supersede,
                ..
            } => {
                assert_eq!(statement, "caffeine improves recall at low doses");
                assert!(supersede);
            }
            other => panic!("expected refine, got {other:?}"),
        }
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparsable_oracle_falls_back_to_continue() {
        let oracle = FixedOracle::new("the hypothesis seems promising");
        let refiner = refiner_with(oracle);
        let hypothesis = Hypothesis::new("caffeine improves recall", "pharmacology");
        let results = vec![result(0.04, 0.4, true), result(0.3, 0.3, false)];

        let decision = refiner
            .decide(&hypothesis, &refs(&results), &refs(&results))
            .await;
        assert_eq!(decision.verdict, Verdict::Continue);
        assert_eq!(decision.source, DecisionSource::OracleFallback);
    }

    #[tokio::test]
    async fn test_merge_builds_combined_hypothesis() {
        let oracle = FixedOracle::new(
            r#"{"statement": "caffeine improves memory performance", "rationale": "overlapping claims"}"#,
        );
        let refiner = refiner_with(oracle);
        let a = Hypothesis::new("caffeine improves recall", "pharmacology");
        let b = Hypothesis::new("caffeine improves recognition memory", "pharmacology");

        let merged = refiner.merge(&[&a, &b]).await.unwrap();
        assert_eq!(merged.statement, "caffeine improves memory performance");
        assert_eq!(merged.lineage, vec![a.hypothesis_id, b.hypothesis_id]);
        assert!(merged.generation > a.generation);
    }

    proptest! {
        /// Confidence is monotonically non-increasing across purely
        /// non-supporting results.
        #[test]
        fn prop_non_supporting_runs_never_raise_confidence(
            prior in 0.0f64..=1.0,
            stats in prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.5), 1..12),
        ) {
            let mut confidence = prior;
            for (p, effect) in stats {
                let next = update_confidence(confidence, &result(p, effect, false), 0.3);
                prop_assert!(next <= confidence + 1e-12);
                confidence = next;
            }
        }

        /// Confidence is monotonically non-decreasing across purely
        /// supporting results, and never leaves [0, 1].
        #[test]
        fn prop_supporting_runs_never_lower_confidence(
            prior in 0.0f64..=1.0,
            stats in prop::collection::vec((0.0f64..=1.0, 0.0f64..=1.5), 1..12),
        ) {
            let mut confidence = prior;
            for (p, effect) in stats {
                let next = update_confidence(confidence, &result(p, effect, true), 0.3);
                prop_assert!(next >= confidence - 1e-12);
                prop_assert!((0.0..=1.0).contains(&next));
                confidence = next;
            }
        }
    }
}
