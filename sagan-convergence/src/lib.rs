//! SAGAN Convergence - Stop-Condition Detection
//!
//! Computes multi-metric progress indicators per evaluation and decides
//! whether the run should stop. Mandatory criteria (iteration limit,
//! hypothesis exhaustion) are checked first and short-circuit; optional
//! criteria (novelty decline, cost per discovery) only produce a
//! suggestion the director may override. Every stop decision carries a
//! full report with next-step suggestions keyed on the criterion that
//! fired.

use chrono::Utc;
use once_cell::sync::Lazy;
use sagan_core::{ConvergenceConfig, ResearchPlan, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{debug, info};

// ============================================================================
// METRICS
// ============================================================================

/// Snapshot of all progress indicators at one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMetrics {
    /// Significant results / total results
    pub discovery_rate: f64,
    /// Most recent novelty measurement
    pub novelty_score: f64,
    /// Trailing novelty measurements, oldest first
    pub novelty_trend: Vec<f64>,
    /// Whether the trailing novelty window is strictly declining
    pub novelty_declining: bool,
    /// Tested hypotheses / (tested + queued + untested)
    pub saturation_ratio: f64,
    /// Supported results / total results (replication-rate proxy)
    pub consistency_score: f64,
    /// Estimated experiments spent per significant discovery
    pub cost_per_discovery: f64,
    /// When this snapshot was computed
    pub computed_at: Timestamp,
}

// ============================================================================
// CRITERIA
// ============================================================================

/// A named condition that can end a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriterionKind {
    /// The iteration counter reached the limit (mandatory)
    IterationLimit,
    /// No untested hypotheses remain and the queue is empty (mandatory)
    HypothesisExhaustion,
    /// Novelty stayed below the floor across the whole window (optional)
    NoveltyDecline,
    /// Cost per new discovery exceeded the budget ratio (optional)
    CostBudget,
}

impl CriterionKind {
    /// Mandatory criteria force a stop; optional ones only suggest it.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            CriterionKind::IterationLimit | CriterionKind::HypothesisExhaustion
        )
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CriterionKind::IterationLimit => "iteration-limit",
            CriterionKind::HypothesisExhaustion => "hypothesis-exhaustion",
            CriterionKind::NoveltyDecline => "novelty-decline",
            CriterionKind::CostBudget => "cost-budget",
        };
        write!(f, "{}", s)
    }
}

/// Next-step suggestions, keyed on the criterion that fired.
static SUGGESTIONS: Lazy<HashMap<CriterionKind, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        (
            CriterionKind::IterationLimit,
            vec![
                "raise the iteration limit and resume if results still trend upward",
                "narrow the research question to spend iterations on the strongest thread",
            ],
        ),
        (
            CriterionKind::HypothesisExhaustion,
            vec![
                "broaden the hypothesis space with a fresh generation request",
                "revisit retired hypotheses' evolution history for unexplored angles",
            ],
        ),
        (
            CriterionKind::NoveltyDecline,
            vec![
                "consider stopping, or pivoting to an adjacent domain",
                "replicate the strongest supported findings before closing out",
            ],
        ),
        (
            CriterionKind::CostBudget,
            vec![
                "stop and consolidate; discoveries are no longer paying for themselves",
                "switch design strategy toward cheaper replication experiments",
            ],
        ),
    ])
});

/// Look up the fixed next-step suggestions for a criterion.
pub fn suggestions_for(criterion: CriterionKind) -> Vec<String> {
    SUGGESTIONS
        .get(&criterion)
        .map(|s| s.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}

// ============================================================================
// REPORT
// ============================================================================

/// Structured record of a stop decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    /// The research question
    pub question: String,
    /// Iterations completed
    pub iterations: u32,
    /// Total hypotheses, active and retired
    pub hypothesis_count: usize,
    /// Total analyzed results
    pub result_count: usize,
    /// Final metric snapshot
    pub metrics: ConvergenceMetrics,
    /// The criterion that triggered the decision
    pub criterion: CriterionKind,
    /// Confidence in the stop decision, in [0, 1]
    pub confidence: f64,
    /// Fixed next-step suggestions for this criterion
    pub suggestions: Vec<String>,
}

impl fmt::Display for ConvergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Research run converged: {}", self.question)?;
        writeln!(
            f,
            "  criterion: {} ({}, confidence {:.2})",
            self.criterion,
            if self.criterion.is_mandatory() {
                "mandatory"
            } else {
                "suggested"
            },
            self.confidence
        )?;
        writeln!(
            f,
            "  iterations: {}, hypotheses: {}, results: {}",
            self.iterations, self.hypothesis_count, self.result_count
        )?;
        writeln!(
            f,
            "  discovery rate {:.2}, novelty {:.2}, saturation {:.2}, consistency {:.2}",
            self.metrics.discovery_rate,
            self.metrics.novelty_score,
            self.metrics.saturation_ratio,
            self.metrics.consistency_score
        )?;
        writeln!(f, "  next steps:")?;
        for suggestion in &self.suggestions {
            writeln!(f, "    - {}", suggestion)?;
        }
        Ok(())
    }
}

/// Outcome of one convergence evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConvergenceSignal {
    /// Keep going
    Proceed(ConvergenceMetrics),
    /// A mandatory criterion fired; the run must stop
    MandatoryStop(ConvergenceReport),
    /// An optional criterion fired; the director may override
    SuggestedStop(ConvergenceReport),
}

impl ConvergenceSignal {
    /// The report, if this signal carries one.
    pub fn report(&self) -> Option<&ConvergenceReport> {
        match self {
            ConvergenceSignal::Proceed(_) => None,
            ConvergenceSignal::MandatoryStop(report)
            | ConvergenceSignal::SuggestedStop(report) => Some(report),
        }
    }
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Multi-metric convergence detector.
///
/// Holds the short trailing novelty history between evaluations; metric
/// snapshots themselves are recomputed each call and not persisted.
#[derive(Debug, Clone)]
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    novelty_history: VecDeque<f64>,
}

impl ConvergenceDetector {
    /// Create a detector.
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            novelty_history: VecDeque::new(),
        }
    }

    /// Record a novelty measurement from a freshly analyzed result.
    pub fn observe_novelty(&mut self, novelty: f64) {
        self.novelty_history.push_back(novelty.clamp(0.0, 1.0));
        while self.novelty_history.len() > self.config.novelty_window {
            self.novelty_history.pop_front();
        }
    }

    /// Compute the current metric snapshot for a plan.
    pub fn metrics(&self, plan: &ResearchPlan) -> ConvergenceMetrics {
        let total = plan.results.len();
        let significant = plan
            .results
            .iter()
            .filter(|r| r.is_significant(self.config.alpha))
            .count();
        let supported = plan.results.iter().filter(|r| r.supports).count();

        let tested = plan.tested_count();
        let untested = plan.untested_hypotheses().len();
        let queued = plan.experiment_queue.len();
        let pool = tested + queued + untested;

        let trend: Vec<f64> = self.novelty_history.iter().copied().collect();
        let declining = trend.len() >= self.config.novelty_window
            && trend.windows(2).all(|w| w[1] < w[0]);

        ConvergenceMetrics {
            discovery_rate: ratio(significant, total),
            novelty_score: trend.last().copied().unwrap_or(0.0),
            novelty_trend: trend,
            novelty_declining: declining,
            saturation_ratio: ratio(tested, pool),
            consistency_score: ratio(supported, total),
            cost_per_discovery: if total == 0 {
                0.0
            } else {
                total as f64 / significant.max(1) as f64
            },
            computed_at: Utc::now(),
        }
    }

    /// Evaluate the stop conditions for a plan.
    ///
    /// Mandatory criteria are checked first and short-circuit; optional
    /// criteria produce a suggestion, not a forced stop.
    pub fn evaluate(&self, plan: &ResearchPlan) -> ConvergenceSignal {
        let metrics = self.metrics(plan);

        if plan.at_iteration_limit() {
            info!(iteration = plan.iteration, "mandatory stop: iteration limit");
            return ConvergenceSignal::MandatoryStop(self.report(
                plan,
                metrics,
                CriterionKind::IterationLimit,
                1.0,
            ));
        }

        if plan.is_exhausted() {
            info!("mandatory stop: hypothesis space exhausted");
            return ConvergenceSignal::MandatoryStop(self.report(
                plan,
                metrics,
                CriterionKind::HypothesisExhaustion,
                1.0,
            ));
        }

        let window_full = metrics.novelty_trend.len() >= self.config.novelty_window;
        if window_full
            && metrics
                .novelty_trend
                .iter()
                .all(|n| *n < self.config.novelty_floor)
        {
            let confidence = if metrics.novelty_declining { 0.8 } else { 0.7 };
            debug!(novelty = metrics.novelty_score, "suggested stop: novelty decline");
            return ConvergenceSignal::SuggestedStop(self.report(
                plan,
                metrics,
                CriterionKind::NoveltyDecline,
                confidence,
            ));
        }

        if !plan.results.is_empty()
            && metrics.cost_per_discovery > self.config.cost_budget_ratio
        {
            debug!(
                cost = metrics.cost_per_discovery,
                "suggested stop: cost per discovery over budget"
            );
            return ConvergenceSignal::SuggestedStop(self.report(
                plan,
                metrics,
                CriterionKind::CostBudget,
                0.6,
            ));
        }

        ConvergenceSignal::Proceed(metrics)
    }

    fn report(
        &self,
        plan: &ResearchPlan,
        metrics: ConvergenceMetrics,
        criterion: CriterionKind,
        confidence: f64,
    ) -> ConvergenceReport {
        ConvergenceReport {
            question: plan.question.clone(),
            iterations: plan.iteration,
            hypothesis_count: plan.hypotheses.len(),
            result_count: plan.results.len(),
            metrics,
            criterion,
            confidence,
            suggestions: suggestions_for(criterion),
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

// =============================================================================
// TESTS
// =============================================================================
