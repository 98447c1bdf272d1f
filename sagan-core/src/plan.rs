//! The research plan: the single mutable aggregate a run revolves around.

use crate::enums::{HypothesisStatus, WorkflowState};
use crate::experiment::{ExperimentProtocol, ExperimentResult, RawOutcome};
use crate::hypothesis::Hypothesis;
use crate::{ExperimentId, HypothesisId, PlanId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Mutable state of one research run.
///
/// Exclusively owned by the director and mutated only under its lock;
/// other components receive the data they need by value or reference per
/// call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// Unique identifier for this plan
    pub plan_id: PlanId,
    /// The research question driving the run
    pub question: String,
    /// Completed loop iterations
    pub iteration: u32,
    /// Hard iteration limit; the counter never exceeds it while active
    pub iteration_limit: u32,
    /// All hypotheses by id, active and retired
    pub hypotheses: HashMap<HypothesisId, Hypothesis>,
    /// Designed experiments waiting for execution, in design order
    pub experiment_queue: VecDeque<ExperimentProtocol>,
    /// Every accepted protocol by id, queued or already executed
    pub protocols: HashMap<ExperimentId, ExperimentProtocol>,
    /// Raw outcomes waiting for analysis
    pub pending_analysis: Vec<RawOutcome>,
    /// Analyzed results, in completion order
    pub results: Vec<ExperimentResult>,
    /// Number of results the refiner has already consumed
    pub refined_watermark: usize,
    /// Snapshot of the workflow state at last director update
    pub workflow_state: WorkflowState,
    /// When this plan was created
    pub created_at: Timestamp,
    /// When this plan was last updated
    pub updated_at: Timestamp,
}

impl ResearchPlan {
    /// Create a new plan for a question.
    pub fn new(question: impl Into<String>, iteration_limit: u32) -> Self {
        let now = Utc::now();
        Self {
            plan_id: Uuid::now_v7(),
            question: question.into(),
            iteration: 0,
            iteration_limit,
            hypotheses: HashMap::new(),
            experiment_queue: VecDeque::new(),
            protocols: HashMap::new(),
            pending_analysis: Vec::new(),
            results: Vec::new(),
            refined_watermark: 0,
            workflow_state: WorkflowState::Initializing,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the iteration counter. Returns false (and leaves the
    /// counter unchanged) once the limit is reached.
    pub fn advance_iteration(&mut self) -> bool {
        if self.iteration >= self.iteration_limit {
            return false;
        }
        self.iteration += 1;
        self.touch();
        true
    }

    /// Whether the iteration counter has reached the limit.
    pub fn at_iteration_limit(&self) -> bool {
        self.iteration >= self.iteration_limit
    }

    /// Insert a hypothesis.
    pub fn add_hypothesis(&mut self, hypothesis: Hypothesis) {
        self.hypotheses
            .insert(hypothesis.hypothesis_id, hypothesis);
        self.touch();
    }

    /// Get a hypothesis by id.
    pub fn hypothesis(&self, id: &HypothesisId) -> Option<&Hypothesis> {
        self.hypotheses.get(id)
    }

    /// Get a mutable hypothesis by id.
    pub fn hypothesis_mut(&mut self, id: &HypothesisId) -> Option<&mut Hypothesis> {
        self.touch();
        self.hypotheses.get_mut(id)
    }

    /// All non-retired hypotheses.
    pub fn active_hypotheses(&self) -> Vec<&Hypothesis> {
        let mut active: Vec<_> = self
            .hypotheses
            .values()
            .filter(|h| h.status.is_active())
            .collect();
        active.sort_by_key(|h| h.hypothesis_id);
        active
    }

    /// Hypotheses that have never been tested.
    pub fn untested_hypotheses(&self) -> Vec<&Hypothesis> {
        let mut untested: Vec<_> = self
            .hypotheses
            .values()
            .filter(|h| h.status == HypothesisStatus::Untested)
            .collect();
        untested.sort_by_key(|h| h.hypothesis_id);
        untested
    }

    /// Count of hypotheses that have at least one result.
    pub fn tested_count(&self) -> usize {
        self.hypotheses
            .values()
            .filter(|h| {
                self.results
                    .iter()
                    .any(|r| r.hypothesis_id == h.hypothesis_id)
            })
            .count()
    }

    /// Queue a designed experiment for execution. The protocol stays
    /// retrievable by id after it has been dequeued and executed.
    pub fn enqueue_experiment(&mut self, protocol: ExperimentProtocol) {
        self.protocols
            .insert(protocol.experiment_id, protocol.clone());
        self.experiment_queue.push_back(protocol);
        self.touch();
    }

    /// Look up an accepted protocol by id.
    pub fn protocol(&self, id: &ExperimentId) -> Option<&ExperimentProtocol> {
        self.protocols.get(id)
    }

    /// Pop the next experiment to execute.
    pub fn dequeue_experiment(&mut self) -> Option<ExperimentProtocol> {
        let protocol = self.experiment_queue.pop_front();
        if protocol.is_some() {
            self.touch();
        }
        protocol
    }

    /// Record a raw outcome awaiting analysis.
    pub fn record_outcome(&mut self, outcome: RawOutcome) {
        self.pending_analysis.push(outcome);
        self.touch();
    }

    /// Drain the raw outcomes awaiting analysis.
    pub fn take_pending_outcomes(&mut self) -> Vec<RawOutcome> {
        self.touch();
        std::mem::take(&mut self.pending_analysis)
    }

    /// Record an analyzed result.
    pub fn record_result(&mut self, result: ExperimentResult) {
        self.results.push(result);
        self.touch();
    }

    /// Results the refiner has not yet consumed, grouped by hypothesis.
    pub fn unrefined_results(&self) -> HashMap<HypothesisId, Vec<&ExperimentResult>> {
        let mut grouped: HashMap<HypothesisId, Vec<&ExperimentResult>> = HashMap::new();
        for result in &self.results[self.refined_watermark..] {
            grouped
                .entry(result.hypothesis_id)
                .or_default()
                .push(result);
        }
        grouped
    }

    /// Mark every recorded result as consumed by the refiner.
    pub fn mark_refined(&mut self) {
        self.refined_watermark = self.results.len();
        self.touch();
    }

    /// All results for one hypothesis, in completion order.
    pub fn results_for(&self, id: &HypothesisId) -> Vec<&ExperimentResult> {
        self.results
            .iter()
            .filter(|r| r.hypothesis_id == *id)
            .collect()
    }

    /// Whether the hypothesis space is exhausted: nothing untested and
    /// nothing queued.
    pub fn is_exhausted(&self) -> bool {
        self.untested_hypotheses().is_empty()
            && self.experiment_queue.is_empty()
            && self.pending_analysis.is_empty()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentProtocol;

    fn plan_with_hypothesis() -> (ResearchPlan, HypothesisId) {
        let mut plan = ResearchPlan::new("does caffeine improve recall?", 5);
        let h = Hypothesis::new("caffeine improves recall", "pharmacology");
        let id = h.hypothesis_id;
        plan.add_hypothesis(h);
        (plan, id)
    }

    #[test]
    fn test_iteration_counter_never_exceeds_limit() {
        let mut plan = ResearchPlan::new("q", 2);
        assert!(plan.advance_iteration());
        assert!(plan.advance_iteration());
        assert!(!plan.advance_iteration());
        assert_eq!(plan.iteration, 2);
        assert!(plan.at_iteration_limit());
    }

    #[test]
    fn test_untested_then_tested_counts() {
        let (mut plan, id) = plan_with_hypothesis();
        assert_eq!(plan.untested_hypotheses().len(), 1);
        assert_eq!(plan.tested_count(), 0);

        let protocol = ExperimentProtocol::new(id, "p", "m");
        let result = ExperimentResult::new(protocol.experiment_id, id);
        plan.record_result(result);
        assert_eq!(plan.tested_count(), 1);
    }

    #[test]
    fn test_experiment_queue_fifo() {
        let (mut plan, id) = plan_with_hypothesis();
        let first = ExperimentProtocol::new(id, "first", "m");
        let second = ExperimentProtocol::new(id, "second", "m");
        let first_id = first.experiment_id;
        plan.enqueue_experiment(first);
        plan.enqueue_experiment(second);
        assert_eq!(plan.dequeue_experiment().unwrap().name, "first");
        assert_eq!(plan.dequeue_experiment().unwrap().name, "second");
        assert!(plan.dequeue_experiment().is_none());
        // Dequeued protocols stay retrievable by id.
        assert!(plan.protocol(&first_id).is_some());
    }

    #[test]
    fn test_unrefined_results_watermark() {
        let (mut plan, id) = plan_with_hypothesis();
        plan.record_result(ExperimentResult::new(Uuid::now_v7(), id));
        plan.record_result(ExperimentResult::new(Uuid::now_v7(), id));
        assert_eq!(plan.unrefined_results().get(&id).unwrap().len(), 2);

        plan.mark_refined();
        assert!(plan.unrefined_results().is_empty());

        plan.record_result(ExperimentResult::new(Uuid::now_v7(), id));
        assert_eq!(plan.unrefined_results().get(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_exhaustion_requires_empty_queue_and_no_untested() {
        let (mut plan, id) = plan_with_hypothesis();
        assert!(!plan.is_exhausted());

        plan.hypothesis_mut(&id)
            .unwrap()
            .set_status(HypothesisStatus::Testing)
            .unwrap();
        assert!(plan.is_exhausted());

        plan.enqueue_experiment(ExperimentProtocol::new(id, "p", "m"));
        assert!(!plan.is_exhausted());
    }
}
