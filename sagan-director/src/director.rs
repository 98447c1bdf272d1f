//! The director: SAGAN's top-level control loop.
//!
//! Drives the research run end to end. On each tick it inspects the
//! workflow state, the plan contents, and the latest convergence signal,
//! then selects exactly one action from the fixed action set via the
//! deterministic decision tree in [`crate::actions`].
//!
//! Shared-resource policy: the plan, the strategy table, and the workflow
//! machine each sit behind their own mutex; a lock is released before any
//! await point, and when more than one must be held briefly the
//! acquisition order is plan, then strategy stats, then workflow.

use crate::actions::{next_action, DirectorAction, LoopView};
use crate::messages::{RequestPayload, ResponseOutcome, ResponsePayload, WorkerRequest, WorkerResponse};
use crate::registry::PendingRequests;
use crate::report::{ReportSink, TracingSink};
use crate::strategy::StrategyStats;
use crate::worker::WorkerSet;
use futures_util::future::join_all;
use sagan_convergence::{ConvergenceDetector, ConvergenceReport, ConvergenceSignal};
use sagan_core::{
    DecisionSource, ExperimentProtocol, ExperimentResult, ExperimentSignature, Hypothesis,
    HypothesisStatus, MemoryCategory, MemoryEntry, RefinementAction, ResearchPlan, SaganConfig,
    SaganResult, WorkerError, WorkerKind, WorkflowError, WorkflowState,
};
use sagan_feedback::{FeedbackLoop, FeedbackSignal};
use sagan_memory::{MemoryStore, QueryFilter, RecordOutcome};
use sagan_oracle::{GenerationOracle, OracleClient};
use sagan_refiner::{find_contradictions, merge_groups, Refiner, RefinerDecision, Verdict};
use sagan_workflow::WorkflowMachine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How many hypotheses one generation request asks for.
const GENERATION_COUNT: usize = 3;

/// How many dead-end and failure-pattern entries worker prompts carry.
const MEMORY_HINT_LIMIT: usize = 5;

/// How a finished run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run converged; the report says why
    Converged(ConvergenceReport),
    /// An optional criterion suggested stopping and the configuration
    /// requires confirmation; the run is paused with the plan intact
    AwaitingConfirmation(ConvergenceReport),
    /// An external stop signal paused the run with the plan intact
    Paused,
}

/// The orchestrator for one research run.
pub struct Director {
    config: SaganConfig,
    plan: Mutex<ResearchPlan>,
    strategy: Mutex<StrategyStats>,
    workflow: Mutex<WorkflowMachine>,
    memory: Mutex<MemoryStore>,
    feedback: Mutex<FeedbackLoop>,
    detector: Mutex<ConvergenceDetector>,
    refiner: Refiner,
    workers: WorkerSet,
    pending: Mutex<PendingRequests>,
    failures: Mutex<HashMap<WorkerKind, u32>>,
    force_evaluate: AtomicBool,
    stop_rx: watch::Receiver<bool>,
    sinks: Vec<Box<dyn ReportSink>>,
}

impl Director {
    /// Create a director for a plan.
    pub fn new(
        plan: ResearchPlan,
        config: SaganConfig,
        workers: WorkerSet,
        oracle: Arc<dyn GenerationOracle>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let refiner = Refiner::new(
            config.refiner.clone(),
            OracleClient::new(oracle, config.oracle_retry.clone()),
        );
        Self {
            memory: Mutex::new(MemoryStore::new(config.memory.clone())),
            feedback: Mutex::new(FeedbackLoop::new(config.refiner.alpha)),
            detector: Mutex::new(ConvergenceDetector::new(config.convergence.clone())),
            refiner,
            workers,
            plan: Mutex::new(plan),
            strategy: Mutex::new(StrategyStats::new()),
            workflow: Mutex::new(WorkflowMachine::new()),
            pending: Mutex::new(PendingRequests::new()),
            failures: Mutex::new(HashMap::new()),
            force_evaluate: AtomicBool::new(false),
            stop_rx,
            sinks: vec![Box::new(TracingSink)],
            config,
        }
    }

    /// Create a stop channel for external cancellation. Send `true` to
    /// request a stop.
    pub fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    /// Add a report sink.
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Clone of the current plan, for inspection.
    pub fn plan_snapshot(&self) -> ResearchPlan {
        self.plan.lock().unwrap().clone()
    }

    /// The current workflow state.
    pub fn workflow_state(&self) -> WorkflowState {
        self.workflow.lock().unwrap().current()
    }

    /// Bulk export of the memory store.
    pub fn memory_export(&self) -> Vec<MemoryEntry> {
        self.memory.lock().unwrap().export()
    }

    /// Bulk import into the memory store, replacing current contents.
    pub fn memory_import(&self, entries: Vec<MemoryEntry>) -> SaganResult<usize> {
        Ok(self.memory.lock().unwrap().import(entries)?)
    }

    /// Clone of the strategy-effectiveness table.
    pub fn strategy_snapshot(&self) -> StrategyStats {
        self.strategy.lock().unwrap().clone()
    }

    /// Drive the loop until convergence, pause, or escalated error.
    pub async fn run(&self) -> SaganResult<RunOutcome> {
        {
            let plan = self.plan.lock().unwrap();
            info!(
                plan = %plan.plan_id,
                question = %plan.question,
                iteration_limit = plan.iteration_limit,
                "starting research run"
            );
        }

        loop {
            // The stop signal is polled at the top of every tick; each
            // dispatch below also re-checks after its awaits resolve.
            if self.stop_requested() && !self.workflow.lock().unwrap().is_terminal() {
                return self.pause();
            }

            let view = self.view();
            let action = next_action(&view);
            debug!(
                ?action,
                state = %view.state,
                untested = view.untested,
                queued = view.queued,
                pending = view.pending_analysis,
                unrefined = view.unrefined,
                "director tick"
            );

            match action {
                DirectorAction::Halt => {
                    return match view.state {
                        WorkflowState::Paused => Ok(RunOutcome::Paused),
                        state => Err(WorkflowError::Terminal { state }.into()),
                    };
                }
                DirectorAction::RequestHypotheses => self.do_generate().await?,
                DirectorAction::RequestExperimentDesign => self.do_design().await?,
                DirectorAction::RequestExecution => self.do_execute().await?,
                DirectorAction::RequestAnalysis => self.do_analyze().await?,
                DirectorAction::InvokeRefiner => self.do_refine().await?,
                DirectorAction::EvaluateConvergence => {
                    if let Some(outcome) = self.do_evaluate()? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick plumbing
    // ------------------------------------------------------------------

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    fn pause(&self) -> SaganResult<RunOutcome> {
        info!("stop signal received, pausing run with plan intact");
        self.set_state(WorkflowState::Paused)?;
        Ok(RunOutcome::Paused)
    }

    fn view(&self) -> LoopView {
        let plan = self.plan.lock().unwrap();
        let workflow = self.workflow.lock().unwrap();
        LoopView {
            state: workflow.current(),
            untested: plan.untested_hypotheses().len(),
            queued: plan.experiment_queue.len(),
            pending_analysis: plan.pending_analysis.len(),
            unrefined: plan.results.len() - plan.refined_watermark,
            at_iteration_limit: plan.at_iteration_limit(),
            force_evaluate: self.force_evaluate.load(Ordering::Relaxed),
        }
    }

    /// Move the workflow machine to `to` (no-op when already there) and
    /// refresh the plan's state snapshot. Lock order: plan, workflow.
    fn set_state(&self, to: WorkflowState) -> SaganResult<()> {
        let mut plan = self.plan.lock().unwrap();
        let mut workflow = self.workflow.lock().unwrap();
        if workflow.current() != to {
            workflow.transition(to)?;
        }
        plan.workflow_state = workflow.current();
        Ok(())
    }

    fn reset_failures(&self, kind: WorkerKind) {
        self.failures.lock().unwrap().remove(&kind);
    }

    /// Record a worker failure as a failure pattern and escalate to the
    /// Error state after enough consecutive failures of one kind.
    fn handle_worker_failure(&self, kind: WorkerKind, reason: &str) -> SaganResult<()> {
        warn!(%kind, reason, "worker request failed");
        {
            let mut memory = self.memory.lock().unwrap();
            memory.record(
                MemoryEntry::new(
                    MemoryCategory::FailurePattern,
                    format!("{kind} failure: {reason}"),
                )
                .with_tags(vec![kind.to_string()]),
            );
        }

        let count = {
            let mut failures = self.failures.lock().unwrap();
            let count = failures.entry(kind).or_insert(0);
            *count += 1;
            *count
        };

        if count >= self.config.workers.consecutive_error_limit {
            warn!(%kind, count, "consecutive failure limit reached, escalating to Error");
            self.set_state(WorkflowState::Error)?;
            return Err(WorkerError::ConsecutiveFailures { kind, count }.into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hypothesis generation
    // ------------------------------------------------------------------

    async fn do_generate(&self) -> SaganResult<()> {
        self.set_state(WorkflowState::GeneratingHypotheses)?;

        let dead_ends: Vec<String> = {
            let mut memory = self.memory.lock().unwrap();
            memory
                .query(
                    &QueryFilter::category(MemoryCategory::DeadEnd).with_limit(MEMORY_HINT_LIMIT),
                )
                .into_iter()
                .map(|e| e.content)
                .collect()
        };
        let payload = {
            let plan = self.plan.lock().unwrap();
            RequestPayload::GenerateHypotheses {
                question: plan.question.clone(),
                existing: plan.hypotheses.values().map(|h| h.statement.clone()).collect(),
                dead_ends,
                count: GENERATION_COUNT,
            }
        };

        let request = WorkerRequest::new(payload);
        self.pending.lock().unwrap().insert(&request);
        let worker = self.workers.worker(WorkerKind::HypothesisGenerator)?;
        let response = worker.handle(request).await;
        self.absorb_generation(response)
    }

    fn absorb_generation(&self, response: WorkerResponse) -> SaganResult<()> {
        self.pending.lock().unwrap().settle(&response.correlation_id);
        match response.outcome {
            ResponseOutcome::Failure { reason } => {
                self.handle_worker_failure(WorkerKind::HypothesisGenerator, &reason)
            }
            ResponseOutcome::Success(ResponsePayload::Hypotheses(hypotheses)) => {
                self.reset_failures(WorkerKind::HypothesisGenerator);
                if hypotheses.is_empty() {
                    info!("generator produced no new hypotheses, forcing convergence check");
                    self.force_evaluate.store(true, Ordering::Relaxed);
                    return Ok(());
                }
                let mut plan = self.plan.lock().unwrap();
                for mut hypothesis in hypotheses {
                    let flags = find_contradictions(
                        &hypothesis,
                        &plan.active_hypotheses(),
                        self.config.refiner.similarity_threshold,
                    );
                    for flag in &flags {
                        warn!(
                            a = %flag.hypothesis_a,
                            b = %flag.hypothesis_b,
                            similarity = flag.similarity,
                            "contradictory hypotheses flagged for re-evaluation"
                        );
                        if let Some(other) = plan.hypothesis_mut(&flag.hypothesis_b) {
                            other.record(
                                RefinementAction::FlaggedForReview,
                                flag.reason.clone(),
                            );
                        }
                        hypothesis
                            .record(RefinementAction::FlaggedForReview, flag.reason.clone());
                    }
                    plan.add_hypothesis(hypothesis);
                }
                Ok(())
            }
            ResponseOutcome::Success(_) => self.handle_worker_failure(
                WorkerKind::HypothesisGenerator,
                "unexpected response payload",
            ),
        }
    }

    // ------------------------------------------------------------------
    // Experiment design
    // ------------------------------------------------------------------

    async fn do_design(&self) -> SaganResult<()> {
        self.set_state(WorkflowState::DesigningExperiments)?;

        let limit = self.workers.limit(WorkerKind::ExperimentDesigner);
        let hypotheses: Vec<Hypothesis> = {
            let plan = self.plan.lock().unwrap();
            plan.untested_hypotheses()
                .into_iter()
                .take(limit)
                .cloned()
                .collect()
        };
        if hypotheses.is_empty() {
            return Ok(());
        }

        let strategy_hint = self.strategy.lock().unwrap().best_strategy();
        let known_failures: Vec<String> = {
            let mut memory = self.memory.lock().unwrap();
            memory
                .query(
                    &QueryFilter::category(MemoryCategory::FailurePattern)
                        .with_limit(MEMORY_HINT_LIMIT),
                )
                .into_iter()
                .map(|e| e.content)
                .collect()
        };

        let requests: Vec<WorkerRequest> = hypotheses
            .into_iter()
            .map(|hypothesis| {
                WorkerRequest::new(RequestPayload::DesignExperiment {
                    hypothesis,
                    strategy_hint: strategy_hint.clone(),
                    known_failures: known_failures.clone(),
                })
            })
            .collect();
        {
            let mut pending = self.pending.lock().unwrap();
            for request in &requests {
                pending.insert(request);
            }
        }

        let worker = self.workers.worker(WorkerKind::ExperimentDesigner)?;
        let responses = join_all(requests.into_iter().map(|request| {
            let worker = worker.clone();
            async move { worker.handle(request).await }
        }))
        .await;

        for response in responses {
            self.absorb_design(response)?;
        }
        Ok(())
    }

    fn absorb_design(&self, response: WorkerResponse) -> SaganResult<()> {
        self.pending.lock().unwrap().settle(&response.correlation_id);
        match response.outcome {
            ResponseOutcome::Failure { reason } => {
                self.handle_worker_failure(WorkerKind::ExperimentDesigner, &reason)
            }
            ResponseOutcome::Success(ResponsePayload::Design(protocol)) => {
                self.reset_failures(WorkerKind::ExperimentDesigner);
                self.accept_protocol(protocol)
            }
            ResponseOutcome::Success(_) => self
                .handle_worker_failure(WorkerKind::ExperimentDesigner, "unexpected response payload"),
        }
    }

    /// Validate a designed protocol against the plan and the memory
    /// store's dedup index, then queue it.
    fn accept_protocol(&self, protocol: ExperimentProtocol) -> SaganResult<()> {
        let statement = {
            let plan = self.plan.lock().unwrap();
            plan.hypothesis(&protocol.hypothesis_id)
                .filter(|h| h.status.is_active())
                .map(|h| h.statement.clone())
        };
        let Some(statement) = statement else {
            warn!(
                experiment = %protocol.experiment_id,
                hypothesis = %protocol.hypothesis_id,
                "designer returned a protocol for an unknown or retired hypothesis, dropping"
            );
            return Ok(());
        };

        let signature = ExperimentSignature::compute(&statement, &protocol);
        let entry = MemoryEntry::new(
            MemoryCategory::General,
            format!(
                "experiment {} [{}] for: {}",
                protocol.name, protocol.strategy, statement
            ),
        )
        .with_signature(signature)
        .with_tags(vec![protocol.strategy.clone()]);
        let outcome = self.memory.lock().unwrap().record(entry);

        let mut plan = self.plan.lock().unwrap();
        match outcome {
            RecordOutcome::Duplicate(_) => {
                // Informational, not an error: the pair was already tried.
                // The hypothesis leaves the untested pool so the designer
                // is not asked to repeat itself.
                info!(signature = %signature, "duplicate experiment skipped");
                if let Some(hypothesis) = plan.hypothesis_mut(&protocol.hypothesis_id) {
                    hypothesis.set_status(HypothesisStatus::Testing)?;
                }
            }
            RecordOutcome::NearDuplicate(_) => {
                info!(
                    signature = %signature,
                    "near-duplicate protocol (same hypothesis, new parameters), queued"
                );
                if let Some(hypothesis) = plan.hypothesis_mut(&protocol.hypothesis_id) {
                    hypothesis.set_status(HypothesisStatus::Testing)?;
                }
                plan.enqueue_experiment(protocol);
            }
            RecordOutcome::Stored(_) => {
                if let Some(hypothesis) = plan.hypothesis_mut(&protocol.hypothesis_id) {
                    hypothesis.set_status(HypothesisStatus::Testing)?;
                }
                plan.enqueue_experiment(protocol);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn do_execute(&self) -> SaganResult<()> {
        self.set_state(WorkflowState::Executing)?;

        let limit = self.workers.limit(WorkerKind::ExperimentExecutor);
        let protocols: Vec<ExperimentProtocol> = {
            let mut plan = self.plan.lock().unwrap();
            (0..limit).map_while(|_| plan.dequeue_experiment()).collect()
        };
        if protocols.is_empty() {
            return Ok(());
        }

        let requests: Vec<WorkerRequest> = protocols
            .into_iter()
            .map(|protocol| WorkerRequest::new(RequestPayload::ExecuteExperiment { protocol }))
            .collect();
        {
            let mut pending = self.pending.lock().unwrap();
            for request in &requests {
                pending.insert(request);
            }
        }

        let worker = self.workers.worker(WorkerKind::ExperimentExecutor)?;
        // Several executions are in flight at once; join_all returns them
        // in issue order, which is the order result processing needs.
        let responses = join_all(requests.into_iter().map(|request| {
            let worker = worker.clone();
            async move { worker.handle(request).await }
        }))
        .await;

        for response in responses {
            self.absorb_execution(response)?;
        }
        Ok(())
    }

    fn absorb_execution(&self, response: WorkerResponse) -> SaganResult<()> {
        self.pending.lock().unwrap().settle(&response.correlation_id);
        match response.outcome {
            ResponseOutcome::Failure { reason } => {
                self.handle_worker_failure(WorkerKind::ExperimentExecutor, &reason)
            }
            ResponseOutcome::Success(ResponsePayload::Execution(outcome)) => {
                self.reset_failures(WorkerKind::ExperimentExecutor);
                self.plan.lock().unwrap().record_outcome(outcome);
                Ok(())
            }
            ResponseOutcome::Success(_) => self
                .handle_worker_failure(WorkerKind::ExperimentExecutor, "unexpected response payload"),
        }
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    async fn do_analyze(&self) -> SaganResult<()> {
        self.set_state(WorkflowState::Analyzing)?;

        let mut remaining = {
            let mut plan = self.plan.lock().unwrap();
            plan.take_pending_outcomes()
        };
        if remaining.is_empty() {
            return Ok(());
        }

        let limit = self.workers.limit(WorkerKind::ResultAnalyzer);
        let alpha = self.config.refiner.alpha;
        let worker = self.workers.worker(WorkerKind::ResultAnalyzer)?;

        while !remaining.is_empty() {
            let take = remaining.len().min(limit);
            let chunk: Vec<_> = remaining.drain(..take).collect();
            let requests: Vec<WorkerRequest> = chunk
                .into_iter()
                .map(|outcome| {
                    WorkerRequest::new(RequestPayload::AnalyzeOutcome { outcome, alpha })
                })
                .collect();
            {
                let mut pending = self.pending.lock().unwrap();
                for request in &requests {
                    pending.insert(request);
                }
            }

            let responses = join_all(requests.into_iter().map(|request| {
                let worker = worker.clone();
                async move { worker.handle(request).await }
            }))
            .await;

            for response in responses {
                self.absorb_analysis(response)?;
            }

            // Polled on resumption from the await: put unprocessed
            // outcomes back so a pause loses nothing.
            if self.stop_requested() && !remaining.is_empty() {
                let mut plan = self.plan.lock().unwrap();
                for outcome in remaining.drain(..) {
                    plan.record_outcome(outcome);
                }
            }
        }
        Ok(())
    }

    fn absorb_analysis(&self, response: WorkerResponse) -> SaganResult<()> {
        self.pending.lock().unwrap().settle(&response.correlation_id);
        match response.outcome {
            ResponseOutcome::Failure { reason } => {
                self.handle_worker_failure(WorkerKind::ResultAnalyzer, &reason)
            }
            ResponseOutcome::Success(ResponsePayload::Analysis(result)) => {
                self.reset_failures(WorkerKind::ResultAnalyzer);
                self.absorb_result(result);
                Ok(())
            }
            ResponseOutcome::Success(_) => {
                self.handle_worker_failure(WorkerKind::ResultAnalyzer, "unexpected response payload")
            }
        }
    }

    /// Fold one analyzed result into the plan, the convergence history,
    /// the feedback loop, and the strategy table.
    fn absorb_result(&self, result: ExperimentResult) {
        let (hypothesis, strategy) = {
            let mut plan = self.plan.lock().unwrap();
            let strategy = plan
                .protocol(&result.experiment_id)
                .map(|p| p.strategy.clone())
                .unwrap_or_else(|| "exploratory".to_string());
            let hypothesis = plan.hypothesis(&result.hypothesis_id).cloned();
            plan.record_result(result.clone());
            (hypothesis, strategy)
        };

        self.detector.lock().unwrap().observe_novelty(result.novelty);

        let Some(hypothesis) = hypothesis else {
            warn!(
                result = %result.result_id,
                hypothesis = %result.hypothesis_id,
                "analyzer returned a result for an unknown hypothesis"
            );
            return;
        };

        let signals = self
            .feedback
            .lock()
            .unwrap()
            .process_result(&hypothesis, &strategy, &result);
        for signal in signals {
            match signal {
                FeedbackSignal::HypothesisUpdate {
                    hypothesis_id,
                    new_confidence,
                    ..
                } => {
                    let mut plan = self.plan.lock().unwrap();
                    if let Some(hypothesis) = plan.hypothesis_mut(&hypothesis_id) {
                        hypothesis.confidence = new_confidence;
                    }
                }
                FeedbackSignal::StrategyAdjustment { strategy, success } => {
                    self.strategy.lock().unwrap().observe(&strategy, success);
                }
                FeedbackSignal::SuccessPattern(pattern) => {
                    self.memory.lock().unwrap().record(
                        MemoryEntry::new(MemoryCategory::SuccessPattern, pattern.description)
                            .with_tags(vec![strategy.clone()]),
                    );
                }
                FeedbackSignal::FailurePattern(pattern) => {
                    self.memory.lock().unwrap().record(
                        MemoryEntry::new(MemoryCategory::FailurePattern, pattern.description)
                            .with_tags(vec![strategy.clone()]),
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Refinement
    // ------------------------------------------------------------------

    async fn do_refine(&self) -> SaganResult<()> {
        self.set_state(WorkflowState::Refining)?;

        // Snapshot the work under the plan lock, decide without it.
        let work: Vec<(Hypothesis, Vec<ExperimentResult>, Vec<ExperimentResult>)> = {
            let plan = self.plan.lock().unwrap();
            let mut work: Vec<_> = plan
                .unrefined_results()
                .into_iter()
                .filter_map(|(id, new_results)| {
                    let hypothesis = plan.hypothesis(&id)?;
                    if !hypothesis.status.is_active() {
                        return None;
                    }
                    let all: Vec<ExperimentResult> =
                        plan.results_for(&id).into_iter().cloned().collect();
                    let new: Vec<ExperimentResult> =
                        new_results.into_iter().cloned().collect();
                    Some((hypothesis.clone(), all, new))
                })
                .collect();
            work.sort_by_key(|(h, _, _)| h.hypothesis_id);
            work
        };

        let mut decisions = Vec::with_capacity(work.len());
        for (hypothesis, all, new) in &work {
            let all_refs: Vec<&ExperimentResult> = all.iter().collect();
            let new_refs: Vec<&ExperimentResult> = new.iter().collect();
            decisions.push(self.refiner.decide(hypothesis, &all_refs, &new_refs).await);
        }

        self.apply_decisions(decisions)?;
        {
            let mut plan = self.plan.lock().unwrap();
            plan.mark_refined();
        }

        self.merge_supported().await
    }

    fn apply_decisions(&self, decisions: Vec<RefinerDecision>) -> SaganResult<()> {
        let mut dead_ends: Vec<MemoryEntry> = Vec::new();
        {
            let mut plan = self.plan.lock().unwrap();
            for decision in decisions {
                debug!(
                    hypothesis = %decision.hypothesis_id,
                    verdict = ?decision.verdict,
                    source = %decision.source,
                    "applying refiner decision"
                );
                match decision.verdict {
                    Verdict::Continue => {
                        let Some(hypothesis) = plan.hypothesis_mut(&decision.hypothesis_id)
                        else {
                            continue;
                        };
                        hypothesis.confidence = decision.confidence_after;
                        let status = if decision.confidence_after
                            >= self.config.refiner.continue_threshold
                        {
                            HypothesisStatus::Supported
                        } else {
                            // Back into the pool for another round of
                            // experiments.
                            HypothesisStatus::Untested
                        };
                        hypothesis.set_status(status)?;
                    }
                    Verdict::Retire { rationale } => {
                        let Some(hypothesis) = plan.hypothesis_mut(&decision.hypothesis_id)
                        else {
                            continue;
                        };
                        hypothesis.confidence = decision.confidence_after;
                        if matches!(
                            decision.source,
                            DecisionSource::Rule | DecisionSource::Bayesian
                        ) {
                            hypothesis.set_status(HypothesisStatus::Refuted)?;
                        }
                        hypothesis.retire(rationale.as_str());
                        dead_ends.push(MemoryEntry::new(
                            MemoryCategory::DeadEnd,
                            format!("retired: {} ({rationale})", hypothesis.statement),
                        ));
                    }
                    Verdict::Refine {
                        statement,
                        rationale,
                        supersede,
                    } => {
                        let child = {
                            let Some(hypothesis) = plan.hypothesis_mut(&decision.hypothesis_id)
                            else {
                                continue;
                            };
                            hypothesis.confidence = decision.confidence_after;
                            let child = hypothesis.refine_into(statement, &rationale);
                            if supersede {
                                hypothesis.retire("superseded by refinement");
                            }
                            child
                        };
                        let flags = find_contradictions(
                            &child,
                            &plan.active_hypotheses(),
                            self.config.refiner.similarity_threshold,
                        );
                        let mut child = child;
                        for flag in &flags {
                            warn!(
                                a = %flag.hypothesis_a,
                                b = %flag.hypothesis_b,
                                "refined hypothesis contradicts an active one, both flagged"
                            );
                            if let Some(other) = plan.hypothesis_mut(&flag.hypothesis_b) {
                                other.record(
                                    RefinementAction::FlaggedForReview,
                                    flag.reason.clone(),
                                );
                            }
                            child.record(RefinementAction::FlaggedForReview, flag.reason.clone());
                        }
                        plan.add_hypothesis(child);
                    }
                }
            }
        }

        let mut memory = self.memory.lock().unwrap();
        for entry in dead_ends {
            memory.record(entry);
        }
        Ok(())
    }

    /// Combine supported hypotheses that describe the same effect.
    async fn merge_supported(&self) -> SaganResult<()> {
        let groups: Vec<Vec<Hypothesis>> = {
            let plan = self.plan.lock().unwrap();
            let mut supported: Vec<&Hypothesis> = plan
                .hypotheses
                .values()
                .filter(|h| h.status == HypothesisStatus::Supported)
                .collect();
            supported.sort_by_key(|h| h.hypothesis_id);
            merge_groups(&supported, self.config.refiner.similarity_threshold)
                .into_iter()
                .map(|group| group.into_iter().cloned().collect())
                .collect()
        };

        for group in groups {
            let refs: Vec<&Hypothesis> = group.iter().collect();
            let Some(merged) = self.refiner.merge(&refs).await else {
                continue;
            };
            info!(
                merged = %merged.hypothesis_id,
                parents = group.len(),
                "merged supported hypotheses"
            );
            let mut plan = self.plan.lock().unwrap();
            for parent in &group {
                if let Some(hypothesis) = plan.hypothesis_mut(&parent.hypothesis_id) {
                    hypothesis.record(
                        RefinementAction::Merged,
                        format!("merged into {}", merged.hypothesis_id),
                    );
                }
            }
            plan.add_hypothesis(merged);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Convergence
    // ------------------------------------------------------------------

    fn do_evaluate(&self) -> SaganResult<Option<RunOutcome>> {
        let boundary = self.workflow.lock().unwrap().current() == WorkflowState::Refining;
        if boundary {
            let mut plan = self.plan.lock().unwrap();
            plan.advance_iteration();
        }

        let signal = {
            let plan = self.plan.lock().unwrap();
            let detector = self.detector.lock().unwrap();
            detector.evaluate(&plan)
        };
        self.force_evaluate.store(false, Ordering::Relaxed);

        match signal {
            ConvergenceSignal::Proceed(metrics) => {
                debug!(
                    discovery_rate = metrics.discovery_rate,
                    novelty = metrics.novelty_score,
                    saturation = metrics.saturation_ratio,
                    "convergence check passed, continuing"
                );
                if boundary {
                    self.set_state(WorkflowState::GeneratingHypotheses)?;
                }
                Ok(None)
            }
            ConvergenceSignal::MandatoryStop(report) => {
                self.export_report(&report);
                self.drive_to_converged()?;
                Ok(Some(RunOutcome::Converged(report)))
            }
            ConvergenceSignal::SuggestedStop(report) => {
                self.export_report(&report);
                if self.config.require_confirmation {
                    info!(
                        criterion = %report.criterion,
                        "optional stop criterion fired, awaiting confirmation"
                    );
                    self.set_state(WorkflowState::Paused)?;
                    Ok(Some(RunOutcome::AwaitingConfirmation(report)))
                } else {
                    self.drive_to_converged()?;
                    Ok(Some(RunOutcome::Converged(report)))
                }
            }
        }
    }

    fn export_report(&self, report: &ConvergenceReport) {
        let rendered = report.to_string();
        for sink in &self.sinks {
            sink.export(report, &rendered);
        }
    }

    /// Walk the legal edge chain from wherever the loop stopped down to
    /// `Converged`, recording every step. No transition is coerced; each
    /// edge exists in the adjacency table.
    fn drive_to_converged(&self) -> SaganResult<()> {
        let mut plan = self.plan.lock().unwrap();
        let mut workflow = self.workflow.lock().unwrap();
        while !workflow.current().is_terminal() {
            match workflow.current() {
                WorkflowState::Paused => workflow.resume()?,
                state => {
                    let next = match state {
                        WorkflowState::Initializing => WorkflowState::GeneratingHypotheses,
                        WorkflowState::GeneratingHypotheses => WorkflowState::DesigningExperiments,
                        WorkflowState::DesigningExperiments => WorkflowState::Executing,
                        WorkflowState::Executing => WorkflowState::Analyzing,
                        WorkflowState::Analyzing => WorkflowState::Refining,
                        _ => WorkflowState::Converged,
                    };
                    workflow.transition(next)?;
                }
            }
        }
        plan.workflow_state = workflow.current();
        Ok(())
    }
}

impl std::fmt::Debug for Director {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("workers", &self.workers)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sagan_core::{OracleError, WorkerLimits};
    use sagan_oracle::OracleRequest;

    struct NullOracle;

    #[async_trait]
    impl GenerationOracle for NullOracle {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            Ok(r#"{"decision": "continue"}"#.to_string())
        }
    }

    fn director() -> Director {
        let (_tx, rx) = Director::stop_channel();
        Director::new(
            ResearchPlan::new("q", 5),
            SaganConfig::default(),
            WorkerSet::new(WorkerLimits::default()),
            Arc::new(NullOracle),
            rx,
        )
    }

    #[test]
    fn test_set_state_follows_adjacency_table() {
        let director = director();
        director
            .set_state(WorkflowState::GeneratingHypotheses)
            .unwrap();
        assert_eq!(
            director.workflow_state(),
            WorkflowState::GeneratingHypotheses
        );
        assert_eq!(
            director.plan_snapshot().workflow_state,
            WorkflowState::GeneratingHypotheses
        );

        let err = director.set_state(WorkflowState::Analyzing).unwrap_err();
        assert!(matches!(
            err,
            sagan_core::SaganError::Workflow(WorkflowError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_set_state_is_idempotent_on_same_state() {
        let director = director();
        director
            .set_state(WorkflowState::GeneratingHypotheses)
            .unwrap();
        director
            .set_state(WorkflowState::GeneratingHypotheses)
            .unwrap();
        assert!(director.workflow_state() == WorkflowState::GeneratingHypotheses);
    }

    #[test]
    fn test_three_consecutive_failures_escalate() {
        let director = director();
        assert!(director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .is_ok());
        assert!(director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .is_ok());
        let err = director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .unwrap_err();
        assert!(matches!(
            err,
            sagan_core::SaganError::Worker(WorkerError::ConsecutiveFailures { count: 3, .. })
        ));
        assert_eq!(director.workflow_state(), WorkflowState::Error);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let director = director();
        director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .unwrap();
        director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .unwrap();
        director.reset_failures(WorkerKind::ExperimentExecutor);
        // The streak starts over; two more failures do not escalate.
        assert!(director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .is_ok());
        assert!(director
            .handle_worker_failure(WorkerKind::ExperimentExecutor, "boom")
            .is_ok());
    }

    #[test]
    fn test_failures_are_recorded_as_failure_patterns() {
        let director = director();
        director
            .handle_worker_failure(WorkerKind::ResultAnalyzer, "timeout")
            .unwrap();
        let exported = director.memory_export();
        assert!(exported
            .iter()
            .any(|e| e.category == MemoryCategory::FailurePattern
                && e.content.contains("timeout")));
    }

    #[test]
    fn test_drive_to_converged_walks_legal_edges() {
        let director = director();
        director.drive_to_converged().unwrap();
        assert_eq!(director.workflow_state(), WorkflowState::Converged);
    }
}
