//! The director's action set and the deterministic decision tree that
//! selects exactly one action per tick.

use sagan_core::WorkflowState;
use serde::{Deserialize, Serialize};

/// The fixed set of actions the director can take on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectorAction {
    /// Ask the generator worker for new hypotheses
    RequestHypotheses,
    /// Ask the designer worker for experiment protocols
    RequestExperimentDesign,
    /// Ask the executor worker to run queued experiments
    RequestExecution,
    /// Ask the analyzer worker to process raw outcomes
    RequestAnalysis,
    /// Run the refiner over hypotheses with new results
    InvokeRefiner,
    /// Evaluate the convergence detector
    EvaluateConvergence,
    /// Stop the loop
    Halt,
}

/// Snapshot of everything the decision tree looks at. Built under the
/// plan lock, consumed without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopView {
    /// Current workflow state
    pub state: WorkflowState,
    /// Hypotheses with status Untested
    pub untested: usize,
    /// Designed experiments waiting for execution
    pub queued: usize,
    /// Raw outcomes waiting for analysis
    pub pending_analysis: usize,
    /// Analyzed results the refiner has not consumed
    pub unrefined: usize,
    /// Whether the iteration counter has reached the limit
    pub at_iteration_limit: bool,
    /// Whether an out-of-band convergence evaluation was requested
    /// (e.g., the generator came back empty)
    pub force_evaluate: bool,
}

/// Select the single next action for a tick.
///
/// The tree is deterministic over its inputs, no randomness anywhere.
/// Ties break by fixed priority: convergence check first, then draining
/// completed-but-unprocessed results, then advancing the furthest-behind
/// queue.
pub fn next_action(view: &LoopView) -> DirectorAction {
    use WorkflowState::*;

    if view.state.is_terminal() || view.state == Paused {
        return DirectorAction::Halt;
    }

    // Priority 1: the convergence check.
    if view.at_iteration_limit
        || view.force_evaluate
        || (view.state == Refining && view.unrefined == 0)
    {
        return DirectorAction::EvaluateConvergence;
    }

    // Priority 2: drain completed-but-unprocessed work.
    if view.pending_analysis > 0 {
        return DirectorAction::RequestAnalysis;
    }
    if view.unrefined > 0 {
        return DirectorAction::InvokeRefiner;
    }

    // Priority 3: advance the furthest-behind queue for the phase.
    match view.state {
        Initializing | GeneratingHypotheses => {
            if view.untested == 0 {
                DirectorAction::RequestHypotheses
            } else {
                DirectorAction::RequestExperimentDesign
            }
        }
        DesigningExperiments => {
            if view.untested > 0 {
                DirectorAction::RequestExperimentDesign
            } else {
                DirectorAction::RequestExecution
            }
        }
        Executing => {
            if view.queued > 0 {
                DirectorAction::RequestExecution
            } else {
                // Nothing queued and nothing pending: the execution phase
                // produced no work, move the pipeline along.
                DirectorAction::RequestAnalysis
            }
        }
        // Analysis drained with nothing unrefined: an empty refine pass
        // advances the machine to the evaluation boundary.
        Analyzing => DirectorAction::InvokeRefiner,
        // Unreachable: Refining with unrefined == 0 evaluated above, and
        // with unrefined > 0 the drain rule fired.
        Refining => DirectorAction::InvokeRefiner,
        Converged | Paused | Error => DirectorAction::Halt,
    }
}

// =============================================================================
// TESTS
// =============================================================================
