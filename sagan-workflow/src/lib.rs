//! SAGAN Workflow - Research Run State Machine
//!
//! Tracks the current phase of a research run and enforces legal phase
//! transitions against a fixed adjacency table. No transition is silently
//! coerced: an illegal edge fails with `WorkflowError::IllegalTransition`
//! and leaves the machine unchanged.
//!
//! # State Transition Diagram
//!
//! ```text
//! Initializing → GeneratingHypotheses → DesigningExperiments → Executing → Analyzing
//!                        ↑                                                    │
//!                        ├────────────────────────────────────────────────────┤
//!                        │                                                    ↓
//!                        └──────────────────── Refining ──→ Converged (terminal)
//!
//! any non-terminal → Paused (resumable)    any non-terminal → Error (terminal)
//! ```

use chrono::Utc;
use sagan_core::{Timestamp, WorkflowError, WorkflowState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// All workflow states, in declaration order. Used by exhaustive checks.
pub const ALL_STATES: [WorkflowState; 9] = [
    WorkflowState::Initializing,
    WorkflowState::GeneratingHypotheses,
    WorkflowState::DesigningExperiments,
    WorkflowState::Executing,
    WorkflowState::Analyzing,
    WorkflowState::Refining,
    WorkflowState::Converged,
    WorkflowState::Paused,
    WorkflowState::Error,
];

/// One entry in the transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State the machine left
    pub from: WorkflowState,
    /// State the machine entered
    pub to: WorkflowState,
    /// When the transition happened
    pub at: Timestamp,
}

/// Check the fixed adjacency table.
///
/// Self-edges are not in the table, terminal states have no outgoing
/// edges, and `Paused` resumes only to non-terminal working states.
pub fn can_transition(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState::*;

    if from.is_terminal() || from == to {
        return false;
    }
    match (from, to) {
        // Suspension and abort edges exist from every non-terminal state.
        (_, Paused) => true,
        (_, Error) => true,
        // The main loop.
        (Initializing, GeneratingHypotheses) => true,
        (GeneratingHypotheses, DesigningExperiments) => true,
        (DesigningExperiments, Executing) => true,
        (Executing, Analyzing) => true,
        (Analyzing, Refining) => true,
        (Analyzing, GeneratingHypotheses) => true,
        (Refining, GeneratingHypotheses) => true,
        (Refining, Converged) => true,
        // Resume: back to any non-terminal working state.
        (Paused, to) => !to.is_terminal(),
        _ => false,
    }
}

/// The workflow state machine for one research run.
#[derive(Debug, Clone)]
pub struct WorkflowMachine {
    current: WorkflowState,
    entered_at: Timestamp,
    history: Vec<TransitionRecord>,
    dwell: HashMap<WorkflowState, Duration>,
    resume_target: Option<WorkflowState>,
}

impl WorkflowMachine {
    /// Create a machine in `Initializing`.
    pub fn new() -> Self {
        Self {
            current: WorkflowState::Initializing,
            entered_at: Utc::now(),
            history: Vec::new(),
            dwell: HashMap::new(),
            resume_target: None,
        }
    }

    /// The current state.
    pub fn current(&self) -> WorkflowState {
        self.current
    }

    /// Whether the machine is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// The full transition history, oldest first.
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Accumulated dwell time in a state across all visits, not counting
    /// the current visit.
    pub fn time_in(&self, state: WorkflowState) -> Duration {
        self.dwell.get(&state).copied().unwrap_or(Duration::ZERO)
    }

    /// Check whether an edge from the current state exists.
    pub fn can_transition_to(&self, to: WorkflowState) -> bool {
        can_transition(self.current, to)
    }

    /// Transition to a new state.
    ///
    /// Fails with `WorkflowError::Terminal` if the machine has halted and
    /// `WorkflowError::IllegalTransition` if the edge is not in the
    /// adjacency table; in both cases the state is unchanged.
    pub fn transition(&mut self, to: WorkflowState) -> Result<(), WorkflowError> {
        if self.current.is_terminal() {
            return Err(WorkflowError::Terminal {
                state: self.current,
            });
        }
        if !can_transition(self.current, to) {
            return Err(WorkflowError::IllegalTransition {
                from: self.current,
                to,
            });
        }

        let now = Utc::now();
        let visit = (now - self.entered_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        *self.dwell.entry(self.current).or_insert(Duration::ZERO) += visit;

        if to == WorkflowState::Paused {
            self.resume_target = Some(self.current);
        } else if self.current == WorkflowState::Paused {
            self.resume_target = None;
        }

        self.history.push(TransitionRecord {
            from: self.current,
            to,
            at: now,
        });
        self.current = to;
        self.entered_at = now;
        Ok(())
    }

    /// Resume a paused machine to the state it paused from.
    pub fn resume(&mut self) -> Result<(), WorkflowError> {
        let target = match (self.current, self.resume_target) {
            (WorkflowState::Paused, Some(target)) => target,
            _ => {
                return Err(WorkflowError::IllegalTransition {
                    from: self.current,
                    to: self.resume_target.unwrap_or(self.current),
                })
            }
        };
        self.transition(target)
    }
}

impl Default for WorkflowMachine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
