//! Worker agent trait and registry.
//!
//! Workers are opaque asynchronous task executors; they are message
//! passing peers of the director, not sub-components. Timeouts are the
//! worker's responsibility: a worker that gives up must answer with a
//! failure response, which the director treats like any other error.

use crate::messages::{WorkerRequest, WorkerResponse};
use async_trait::async_trait;
use sagan_core::{WorkerError, WorkerKind, WorkerLimits};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait for worker agents.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait WorkerAgent: Send + Sync {
    /// The worker kind this agent serves.
    fn kind(&self) -> WorkerKind;

    /// Handle one request. Errors are reported in-band as a failure
    /// response; this method itself does not fail.
    async fn handle(&self, request: WorkerRequest) -> WorkerResponse;
}

/// Registry of worker agents by kind, with per-kind concurrency limits.
#[derive(Clone)]
pub struct WorkerSet {
    workers: HashMap<WorkerKind, Arc<dyn WorkerAgent>>,
    limits: WorkerLimits,
}

impl WorkerSet {
    /// Create an empty worker set with the given limits.
    pub fn new(limits: WorkerLimits) -> Self {
        Self {
            workers: HashMap::new(),
            limits,
        }
    }

    /// Register a worker, replacing any previous worker of the same kind.
    pub fn register(&mut self, worker: Arc<dyn WorkerAgent>) {
        self.workers.insert(worker.kind(), worker);
    }

    /// Get the worker for a kind.
    pub fn worker(&self, kind: WorkerKind) -> Result<Arc<dyn WorkerAgent>, WorkerError> {
        self.workers
            .get(&kind)
            .cloned()
            .ok_or(WorkerError::NotRegistered { kind })
    }

    /// Whether a worker of the kind is registered.
    pub fn has_worker(&self, kind: WorkerKind) -> bool {
        self.workers.contains_key(&kind)
    }

    /// Maximum in-flight requests for a kind.
    pub fn limit(&self, kind: WorkerKind) -> usize {
        match kind {
            WorkerKind::HypothesisGenerator => self.limits.max_generation,
            WorkerKind::ExperimentDesigner => self.limits.max_design,
            WorkerKind::ExperimentExecutor => self.limits.max_execution,
            WorkerKind::ResultAnalyzer => self.limits.max_analysis,
        }
    }
}

impl fmt::Debug for WorkerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSet")
            .field("kinds", &self.workers.keys().collect::<Vec<_>>())
            .field("limits", &self.limits)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
