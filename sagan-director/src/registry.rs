//! Correlation-id registry for in-flight worker requests.

use crate::messages::WorkerRequest;
use sagan_core::{CorrelationId, Timestamp, WorkerKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bookkeeping record for one in-flight request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Correlation id of the request
    pub correlation_id: CorrelationId,
    /// Worker kind the request went to
    pub kind: WorkerKind,
    /// One-line description of the work
    pub summary: String,
    /// When the request was issued
    pub issued_at: Timestamp,
}

/// Map of correlation id to pending request.
///
/// Every insert is stamped with a monotonic sequence number, so the
/// registry can reproduce exact issue order where the director needs
/// in-order processing for a worker kind.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    inflight: HashMap<CorrelationId, (u64, PendingRequest)>,
    next_seq: u64,
}

impl PendingRequests {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly issued request.
    pub fn insert(&mut self, request: &WorkerRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inflight.insert(
            request.correlation_id,
            (
                seq,
                PendingRequest {
                    correlation_id: request.correlation_id,
                    kind: request.kind,
                    summary: request.payload.summary(),
                    issued_at: request.issued_at,
                },
            ),
        );
    }

    /// Settle a request by correlation id. Returns the record, or `None`
    /// for an unknown id (a stale or duplicate response).
    pub fn settle(&mut self, correlation_id: &CorrelationId) -> Option<PendingRequest> {
        self.inflight
            .remove(correlation_id)
            .map(|(_, pending)| pending)
    }

    /// Number of in-flight requests for one worker kind.
    pub fn in_flight(&self, kind: WorkerKind) -> usize {
        self.inflight.values().filter(|(_, p)| p.kind == kind).count()
    }

    /// Total number of in-flight requests.
    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Pending requests for a kind, in issue order.
    pub fn pending_for(&self, kind: WorkerKind) -> Vec<PendingRequest> {
        let mut pending: Vec<(u64, PendingRequest)> = self
            .inflight
            .values()
            .filter(|(_, p)| p.kind == kind)
            .cloned()
            .collect();
        pending.sort_by_key(|(seq, _)| *seq);
        pending.into_iter().map(|(_, p)| p).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
