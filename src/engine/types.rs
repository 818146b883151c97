//! Public types for the forwarding engine.

use crate::config::StoreAndForwardMode;
use crate::transport::{HubResponse, TransportError};
use crate::validation::ValidationOutcome;

/// Outcome of one submission.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The hub accepted the request online.
    Delivered(HubResponse),
    /// The request was queued for later forwarding.
    Deferred {
        /// Key of the deferred record.
        timestamp: u64,
    },
    /// An offline bulk request was exploded into per-pack deferred
    /// requests.
    DeferredBulk {
        /// Keys of the deferred records, in pack order.
        timestamps: Vec<u64>,
    },
    /// An identical request was seen within the suppression window; no
    /// network call, no deferral.
    Suppressed,
    /// Validation failed; nothing left the engine.
    Rejected(ValidationOutcome),
    /// The request failed and was not (or could not be) deferred.
    Failed(TransportError),
}

impl SubmitOutcome {
    /// Label used in metrics and logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delivered(_) => "delivered",
            Self::Deferred { .. } => "deferred",
            Self::DeferredBulk { .. } => "deferred",
            Self::Suppressed => "suppressed",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of one recovery pass over the deferred queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Un-acknowledged requests attempted this pass.
    pub attempted: usize,
    /// Requests delivered and removed.
    pub recovered: usize,
    /// Requests that stayed queued.
    pub failed: usize,
}

impl RecoveryReport {
    /// True when every attempted request was recovered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Deferred-queue statistics, published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredStats {
    /// Un-acknowledged deferred requests waiting for forwarding.
    pub pending_requests: usize,
    /// Recovered responses waiting for reconciliation.
    pub recovered_responses: usize,
}

/// Snapshot of engine health for diagnostics endpoints.
#[derive(Debug, Clone)]
pub struct EngineHealth {
    /// Offline flag: flipped on the first connectivity failure.
    pub offline: bool,
    /// Hub health per the consecutive-failure checker.
    pub hub_healthy: bool,
    pub mode: StoreAndForwardMode,
    pub pending_deferred: usize,
    pub recovered_results: usize,
    /// Whether the automatic recovery task is running.
    pub recovery_task_running: bool,
}
