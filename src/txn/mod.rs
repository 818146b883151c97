// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transaction session semantics over a single resource manager.
//!
//! A [`TransactionManager`] wraps one [`ResourceManager`] (in practice a
//! data table) and gives its mutations defined commit/rollback behavior:
//!
//! ```text
//! Active --commit--> PartiallyCommitted --rm ok--> Committed --> Terminated
//! Active --commit--> PartiallyCommitted --rm fails--> Failed --rollback--> Aborted --> Terminated
//! ```
//!
//! Incoherent resource-manager behavior (leaving the transaction in a
//! state the manager cannot reconcile) is converted into a forced rollback
//! and a `false` commit result; nothing is thrown across the boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::storage::ResourceManager;

/// Lifecycle states of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting work.
    Active,
    /// `commit()` called, resource manager not yet confirmed.
    PartiallyCommitted,
    /// Resource manager confirmed the commit.
    Committed,
    /// Resource manager reported or caused a failure.
    Failed,
    /// Rolled back.
    Aborted,
    /// Finished; no further transitions.
    Terminated,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::PartiallyCommitted => write!(f, "PARTIALLY_COMMITTED"),
            Self::Committed => write!(f, "COMMITTED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Aborted => write!(f, "ABORTED"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// How a finished transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed,
    Aborted,
}

/// Transaction-protocol failures. Recorded on the manager, surfaced to the
/// caller as a boolean commit result, never thrown.
#[derive(Debug, Clone, Error)]
pub enum TxnError {
    #[error("commit called while transaction is {0}")]
    NotActive(TransactionState),

    #[error("resource manager left transaction in state {0}")]
    Incoherent(TransactionState),

    #[error("resource manager commit failed: {0}")]
    CommitFailed(String),

    #[error("resource manager rollback failed: {0}")]
    RollbackFailed(String),

    #[error("resource manager release failed: {0}")]
    ReleaseFailed(String),
}

/// Optional sink for terminal transaction errors. Absence silently drops
/// the report; state transitions and return values are unaffected.
pub trait TxnErrorSink: Send + Sync {
    fn transaction_error(&self, txn: Uuid, error: &TxnError);
}

/// Shared transaction identity and state, visible to the resource manager
/// during `commit`/`rollback` so it can flag failures.
#[derive(Debug)]
pub struct TxnContext {
    id: Uuid,
    state: Mutex<TransactionState>,
    outcome: Mutex<Option<TxnOutcome>>,
    error: Mutex<Option<TxnError>>,
}

impl TxnContext {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Mutex::new(TransactionState::Active),
            outcome: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Resource managers call this to flag a failure mid-commit; the
    /// first recorded error is kept as the trigger.
    pub fn fail(&self, error: TxnError) {
        self.set_state(TransactionState::Failed);
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<TxnError> {
        self.error.lock().clone()
    }

    fn record_error(&self, error: TxnError) -> TxnError {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(error.clone());
        }
        error
    }

    fn set_outcome(&self, outcome: TxnOutcome) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

/// One instance per logical transaction.
pub struct TransactionManager {
    ctx: Arc<TxnContext>,
    resource: Arc<dyn ResourceManager>,
    sink: Option<Arc<dyn TxnErrorSink>>,
    closed: AtomicBool,
}

impl TransactionManager {
    /// Open a transaction over `resource`, starting `Active`.
    ///
    /// The resource manager argument is non-optional by type; absence is
    /// unrepresentable here.
    pub fn new(resource: Arc<dyn ResourceManager>) -> Self {
        Self {
            ctx: Arc::new(TxnContext::new()),
            resource,
            sink: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Attach an error sink for terminal failures.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TxnErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.ctx.id()
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.ctx.state()
    }

    /// How the transaction ended, once terminal.
    #[must_use]
    pub fn outcome(&self) -> Option<TxnOutcome> {
        *self.ctx.outcome.lock()
    }

    /// Last recorded transaction error, if any.
    #[must_use]
    pub fn error(&self) -> Option<TxnError> {
        self.ctx.error()
    }

    /// Commit. Returns `true` only on the full
    /// `Active -> PartiallyCommitted -> Committed -> Terminated` path; any
    /// deviation triggers a rollback and returns `false` with the
    /// triggering error recorded.
    pub async fn commit(&self) -> bool {
        let state = self.ctx.state();
        if state != TransactionState::Active {
            self.report(self.ctx.record_error(TxnError::NotActive(state)));
            return false;
        }
        self.ctx.set_state(TransactionState::PartiallyCommitted);
        self.complete_commit().await
    }

    /// Drive a `PartiallyCommitted` transaction to its end.
    async fn complete_commit(&self) -> bool {
        match self.resource.commit(&self.ctx).await {
            Ok(()) => {
                let after = self.ctx.state();
                if after == TransactionState::PartiallyCommitted {
                    self.ctx.set_state(TransactionState::Committed);
                    self.ctx.set_outcome(TxnOutcome::Committed);
                    self.ctx.set_state(TransactionState::Terminated);
                    debug!(txn = %self.ctx.id(), "transaction committed");
                    true
                } else {
                    // The resource manager moved the transaction somewhere
                    // unexpected (Failed, Aborted, ...).
                    self.report(self.ctx.record_error(TxnError::Incoherent(after)));
                    self.rollback().await;
                    false
                }
            }
            Err(e) => {
                self.report(self.ctx.record_error(TxnError::CommitFailed(e.to_string())));
                self.rollback().await;
                false
            }
        }
    }

    /// Roll back. Idempotent: a second call on an already aborted or
    /// terminated transaction is a no-op. A rollback failure from the
    /// resource manager is reported but the transaction still terminates.
    pub async fn rollback(&self) {
        let state = self.ctx.state();
        if matches!(state, TransactionState::Aborted | TransactionState::Terminated) {
            return;
        }
        if let Err(e) = self.resource.rollback(&self.ctx).await {
            // No further escalation path exists for a failed rollback.
            self.report(self.ctx.record_error(TxnError::RollbackFailed(e.to_string())));
        }
        self.ctx.set_state(TransactionState::Aborted);
        self.ctx.set_outcome(TxnOutcome::Aborted);
        self.ctx.set_state(TransactionState::Terminated);
        debug!(txn = %self.ctx.id(), "transaction rolled back");
    }

    /// Abort: terminate immediately when already finished, otherwise fail
    /// the transaction and roll back.
    pub async fn abort(&self) {
        let state = self.ctx.state();
        if matches!(state, TransactionState::Aborted | TransactionState::Terminated) {
            self.ctx.set_state(TransactionState::Terminated);
            return;
        }
        self.ctx.set_state(TransactionState::Failed);
        self.rollback().await;
    }

    /// Scoped release: complete a partially committed transaction (or roll
    /// back anything else unfinished), terminate, then release the
    /// resource manager exactly once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!(txn = %self.ctx.id(), "close called twice, ignoring");
            return;
        }
        match self.ctx.state() {
            TransactionState::PartiallyCommitted => {
                let _ = self.complete_commit().await;
            }
            TransactionState::Terminated => {}
            _ => {
                self.rollback().await;
            }
        }
        self.ctx.set_state(TransactionState::Terminated);
        if let Err(e) = self.resource.close().await {
            self.report(self.ctx.record_error(TxnError::ReleaseFailed(e.to_string())));
        }
    }

    fn report(&self, error: TxnError) {
        error!(txn = %self.ctx.id(), %error, "transaction error");
        if let Some(ref sink) = self.sink {
            sink.transaction_error(self.ctx.id(), &error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Scriptable resource manager recording every call.
    #[derive(Default)]
    struct MockResource {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
        closes: AtomicUsize,
        fail_commit: AtomicBool,
        flag_failed_on_commit: AtomicBool,
        fail_rollback: AtomicBool,
    }

    impl MockResource {
        fn failing_commit() -> Self {
            let m = Self::default();
            m.fail_commit.store(true, Ordering::SeqCst);
            m
        }

        fn flagging_failed() -> Self {
            let m = Self::default();
            m.flag_failed_on_commit.store(true, Ordering::SeqCst);
            m
        }
    }

    #[async_trait]
    impl ResourceManager for MockResource {
        async fn commit(&self, txn: &TxnContext) -> Result<(), StorageError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            if self.flag_failed_on_commit.load(Ordering::SeqCst) {
                txn.fail(TxnError::CommitFailed("backend rejected batch".into()));
                return Ok(());
            }
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("disk full".into()));
            }
            Ok(())
        }

        async fn rollback(&self, _txn: &TxnContext) -> Result<(), StorageError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            if self.fail_rollback.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("rollback io error".into()));
            }
            Ok(())
        }

        async fn close(&self) -> Result<(), StorageError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        reports: AtomicUsize,
    }

    impl TxnErrorSink for CountingSink {
        fn transaction_error(&self, _txn: Uuid, _error: &TxnError) {
            self.reports.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_commit_happy_path() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.commit().await);
        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Committed));
        assert!(txn.error().is_none());
        assert_eq!(resource.commits.load(Ordering::SeqCst), 1);
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commit_fails_when_resource_errors() {
        let resource = Arc::new(MockResource::failing_commit());
        let txn = TransactionManager::new(resource.clone());

        assert!(!txn.commit().await);
        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Aborted));
        assert!(matches!(txn.error(), Some(TxnError::CommitFailed(_))));
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_fails_when_resource_flags_failed() {
        // The resource manager returns Ok but leaves the transaction in
        // Failed: incoherent, must roll back and keep the trigger error.
        let resource = Arc::new(MockResource::flagging_failed());
        let txn = TransactionManager::new(resource.clone());

        assert!(!txn.commit().await);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Aborted));
        assert!(matches!(txn.error(), Some(TxnError::CommitFailed(_))));
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_in_non_active_state_returns_false() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());

        assert!(txn.commit().await);
        // Second commit: already terminated.
        assert!(!txn.commit().await);
        assert!(matches!(txn.error(), Some(TxnError::NotActive(TransactionState::Terminated))));
        // No extra resource calls.
        assert_eq!(resource.commits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());

        txn.rollback().await;
        let state_after_first = txn.state();
        txn.rollback().await;

        assert_eq!(txn.state(), state_after_first);
        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Aborted));
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_failure_still_terminates() {
        let resource = Arc::new(MockResource::default());
        resource.fail_rollback.store(true, Ordering::SeqCst);
        let sink = Arc::new(CountingSink::default());
        let txn = TransactionManager::new(resource.clone()).with_sink(sink.clone());

        txn.rollback().await;

        assert_eq!(txn.state(), TransactionState::Terminated);
        assert!(matches!(txn.error(), Some(TxnError::RollbackFailed(_))));
        assert_eq!(sink.reports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_active_transaction() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());

        txn.abort().await;

        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Aborted));
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_terminated_transaction_is_noop() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());
        assert!(txn.commit().await);

        txn.abort().await;

        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(txn.outcome(), Some(TxnOutcome::Committed));
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_rolls_back_active_transaction() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());

        txn.close().await;

        assert_eq!(txn.state(), TransactionState::Terminated);
        assert_eq!(resource.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_releases_exactly_once() {
        let resource = Arc::new(MockResource::default());
        let txn = TransactionManager::new(resource.clone());
        assert!(txn.commit().await);

        txn.close().await;
        txn.close().await;

        assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_receives_terminal_errors() {
        let resource = Arc::new(MockResource::failing_commit());
        let sink = Arc::new(CountingSink::default());
        let txn = TransactionManager::new(resource).with_sink(sink.clone());

        assert!(!txn.commit().await);
        assert!(sink.reports.load(Ordering::SeqCst) >= 1);
    }
}
