// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store-and-forward engine.
//!
//! The [`ForwardEngine`] is the coordinator tying the pieces together:
//! validation gates inbound requests, the repeated-request window drops
//! double scans, sends go through retry and a circuit breaker, failures
//! classified as connectivity problems are persisted as deferred requests
//! under a transaction, and a recovery task forwards the queue when the
//! hub comes back.
//!
//! ```text
//! report_pack_state()
//!   └─ validate ─ suppress? ─ send ──ok──> Delivered
//!                              │
//!                       connectivity failure
//!                              │ (listener may veto)
//!                              ▼
//!                 DeferredRequest ──txn add+commit──> request table
//!                                                        │
//!                recovery task (poll / manual) ──send────┘
//!                      ok: result table + txn remove+commit
//! ```

mod dedup;
mod events;
mod recovery;
mod submit;
mod types;

pub use dedup::{RecentRequestKey, RecentRequestWindow};
pub use events::{EngineListener, ListenerRegistry, StoreAndForwardEvent};
pub use types::{DeferredStats, EngineHealth, RecoveryReport, SubmitOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, StoreAndForwardMode};
use crate::credentials::CredentialsService;
use crate::resilience::{CircuitBreaker, CircuitError, HubHealthChecker, RetryConfig};
use crate::storage::DataManagementService;
use crate::transport::{HubRequest, HubResponse, HubTransport, TransportError};

/// Store-and-forward coordinator for one hub connection.
///
/// # Thread Safety
///
/// The engine is `Send + Sync` and designed for concurrent callers plus
/// the background recovery task. Locking is scoped per component; there
/// is no engine-wide lock.
pub struct ForwardEngine {
    /// Configuration (updatable at runtime).
    pub(super) config: RwLock<EngineConfig>,

    /// Storage for the request, result and credentials tables.
    pub(super) service: Arc<dyn DataManagementService>,

    /// The out-of-scope HTTP client.
    pub(super) transport: Arc<dyn HubTransport>,

    /// Keyed credential lookups over the service's credentials table.
    pub(super) credentials: CredentialsService,

    /// Repeated-request suppression window.
    pub(super) window: RecentRequestWindow,

    /// Event listeners.
    pub(super) listeners: ListenerRegistry,

    /// Consecutive-failure hub health tracking.
    pub(super) hub_health: HubHealthChecker,

    /// Fail-fast breaker around hub sends.
    pub(super) breaker: CircuitBreaker,

    /// Set on the first connectivity failure, cleared on the first
    /// successful send.
    pub(super) offline: AtomicBool,

    /// Shutdown signal for the recovery task.
    pub(super) shutdown: watch::Sender<bool>,

    /// Handle of the running recovery task, if any.
    pub(super) recovery_task: Mutex<Option<JoinHandle<()>>>,
}

impl ForwardEngine {
    /// Create an engine over the given storage service and transport.
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn DataManagementService>,
        transport: Arc<dyn HubTransport>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let credentials = CredentialsService::new(service.credentials());
        Self {
            config: RwLock::new(config),
            service,
            transport,
            credentials,
            window: RecentRequestWindow::new(),
            listeners: ListenerRegistry::new(),
            hub_health: HubHealthChecker::new(),
            breaker: CircuitBreaker::with_defaults("hub"),
            offline: AtomicBool::new(false),
            shutdown,
            recovery_task: Mutex::new(None),
        }
    }

    /// Start the background recovery task when the mode is AUTOMATIC.
    /// A no-op in MANUAL and NONE modes.
    pub fn start(self: &Arc<Self>) {
        let (mode, interval_ms) = {
            let config = self.config.read();
            (config.store_and_forward_mode, config.recovery_poll_interval_ms)
        };
        if mode != StoreAndForwardMode::Automatic {
            info!(%mode, "store-and-forward recovery runs on manual trigger only");
            return;
        }
        let mut task = self.recovery_task.lock();
        if task.is_some() {
            warn!("recovery task already running");
            return;
        }

        let engine = Arc::clone(self);
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms, "recovery task started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        engine.recover_deferred().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("recovery task stopped");
        });
        *task = Some(handle);
    }

    /// Stop the recovery task and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.recovery_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("forward engine shut down");
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. Mode and interval changes apply to
    /// submissions immediately; a running recovery task keeps its
    /// original interval until restarted.
    pub fn update_config(&self, config: EngineConfig) {
        *self.config.write() = config;
    }

    /// Whether the engine currently considers the hub unreachable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Listener registry for engine events.
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Credential lookups for this connection.
    #[must_use]
    pub fn credentials(&self) -> &CredentialsService {
        &self.credentials
    }

    /// Health snapshot for diagnostics endpoints.
    pub async fn health(&self) -> EngineHealth {
        let pending_deferred = match self.service.deferred_requests().records().await {
            Ok(records) => records.iter().filter(|r| !r.acknowledged).count(),
            Err(_) => 0,
        };
        let recovered_results =
            self.service.deferred_results().count().await.unwrap_or(0);
        EngineHealth {
            offline: self.is_offline(),
            hub_healthy: self.hub_health.is_healthy(),
            mode: self.config.read().store_and_forward_mode,
            pending_deferred,
            recovered_results,
            recovery_task_running: self.recovery_task.lock().is_some(),
        }
    }

    // --- Send path ---

    /// One send attempt through the circuit breaker, with offline/health
    /// bookkeeping.
    pub(super) async fn send_once(
        &self,
        request: &HubRequest,
    ) -> Result<HubResponse, TransportError> {
        let start = Instant::now();
        let result = self.breaker.call(self.transport.send(request)).await;
        crate::metrics::record_send_latency(start.elapsed());
        match result {
            Ok(response) => {
                self.hub_health.record_success();
                self.mark_online();
                Ok(response)
            }
            Err(CircuitError::Rejected) => {
                self.hub_health.record_failure();
                self.mark_offline();
                Err(TransportError::CircuitOpen)
            }
            Err(CircuitError::Inner(error)) => {
                if error.is_connectivity() {
                    self.hub_health.record_failure();
                    self.mark_offline();
                }
                Err(error)
            }
        }
    }

    /// Initial send: honours the configured retry count and interval for
    /// connectivity failures; other failures surface immediately.
    pub(super) async fn send_with_retry(
        &self,
        request: &HubRequest,
    ) -> Result<HubResponse, TransportError> {
        let retry_config = {
            let config = self.config.read();
            RetryConfig::fixed(
                config.retry_count,
                Duration::from_millis(config.retry_interval_ms),
            )
        };
        crate::resilience::retry_if(
            "hub_send",
            &retry_config,
            || self.send_once(request),
            TransportError::is_connectivity,
        )
        .await
    }

    pub(super) fn mark_offline(&self) {
        if !self.offline.swap(true, Ordering::AcqRel) {
            warn!("hub connection lost, switching to offline mode");
            crate::metrics::set_offline(true);
            self.listeners.emit_offline_changed(true);
        }
    }

    pub(super) fn mark_online(&self) {
        if self.offline.swap(false, Ordering::AcqRel) {
            info!("hub connection restored, back online");
            crate::metrics::set_offline(false);
            self.listeners.emit_offline_changed(false);
        }
    }

    /// Recompute queue statistics, publish them to gauges and listeners.
    pub(super) async fn emit_stats(&self) {
        let pending = match self.service.deferred_requests().records().await {
            Ok(records) => records.iter().filter(|r| !r.acknowledged).count(),
            Err(_) => return,
        };
        let recovered = self.service.deferred_results().count().await.unwrap_or(0);
        crate::metrics::set_pending_deferred(pending);
        crate::metrics::set_recovered_results(recovered);
        self.listeners.emit_stats(&DeferredStats {
            pending_requests: pending,
            recovered_responses: recovered,
        });
    }
}
