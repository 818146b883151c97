// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine event listeners.
//!
//! An explicit observer registry: anonymous listeners in a list, named
//! listeners in a map so they can be removed again. The store-and-forward
//! event carries a cancel flag a listener may set synchronously to veto
//! the deferral before anything is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::StoreAndForwardMode;
use crate::records::DeferredRequest;
use crate::transport::TransportError;

use super::types::DeferredStats;

/// Fired when a failed request is about to be deferred.
#[derive(Debug)]
pub struct StoreAndForwardEvent {
    /// The failure that triggered the deferral.
    pub error: TransportError,
    pub message: String,
    /// The request about to be persisted.
    pub request: DeferredRequest,
    pub mode: StoreAndForwardMode,
    cancel: AtomicBool,
}

impl StoreAndForwardEvent {
    pub(crate) fn new(
        error: TransportError,
        message: impl Into<String>,
        request: DeferredRequest,
        mode: StoreAndForwardMode,
    ) -> Self {
        Self {
            error,
            message: message.into(),
            request,
            mode,
            cancel: AtomicBool::new(false),
        }
    }

    /// Veto the deferral; the failure is surfaced to the caller instead.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Callbacks the engine invokes on state changes. All methods default to
/// no-ops so listeners implement only what they care about.
pub trait EngineListener: Send + Sync {
    /// Offline flag flipped.
    fn offline_changed(&self, _offline: bool) {}

    /// A failed request is about to be deferred; call
    /// [`StoreAndForwardEvent::cancel`] to veto.
    fn store_and_forward_triggered(&self, _event: &StoreAndForwardEvent) {}

    /// Deferred-queue statistics changed.
    fn stats_updated(&self, _stats: &DeferredStats) {}
}

/// Listener registry: a list of anonymous listeners plus a map of named,
/// removable ones.
#[derive(Default)]
pub struct ListenerRegistry {
    anonymous: RwLock<Vec<Arc<dyn EngineListener>>>,
    named: DashMap<String, Arc<dyn EngineListener>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn EngineListener>) {
        self.anonymous.write().push(listener);
    }

    /// Register under a name, replacing any previous listener of that
    /// name.
    pub fn add_named(&self, name: impl Into<String>, listener: Arc<dyn EngineListener>) {
        self.named.insert(name.into(), listener);
    }

    /// Remove a named listener; returns whether one was registered.
    pub fn remove_named(&self, name: &str) -> bool {
        self.named.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.anonymous.write().clear();
        self.named.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anonymous.read().len() + self.named.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn EngineListener>> {
        let mut listeners: Vec<Arc<dyn EngineListener>> = self.anonymous.read().clone();
        listeners.extend(self.named.iter().map(|entry| entry.value().clone()));
        listeners
    }

    pub(crate) fn emit_offline_changed(&self, offline: bool) {
        for listener in self.snapshot() {
            listener.offline_changed(offline);
        }
    }

    pub(crate) fn emit_store_and_forward(&self, event: &StoreAndForwardEvent) {
        for listener in self.snapshot() {
            listener.store_and_forward_triggered(event);
        }
    }

    pub(crate) fn emit_stats(&self, stats: &DeferredStats) {
        for listener in self.snapshot() {
            listener.stats_updated(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::RequestedPackState;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        offline_events: AtomicUsize,
        saf_events: AtomicUsize,
        stats_events: AtomicUsize,
        veto: AtomicBool,
    }

    impl EngineListener for Recorder {
        fn offline_changed(&self, _offline: bool) {
            self.offline_events.fetch_add(1, Ordering::SeqCst);
        }

        fn store_and_forward_triggered(&self, event: &StoreAndForwardEvent) {
            self.saf_events.fetch_add(1, Ordering::SeqCst);
            if self.veto.load(Ordering::SeqCst) {
                event.cancel();
            }
        }

        fn stats_updated(&self, _stats: &DeferredStats) {
            self.stats_events.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event() -> StoreAndForwardEvent {
        StoreAndForwardEvent::new(
            TransportError::Unreachable("down".into()),
            "deferred",
            DeferredRequest::new(
                "PUT",
                "uri",
                json!({}),
                RequestedPackState::Supplied,
                false,
                "de-DE",
            ),
            StoreAndForwardMode::Automatic,
        )
    }

    #[test]
    fn test_anonymous_listener_receives_events() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add(recorder.clone());

        registry.emit_offline_changed(true);
        registry.emit_stats(&DeferredStats { pending_requests: 1, recovered_responses: 0 });

        assert_eq!(recorder.offline_events.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.stats_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_named_listener_can_be_removed() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.add_named("ui", recorder.clone());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove_named("ui"));
        assert!(!registry.remove_named("ui"));

        registry.emit_offline_changed(true);
        assert_eq!(recorder.offline_events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_flag_visible_to_emitter() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        recorder.veto.store(true, Ordering::SeqCst);
        registry.add(recorder.clone());

        let event = event();
        registry.emit_store_and_forward(&event);

        assert!(event.is_cancelled());
        assert_eq!(recorder.saf_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_not_cancelled_by_default() {
        let registry = ListenerRegistry::new();
        registry.add(Arc::new(Recorder::default()));

        let event = event();
        registry.emit_store_and_forward(&event);
        assert!(!event.is_cancelled());
    }
}
