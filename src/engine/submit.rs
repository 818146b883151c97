// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submission paths: single pack state changes and bulk requests.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::StoreAndForwardMode;
use crate::pack::{DataEntryMode, PackIdentifier, RequestedPackState};
use crate::records::DeferredRequest;
use crate::transport::{HubRequest, TransportError};
use crate::txn::TransactionManager;
use crate::validation::{validate_bulk, validate_pack};

use super::dedup::RecentRequestKey;
use super::events::StoreAndForwardEvent;
use super::types::SubmitOutcome;
use super::ForwardEngine;

impl ForwardEngine {
    /// Report a state change for a single pack.
    ///
    /// Validates (normalizing the identifier in place), applies the
    /// repeated-request window, then sends. Connectivity failures defer
    /// the request unless the mode is NONE or a listener vetoes.
    #[tracing::instrument(skip(self, pack), fields(scheme = %pack.scheme, state = %state))]
    pub async fn report_pack_state(
        &self,
        mut pack: PackIdentifier,
        state: RequestedPackState,
        entry_mode: DataEntryMode,
        language: &str,
    ) -> SubmitOutcome {
        let validation = validate_pack(&mut pack, entry_mode);
        if !validation.is_valid() {
            debug!(code = validation.operation_code, "pack rejected by validation");
            crate::metrics::record_validation_failure(validation.operation_code);
            crate::metrics::record_submission("rejected");
            return SubmitOutcome::Rejected(validation);
        }

        let config = self.config.read().clone();

        // Suppression runs on the normalized identifier: two raw scans of
        // the same pack are the same transition to the hub.
        if config.detect_repeated_single_pack_requests {
            let key = RecentRequestKey::from_pack(&pack, state, entry_mode, language);
            let window =
                Duration::from_secs(config.repeated_single_pack_requests_window_secs);
            if self.window.check_and_record(key, window) {
                debug!("identical request within window, suppressing");
                crate::metrics::record_suppressed();
                crate::metrics::record_submission("suppressed");
                return SubmitOutcome::Suppressed;
            }
        }

        let credentials = self
            .credentials
            .find_by_identifier(&config.connection_identifier)
            .await
            .ok()
            .flatten();
        let request =
            HubRequest::pack_state(&config.hub_base(), &pack, state, entry_mode, language)
                .with_credentials(credentials);

        match self.send_with_retry(&request).await {
            Ok(response) => {
                crate::metrics::record_submission("delivered");
                SubmitOutcome::Delivered(response)
            }
            Err(error)
                if error.is_connectivity()
                    && config.store_and_forward_mode != StoreAndForwardMode::None =>
            {
                let deferred = DeferredRequest::new(
                    request.verb,
                    request.uri,
                    request.body,
                    state,
                    entry_mode.is_manual(),
                    language,
                );
                self.defer_request(deferred, &error).await
            }
            Err(error) => {
                crate::metrics::record_submission("failed");
                SubmitOutcome::Failed(error)
            }
        }
    }

    /// Report a state change for a collection of packs.
    ///
    /// `declared_count` is the pack count the caller announced; it must
    /// match the collection. When the hub is unreachable and
    /// `store_and_forward_bulk_requests` is set, the bulk is exploded
    /// into one deferred request per pack so recovery reports per pack.
    #[tracing::instrument(skip(self, packs), fields(packs = packs.len(), state = %state))]
    pub async fn report_bulk(
        &self,
        mut packs: Vec<PackIdentifier>,
        declared_count: usize,
        state: RequestedPackState,
        entry_mode: DataEntryMode,
        language: &str,
    ) -> SubmitOutcome {
        let config = self.config.read().clone();

        let bulk_validation =
            validate_bulk(&packs, declared_count, config.effective_max_bulk_pack_count());
        if !bulk_validation.is_valid() {
            crate::metrics::record_validation_failure(bulk_validation.operation_code);
            crate::metrics::record_submission("rejected");
            return SubmitOutcome::Rejected(bulk_validation);
        }
        for pack in &mut packs {
            let validation = validate_pack(pack, entry_mode);
            if !validation.is_valid() {
                crate::metrics::record_validation_failure(validation.operation_code);
                crate::metrics::record_submission("rejected");
                return SubmitOutcome::Rejected(validation);
            }
        }

        let credentials = self
            .credentials
            .find_by_identifier(&config.connection_identifier)
            .await
            .ok()
            .flatten();
        let request =
            HubRequest::bulk_state(&config.hub_base(), &packs, state, entry_mode, language)
                .with_credentials(credentials);

        match self.send_with_retry(&request).await {
            Ok(response) => {
                crate::metrics::record_submission("delivered");
                SubmitOutcome::Delivered(response)
            }
            Err(error)
                if error.is_connectivity()
                    && config.store_and_forward_mode != StoreAndForwardMode::None =>
            {
                let bulk_deferred = DeferredRequest::new(
                    request.verb,
                    request.uri,
                    request.body,
                    state,
                    entry_mode.is_manual(),
                    language,
                );
                if config.store_and_forward_bulk_requests {
                    self.defer_bulk_exploded(
                        bulk_deferred,
                        &packs,
                        state,
                        entry_mode,
                        language,
                        &error,
                    )
                    .await
                } else {
                    self.defer_request(bulk_deferred, &error).await
                }
            }
            Err(error) => {
                crate::metrics::record_submission("failed");
                SubmitOutcome::Failed(error)
            }
        }
    }

    /// Persist one deferred request under a transaction, after giving
    /// listeners the chance to veto.
    pub(super) async fn defer_request(
        &self,
        deferred: DeferredRequest,
        trigger: &TransportError,
    ) -> SubmitOutcome {
        let mode = self.config.read().store_and_forward_mode;
        let event = StoreAndForwardEvent::new(
            trigger.clone(),
            "request deferred for later forwarding",
            deferred.clone(),
            mode,
        );
        self.listeners.emit_store_and_forward(&event);
        if event.is_cancelled() {
            info!("deferral vetoed by listener, surfacing failure");
            crate::metrics::record_submission("failed");
            return SubmitOutcome::Failed(trigger.clone());
        }

        let table = self.service.deferred_requests();
        let txn = TransactionManager::new(table.clone());
        match table.add(deferred).await {
            Ok(timestamp) => {
                if txn.commit().await {
                    info!(timestamp, "request deferred");
                    crate::metrics::record_deferred();
                    crate::metrics::record_submission("deferred");
                    self.emit_stats().await;
                    SubmitOutcome::Deferred { timestamp }
                } else {
                    error!(timestamp, error = ?txn.error(), "deferral commit failed");
                    crate::metrics::record_submission("failed");
                    SubmitOutcome::Failed(trigger.clone())
                }
            }
            Err(storage_error) => {
                txn.rollback().await;
                error!(error = %storage_error, "failed to persist deferred request");
                crate::metrics::record_submission("failed");
                SubmitOutcome::Failed(trigger.clone())
            }
        }
    }

    /// Explode an offline bulk request into one deferred request per pack
    /// inside a single transaction, preserving pack order.
    async fn defer_bulk_exploded(
        &self,
        bulk_deferred: DeferredRequest,
        packs: &[PackIdentifier],
        state: RequestedPackState,
        entry_mode: DataEntryMode,
        language: &str,
        trigger: &TransportError,
    ) -> SubmitOutcome {
        let mode = self.config.read().store_and_forward_mode;
        let event = StoreAndForwardEvent::new(
            trigger.clone(),
            "bulk request deferred per pack",
            bulk_deferred,
            mode,
        );
        self.listeners.emit_store_and_forward(&event);
        if event.is_cancelled() {
            info!("bulk deferral vetoed by listener, surfacing failure");
            crate::metrics::record_submission("failed");
            return SubmitOutcome::Failed(trigger.clone());
        }

        let base = self.config.read().hub_base();
        let table = self.service.deferred_requests();
        let txn = TransactionManager::new(table.clone());
        let mut timestamps = Vec::with_capacity(packs.len());
        for pack in packs {
            let request = HubRequest::pack_state(&base, pack, state, entry_mode, language);
            let deferred = DeferredRequest::new(
                request.verb,
                request.uri,
                request.body,
                state,
                entry_mode.is_manual(),
                language,
            );
            match table.add(deferred).await {
                Ok(timestamp) => timestamps.push(timestamp),
                Err(storage_error) => {
                    txn.rollback().await;
                    error!(error = %storage_error, "bulk explosion failed, rolled back");
                    crate::metrics::record_submission("failed");
                    return SubmitOutcome::Failed(trigger.clone());
                }
            }
        }
        if txn.commit().await {
            info!(packs = timestamps.len(), "bulk request deferred per pack");
            crate::metrics::record_deferred();
            crate::metrics::record_submission("deferred");
            self.emit_stats().await;
            SubmitOutcome::DeferredBulk { timestamps }
        } else {
            error!(error = ?txn.error(), "bulk deferral commit failed");
            crate::metrics::record_submission("failed");
            SubmitOutcome::Failed(trigger.clone())
        }
    }
}
