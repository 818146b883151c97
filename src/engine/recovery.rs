// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recovery of deferred requests.
//!
//! One pass walks the un-acknowledged queue oldest first and re-issues
//! each request once. Successes are written to the result table, marked
//! acknowledged and removed under a transaction; failures stay queued and
//! the pass moves on, so one stuck pack never blocks the rest.

use tracing::{debug, error, info, warn};

use crate::records::DeferredResult;
use crate::transport::HubRequest;
use crate::txn::TransactionManager;

use super::types::RecoveryReport;
use super::ForwardEngine;

impl ForwardEngine {
    /// Re-attempt delivery of every un-acknowledged deferred request, in
    /// timestamp order. Runs on the poll timer in AUTOMATIC mode and on
    /// explicit call in MANUAL mode.
    #[tracing::instrument(skip(self))]
    pub async fn recover_deferred(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let table = self.service.deferred_requests();
        let records = match table.records().await {
            Ok(records) => records,
            Err(storage_error) => {
                error!(error = %storage_error, "cannot read deferred queue");
                return report;
            }
        };
        let pending: Vec<_> = records.into_iter().filter(|r| !r.acknowledged).collect();
        if pending.is_empty() {
            return report;
        }

        crate::metrics::record_recovery_pass();
        info!(pending = pending.len(), "recovering deferred requests");

        let connection_identifier = self.config.read().connection_identifier.clone();
        let credentials = self
            .credentials
            .find_by_identifier(&connection_identifier)
            .await
            .ok()
            .flatten();

        for deferred in pending {
            report.attempted += 1;
            let request =
                HubRequest::from_deferred(&deferred).with_credentials(credentials.clone());
            match self.send_once(&request).await {
                Ok(response) => {
                    let timestamp = deferred.timestamp;
                    // Result, acknowledgement and removal commit together:
                    // the tables share one transaction log.
                    let txn = TransactionManager::new(table.clone());
                    let result = DeferredResult::from_response(timestamp, &response);
                    if let Err(storage_error) =
                        self.service.deferred_results().add(result).await
                    {
                        warn!(timestamp, error = %storage_error, "result not recorded");
                    }
                    let mut acknowledged = deferred.clone();
                    acknowledged.acknowledged = true;
                    if let Err(storage_error) = table.replace(acknowledged.clone()).await {
                        warn!(timestamp, error = %storage_error, "acknowledge failed");
                    }
                    match table.remove(&acknowledged).await {
                        Ok(()) => {
                            if txn.commit().await {
                                debug!(timestamp, "deferred request recovered");
                                crate::metrics::record_recovered();
                                report.recovered += 1;
                            } else {
                                error!(timestamp, error = ?txn.error(), "recovery commit failed");
                                crate::metrics::record_recovery_failure();
                                report.failed += 1;
                            }
                        }
                        Err(storage_error) => {
                            txn.rollback().await;
                            error!(timestamp, error = %storage_error, "removal failed, kept queued");
                            crate::metrics::record_recovery_failure();
                            report.failed += 1;
                        }
                    }
                }
                Err(transport_error) => {
                    // Leave it queued; the next entry may be for an
                    // unrelated pack and still worth trying.
                    debug!(
                        timestamp = deferred.timestamp,
                        error = %transport_error,
                        "recovery attempt failed"
                    );
                    crate::metrics::record_recovery_failure();
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            recovered = report.recovered,
            failed = report.failed,
            "recovery pass complete"
        );
        self.emit_stats().await;
        report
    }

    /// Mark the deferred requests with the given timestamps as
    /// acknowledged without removing them. Used when an external
    /// confirmation channel reports processing asynchronously from the
    /// retry loop. Returns how many records changed.
    pub async fn acknowledge_requests(
        &self,
        timestamps: &[u64],
    ) -> Result<usize, crate::storage::StorageError> {
        let table = self.service.deferred_requests();
        let mut acknowledged = 0;
        for record in table.records().await? {
            if !record.acknowledged && timestamps.contains(&record.timestamp) {
                let mut updated = record;
                updated.acknowledged = true;
                table.replace(updated).await?;
                acknowledged += 1;
            }
        }
        if acknowledged > 0 {
            self.emit_stats().await;
        }
        Ok(acknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::ScriptedTransport;
    use super::super::types::SubmitOutcome;
    use super::super::ForwardEngine;
    use crate::config::EngineConfig;
    use crate::pack::{CodingScheme, DataEntryMode, PackIdentifier, ReportedPackState, RequestedPackState};
    use crate::storage::{DataManagementService, MemoryDataService};
    use crate::transport::{HubResponse, TransportError};
    use std::sync::Arc;

    fn gs1_pack(serial: &str) -> PackIdentifier {
        PackIdentifier::new(CodingScheme::Gs1, "04012345123456", serial)
            .with_batch("LOT1")
            .with_expiry("271200")
    }

    async fn engine_with(
        transport: Arc<ScriptedTransport>,
    ) -> (Arc<ForwardEngine>, Arc<MemoryDataService>) {
        let service = Arc::new(MemoryDataService::open("recovery-test").await.unwrap());
        let engine = Arc::new(ForwardEngine::new(
            EngineConfig::default(),
            service.clone(),
            transport,
        ));
        (engine, service)
    }

    async fn defer_one(engine: &ForwardEngine, serial: &str) -> u64 {
        match engine
            .report_pack_state(
                gs1_pack(serial),
                RequestedPackState::Supplied,
                DataEntryMode::Scanner,
                "de-DE",
            )
            .await
        {
            SubmitOutcome::Deferred { timestamp } => timestamp,
            other => panic!("expected Deferred, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recovery_on_empty_queue_is_noop() {
        let (engine, _service) = engine_with(Arc::new(ScriptedTransport::always_ok())).await;
        let report = engine.recover_deferred().await;
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn test_recovery_delivers_and_removes() {
        let transport = Arc::new(ScriptedTransport::always_down());
        let (engine, service) = engine_with(transport.clone()).await;

        let timestamp = defer_one(&engine, "S1").await;
        assert!(engine.is_offline());

        // Hub comes back.
        transport.set_default(Ok(HubResponse::accepted(ReportedPackState::Supplied)));
        let report = engine.recover_deferred().await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.recovered, 1);
        assert!(report.is_complete());
        assert!(!engine.is_offline());

        // Request gone, log clean, result recorded.
        assert_eq!(service.deferred_requests().count().await.unwrap(), 0);
        assert_eq!(service.transaction_log().count().await.unwrap(), 0);
        let results = service.deferred_results().records().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].request_timestamp, timestamp);
        assert_eq!(results[0].reported_state, ReportedPackState::Supplied);
    }

    #[tokio::test]
    async fn test_recovery_is_fifo_and_skips_failures() {
        let transport = Arc::new(ScriptedTransport::always_down());
        let (engine, service) = engine_with(transport.clone()).await;

        defer_one(&engine, "S1").await;
        defer_one(&engine, "S2").await;

        // First recovery attempt fails, second succeeds: no head-of-line
        // blocking.
        transport.set_default(Ok(HubResponse::accepted(ReportedPackState::Supplied)));
        transport.script(Err(TransportError::Timeout(std::time::Duration::from_secs(5))));

        let report = engine.recover_deferred().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.recovered, 1);
        assert_eq!(report.failed, 1);

        // The failed (older) request is still queued.
        let remaining = service.deferred_requests().records().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].uri.contains("/pack/S1/"));

        // Next pass drains it.
        let report = engine.recover_deferred().await;
        assert_eq!(report.recovered, 1);
        assert_eq!(service.deferred_requests().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recovery_attempts_oldest_first() {
        let transport = Arc::new(ScriptedTransport::always_down());
        let (engine, _service) = engine_with(transport.clone()).await;

        defer_one(&engine, "S1").await;
        defer_one(&engine, "S2").await;
        defer_one(&engine, "S3").await;

        transport.set_default(Ok(HubResponse::accepted(ReportedPackState::Supplied)));
        let before = transport.request_count();
        engine.recover_deferred().await;

        let requests = transport.requests.lock();
        let recovery_uris: Vec<&str> =
            requests[before..].iter().map(|r| r.uri.as_str()).collect();
        assert!(recovery_uris[0].contains("/pack/S1/"));
        assert!(recovery_uris[1].contains("/pack/S2/"));
        assert!(recovery_uris[2].contains("/pack/S3/"));
    }

    #[tokio::test]
    async fn test_acknowledged_requests_are_skipped_but_kept() {
        let transport = Arc::new(ScriptedTransport::always_down());
        let (engine, service) = engine_with(transport.clone()).await;

        let timestamp = defer_one(&engine, "S1").await;

        let changed = engine.acknowledge_requests(&[timestamp]).await.unwrap();
        assert_eq!(changed, 1);
        // Second acknowledgement of the same timestamp changes nothing.
        let changed = engine.acknowledge_requests(&[timestamp]).await.unwrap();
        assert_eq!(changed, 0);

        transport.set_default(Ok(HubResponse::accepted(ReportedPackState::Supplied)));
        let report = engine.recover_deferred().await;

        // Nothing attempted: the only record is acknowledged, and it
        // stays in the table until removed explicitly.
        assert_eq!(report.attempted, 0);
        assert_eq!(service.deferred_requests().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_timestamp_is_noop() {
        let (engine, _service) = engine_with(Arc::new(ScriptedTransport::always_ok())).await;
        let changed = engine.acknowledge_requests(&[12345]).await.unwrap();
        assert_eq!(changed, 0);
    }
}
