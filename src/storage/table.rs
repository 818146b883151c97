// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The transaction-logged data table.
//!
//! [`DataTable`] composes a dumb [`TableBackend`] with the shared
//! [`TransactionLog`] and the table's own timestamp counter. Insert order
//! is significant: the log entry must exist before the record is visible,
//! so a crash in between leaves a recoverable log entry with no matching
//! record. Removal runs in the reverse order.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::counter::TimestampCounter;
use crate::records::DataRecord;
use crate::txn::{TxnContext, TxnError};

use super::log::TransactionLog;
use super::traits::{ResourceManager, StorageError, TableBackend};

/// Ordered, timestamp-keyed record collection with transactional
/// add/remove.
pub struct DataTable<R: DataRecord> {
    name: String,
    backend: Box<dyn TableBackend<R>>,
    log: Arc<TransactionLog>,
    counter: Arc<TimestampCounter>,
}

impl<R: DataRecord> DataTable<R> {
    /// Open the table, seeding its counter from the maximum persisted
    /// timestamp so keys keep increasing across restarts.
    pub async fn open(
        name: impl Into<String>,
        backend: Box<dyn TableBackend<R>>,
        log: Arc<TransactionLog>,
    ) -> Result<Self, StorageError> {
        let counter = Arc::new(TimestampCounter::new());
        counter.advance_to(backend.max_timestamp().await?);
        Ok(Self { name: name.into(), backend, log, counter })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum timestamp across all records, or 0 if empty.
    pub async fn current_timestamp(&self) -> Result<u64, StorageError> {
        self.backend.max_timestamp().await
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        self.backend.count().await
    }

    /// All records in ascending timestamp order.
    pub async fn records(&self) -> Result<Vec<R>, StorageError> {
        self.backend.all().await
    }

    /// Insert under transaction-log protection, assigning the next
    /// timestamp when the record carries none. A record whose timestamp is
    /// already present is left untouched (idempotent insert); the existing
    /// key is returned either way.
    pub async fn add(&self, mut record: R) -> Result<u64, StorageError> {
        let timestamp = if record.timestamp() == 0 {
            self.counter.next()
        } else {
            record.timestamp()
        };
        if self.backend.contains(timestamp).await? {
            debug!(table = %self.name, timestamp, "duplicate insert ignored");
            return Ok(timestamp);
        }
        record.set_timestamp(timestamp);
        // Log first: the entry must exist before the record is visible.
        self.log.append(timestamp).await?;
        self.backend.insert(record).await?;
        Ok(timestamp)
    }

    /// Overwrite an existing record in place, bypassing the log. A missing
    /// record is a no-op.
    pub async fn replace(&self, record: R) -> Result<(), StorageError> {
        self.backend.overwrite(record).await.map(|_| ())
    }

    /// Delete the record, then its matching log entry if present, the
    /// reverse of insert. Removing an absent record is a no-op.
    pub async fn remove(&self, record: &R) -> Result<(), StorageError> {
        let timestamp = record.timestamp();
        self.backend.delete(timestamp).await?;
        self.log.remove_for(timestamp).await
    }

    /// Administrative reset: empties the table directly, bypassing the
    /// transaction log.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.backend.clear().await
    }
}

#[async_trait]
impl<R: DataRecord> ResourceManager for DataTable<R> {
    /// The table's mutations are already durable once inserted; commit
    /// only has to drop their protection.
    async fn commit(&self, txn: &TxnContext) -> Result<(), StorageError> {
        match self.log.clear().await {
            Ok(()) => Ok(()),
            Err(e) => {
                txn.fail(TxnError::CommitFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Undo all adds since the last commit: delete every record an
    /// outstanding log entry references (missing records are no-ops),
    /// then clear the log.
    async fn rollback(&self, _txn: &TxnContext) -> Result<(), StorageError> {
        for entry in self.log.entries().await? {
            self.backend.delete(entry.request_timestamp).await?;
        }
        self.log.clear().await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.backend.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::RequestedPackState;
    use crate::records::DeferredRequest;
    use crate::storage::memory::MemoryBackend;
    use crate::txn::TransactionManager;
    use serde_json::json;

    fn request(serial: &str) -> DeferredRequest {
        DeferredRequest::new(
            "PUT",
            format!("https://hub.example/pack/{serial}"),
            json!({"serial": serial}),
            RequestedPackState::Supplied,
            false,
            "de-DE",
        )
    }

    async fn open_table() -> (Arc<DataTable<DeferredRequest>>, Arc<TransactionLog>) {
        let log = Arc::new(
            TransactionLog::open(Box::new(MemoryBackend::new("transaction_log")))
                .await
                .unwrap(),
        );
        let table = Arc::new(
            DataTable::open(
                "deferred_requests",
                Box::new(MemoryBackend::new("deferred_requests")),
                log.clone(),
            )
            .await
            .unwrap(),
        );
        (table, log)
    }

    #[tokio::test]
    async fn test_add_assigns_increasing_timestamps() {
        let (table, _log) = open_table().await;

        let first = table.add(request("A")).await.unwrap();
        let second = table.add(request("B")).await.unwrap();

        assert!(second > first);
        assert_eq!(table.count().await.unwrap(), 2);
        assert_eq!(table.current_timestamp().await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_add_writes_log_entry_before_commit() {
        let (table, log) = open_table().await;

        let ts = table.add(request("A")).await.unwrap();

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request_timestamp, ts);
    }

    #[tokio::test]
    async fn test_add_same_timestamp_is_noop() {
        let (table, log) = open_table().await;

        let ts = table.add(request("A")).await.unwrap();
        let mut dup = request("B");
        dup.set_timestamp(ts);
        let ts2 = table.add(dup).await.unwrap();

        assert_eq!(ts2, ts);
        assert_eq!(table.count().await.unwrap(), 1);
        // No second log entry either.
        assert_eq!(log.count().await.unwrap(), 1);
        // The original record survives.
        let records = table.records().await.unwrap();
        assert_eq!(records[0].uri, "https://hub.example/pack/A");
    }

    #[tokio::test]
    async fn test_remove_deletes_record_and_log_entry() {
        let (table, log) = open_table().await;
        table.add(request("A")).await.unwrap();
        let record = table.records().await.unwrap().remove(0);

        table.remove(&record).await.unwrap();

        assert_eq!(table.count().await.unwrap(), 0);
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_record_is_noop() {
        let (table, _log) = open_table().await;
        let mut ghost = request("G");
        ghost.set_timestamp(404);

        table.remove(&ghost).await.unwrap();
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_clears_log_keeps_records() {
        let (table, log) = open_table().await;
        table.add(request("A")).await.unwrap();
        table.add(request("B")).await.unwrap();

        let txn = TransactionManager::new(table.clone());
        assert!(txn.commit().await);

        assert_eq!(table.count().await.unwrap(), 2);
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_deletes_uncommitted_records() {
        let (table, log) = open_table().await;
        table.add(request("A")).await.unwrap();
        let txn = TransactionManager::new(table.clone());
        assert!(txn.commit().await);

        // Two more adds in a new transaction, then roll it back.
        table.add(request("B")).await.unwrap();
        table.add(request("C")).await.unwrap();
        let txn = TransactionManager::new(table.clone());
        txn.rollback().await;

        let records = table.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].uri, "https://hub.example/pack/A");
        assert_eq!(log.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_with_dangling_log_entry_is_noop() {
        // A log entry without its record (crash between log-write and
        // insert) rolls back cleanly.
        let (table, log) = open_table().await;
        log.append(777).await.unwrap();

        let txn = TransactionManager::new(table.clone());
        txn.rollback().await;

        assert_eq!(log.count().await.unwrap(), 0);
        assert_eq!(table.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_bypasses_log() {
        let (table, log) = open_table().await;
        table.add(request("A")).await.unwrap();

        table.clear().await.unwrap();

        assert_eq!(table.count().await.unwrap(), 0);
        // Administrative clear leaves the log alone.
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_counter_resumes_from_existing_records() {
        let log = Arc::new(
            TransactionLog::open(Box::new(MemoryBackend::new("transaction_log")))
                .await
                .unwrap(),
        );
        let backend = MemoryBackend::new("deferred_requests");
        let mut seeded = request("OLD");
        seeded.set_timestamp(41);
        backend.insert_sync(seeded);

        let table = DataTable::open("deferred_requests", Box::new(backend), log)
            .await
            .unwrap();
        let ts = table.add(request("NEW")).await.unwrap();
        assert_eq!(ts, 42);
    }

    #[tokio::test]
    async fn test_replace_overwrites_in_place() {
        let (table, log) = open_table().await;
        table.add(request("A")).await.unwrap();
        let mut record = table.records().await.unwrap().remove(0);
        let log_count = log.count().await.unwrap();

        record.acknowledged = true;
        table.replace(record.clone()).await.unwrap();

        let records = table.records().await.unwrap();
        assert!(records[0].acknowledged);
        // Replace bypasses the log.
        assert_eq!(log.count().await.unwrap(), log_count);
    }
}
