// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transaction log backing crash recovery for the data tables.
//!
//! One entry exists per record currently in flight inside an uncommitted
//! transaction. Commit clears the log; rollback deletes every referenced
//! record first. A log entry whose record never became visible (crash
//! between log-write and insert) is harmless: deleting a missing record
//! is a no-op, so recovery treats it as already rolled back.

use tracing::debug;

use crate::counter::TimestampCounter;
use crate::records::TransactionLogEntry;

use super::traits::{StorageError, TableBackend};

/// Service-wide transaction log, shared by all tables of one
/// [`DataManagementService`](super::traits::DataManagementService).
pub struct TransactionLog {
    backend: Box<dyn TableBackend<TransactionLogEntry>>,
    counter: TimestampCounter,
}

impl TransactionLog {
    /// Open the log over its backend, seeding the entry counter from the
    /// maximum persisted timestamp.
    pub async fn open(
        backend: Box<dyn TableBackend<TransactionLogEntry>>,
    ) -> Result<Self, StorageError> {
        let counter = TimestampCounter::new();
        counter.advance_to(backend.max_timestamp().await?);
        let pending = backend.count().await?;
        if pending > 0 {
            debug!(pending, "transaction log has entries from a previous run");
        }
        Ok(Self { backend, counter })
    }

    /// Append an entry protecting `request_timestamp`. Must happen before
    /// the protected record becomes visible.
    pub async fn append(&self, request_timestamp: u64) -> Result<u64, StorageError> {
        let timestamp = self.counter.next();
        self.backend
            .insert(TransactionLogEntry { timestamp, request_timestamp })
            .await?;
        Ok(timestamp)
    }

    /// Remove every entry referencing `request_timestamp`, if any.
    pub async fn remove_for(&self, request_timestamp: u64) -> Result<(), StorageError> {
        for entry in self.backend.all().await? {
            if entry.request_timestamp == request_timestamp {
                self.backend.delete(entry.timestamp).await?;
            }
        }
        Ok(())
    }

    /// Outstanding entries in append order.
    pub async fn entries(&self) -> Result<Vec<TransactionLogEntry>, StorageError> {
        self.backend.all().await
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        self.backend.count().await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.backend.clear().await
    }

    pub(crate) async fn close(&self) -> Result<(), StorageError> {
        self.backend.close().await
    }
}
