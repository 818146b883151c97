// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::ClientCredentials;
use crate::records::{DataRecord, DeferredRequest, DeferredResult};
use crate::txn::TxnContext;

use super::log::TransactionLog;
use super::table::DataTable;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("table '{0}' is closed")]
    Closed(String),
}

/// Commit/rollback/release seam the
/// [`TransactionManager`](crate::txn::TransactionManager) drives.
/// Implemented by [`DataTable`].
///
/// Implementations may flag an unrecoverable mid-commit failure on the
/// passed [`TxnContext`] instead of (or in addition to) returning an
/// error; the transaction manager reconciles either way.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn commit(&self, txn: &TxnContext) -> Result<(), StorageError>;
    async fn rollback(&self, txn: &TxnContext) -> Result<(), StorageError>;
    async fn close(&self) -> Result<(), StorageError>;
}

/// Dumb ordered storage for one record type. The transactional semantics
/// live in [`DataTable`]; a backend only has to keep records keyed and
/// sorted by timestamp.
#[async_trait]
pub trait TableBackend<R: DataRecord>: Send + Sync {
    /// Insert; returns `false` (and changes nothing) if the timestamp is
    /// already present.
    async fn insert(&self, record: R) -> Result<bool, StorageError>;

    /// Overwrite an existing record in place; returns `false` if absent.
    async fn overwrite(&self, record: R) -> Result<bool, StorageError>;

    /// Delete by timestamp; returns `false` if nothing was there.
    async fn delete(&self, timestamp: u64) -> Result<bool, StorageError>;

    async fn contains(&self, timestamp: u64) -> Result<bool, StorageError>;

    /// All records in ascending timestamp order.
    async fn all(&self) -> Result<Vec<R>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;

    /// Maximum stored timestamp, or 0 when empty.
    async fn max_timestamp(&self) -> Result<u64, StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    async fn close(&self) -> Result<(), StorageError>;
}

/// The tables of one hub connection, sharing a transaction log.
#[async_trait]
pub trait DataManagementService: Send + Sync {
    fn name(&self) -> &str;

    /// Queue of requests waiting to be forwarded.
    fn deferred_requests(&self) -> Arc<DataTable<DeferredRequest>>;

    /// Queue of results recovered from forwarded requests.
    fn deferred_results(&self) -> Arc<DataTable<DeferredResult>>;

    /// Outbound credentials per (organisation, location, equipment).
    fn credentials(&self) -> Arc<DataTable<ClientCredentials>>;

    fn transaction_log(&self) -> Arc<TransactionLog>;

    async fn close(&self) -> Result<(), StorageError>;
}
