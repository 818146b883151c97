// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory storage backend and service.
//!
//! Records live in a `BTreeMap` keyed by timestamp, which keeps iteration
//! in FIFO order for free. Used for equipment without durable local
//! storage and throughout the test suite.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::credentials::ClientCredentials;
use crate::records::{DataRecord, DeferredRequest, DeferredResult};

use super::log::TransactionLog;
use super::table::DataTable;
use super::traits::{DataManagementService, StorageError, TableBackend};

/// Ordered in-memory table backend.
pub struct MemoryBackend<R: DataRecord> {
    name: String,
    records: RwLock<BTreeMap<u64, R>>,
    closed: AtomicBool,
}

impl<R: DataRecord> MemoryBackend<R> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn guard(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Seed a record directly, bypassing the table layer.
    pub(crate) fn insert_sync(&self, record: R) {
        self.records.write().insert(record.timestamp(), record);
    }
}

#[async_trait]
impl<R: DataRecord> TableBackend<R> for MemoryBackend<R> {
    async fn insert(&self, record: R) -> Result<bool, StorageError> {
        self.guard()?;
        let mut records = self.records.write();
        if records.contains_key(&record.timestamp()) {
            return Ok(false);
        }
        records.insert(record.timestamp(), record);
        Ok(true)
    }

    async fn overwrite(&self, record: R) -> Result<bool, StorageError> {
        self.guard()?;
        let mut records = self.records.write();
        if !records.contains_key(&record.timestamp()) {
            return Ok(false);
        }
        records.insert(record.timestamp(), record);
        Ok(true)
    }

    async fn delete(&self, timestamp: u64) -> Result<bool, StorageError> {
        self.guard()?;
        Ok(self.records.write().remove(&timestamp).is_some())
    }

    async fn contains(&self, timestamp: u64) -> Result<bool, StorageError> {
        self.guard()?;
        Ok(self.records.read().contains_key(&timestamp))
    }

    async fn all(&self) -> Result<Vec<R>, StorageError> {
        self.guard()?;
        Ok(self.records.read().values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        self.guard()?;
        Ok(self.records.read().len())
    }

    async fn max_timestamp(&self) -> Result<u64, StorageError> {
        self.guard()?;
        Ok(self.records.read().keys().next_back().copied().unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.guard()?;
        self.records.write().clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Fully in-memory [`DataManagementService`].
pub struct MemoryDataService {
    name: String,
    requests: Arc<DataTable<DeferredRequest>>,
    results: Arc<DataTable<DeferredResult>>,
    credentials: Arc<DataTable<ClientCredentials>>,
    log: Arc<TransactionLog>,
}

impl MemoryDataService {
    pub async fn open(name: impl Into<String>) -> Result<Self, StorageError> {
        let name = name.into();
        let log = Arc::new(
            TransactionLog::open(Box::new(MemoryBackend::new("transaction_log"))).await?,
        );
        let requests = Arc::new(
            DataTable::open(
                "deferred_requests",
                Box::new(MemoryBackend::new("deferred_requests")),
                log.clone(),
            )
            .await?,
        );
        let results = Arc::new(
            DataTable::open(
                "deferred_results",
                Box::new(MemoryBackend::new("deferred_results")),
                log.clone(),
            )
            .await?,
        );
        let credentials = Arc::new(
            DataTable::open(
                "client_credentials",
                Box::new(MemoryBackend::new("client_credentials")),
                log.clone(),
            )
            .await?,
        );
        Ok(Self { name, requests, results, credentials, log })
    }
}

#[async_trait]
impl DataManagementService for MemoryDataService {
    fn name(&self) -> &str {
        &self.name
    }

    fn deferred_requests(&self) -> Arc<DataTable<DeferredRequest>> {
        self.requests.clone()
    }

    fn deferred_results(&self) -> Arc<DataTable<DeferredResult>> {
        self.results.clone()
    }

    fn credentials(&self) -> Arc<DataTable<ClientCredentials>> {
        self.credentials.clone()
    }

    fn transaction_log(&self) -> Arc<TransactionLog> {
        self.log.clone()
    }

    async fn close(&self) -> Result<(), StorageError> {
        use super::traits::ResourceManager;
        self.requests.close().await?;
        self.results.close().await?;
        self.credentials.close().await?;
        self.log.close().await
    }
}
