// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite storage backend and service.
//!
//! The durability layer for equipment that must survive restarts with a
//! non-empty deferred queue. Records are stored as JSON rows keyed by
//! their timestamp; one database file holds all tables of a service.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::credentials::ClientCredentials;
use crate::records::{DataRecord, DeferredRequest, DeferredResult, TransactionLogEntry};

use super::log::TransactionLog;
use super::table::DataTable;
use super::traits::{DataManagementService, StorageError, TableBackend};

fn backend_err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SQLite-backed table backend.
pub struct SqliteBackend<R> {
    pool: SqlitePool,
    table: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> SqliteBackend<R> {
    /// Create the table if needed and wrap it.
    pub async fn open(pool: SqlitePool, table: &str) -> Result<Self, StorageError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (ts INTEGER PRIMARY KEY, body TEXT NOT NULL)"
        ))
        .execute(&pool)
        .await
        .map_err(backend_err)?;
        Ok(Self { pool, table: table.to_string(), _record: PhantomData })
    }
}

#[async_trait]
impl<R> TableBackend<R> for SqliteBackend<R>
where
    R: DataRecord + Serialize + DeserializeOwned,
{
    async fn insert(&self, record: R) -> Result<bool, StorageError> {
        let body = serde_json::to_string(&record)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (ts, body) VALUES (?, ?)",
            self.table
        ))
        .bind(record.timestamp() as i64)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn overwrite(&self, record: R) -> Result<bool, StorageError> {
        let body = serde_json::to_string(&record)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = sqlx::query(&format!("UPDATE {} SET body = ? WHERE ts = ?", self.table))
            .bind(body)
            .bind(record.timestamp() as i64)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, timestamp: u64) -> Result<bool, StorageError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE ts = ?", self.table))
            .bind(timestamp as i64)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn contains(&self, timestamp: u64) -> Result<bool, StorageError> {
        let row = sqlx::query(&format!("SELECT 1 FROM {} WHERE ts = ?", self.table))
            .bind(timestamp as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(row.is_some())
    }

    async fn all(&self) -> Result<Vec<R>, StorageError> {
        let rows = sqlx::query(&format!("SELECT body FROM {} ORDER BY ts", self.table))
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;
        rows.into_iter()
            .map(|row| {
                let body: String = row.try_get("body").map_err(backend_err)?;
                serde_json::from_str(&body).map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        let n: i64 = row.try_get("n").map_err(backend_err)?;
        Ok(n as usize)
    }

    async fn max_timestamp(&self) -> Result<u64, StorageError> {
        let row = sqlx::query(&format!("SELECT COALESCE(MAX(ts), 0) AS ts FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        let ts: i64 = row.try_get("ts").map_err(backend_err)?;
        Ok(ts as u64)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        // The pool belongs to the owning service.
        Ok(())
    }
}

/// SQLite-backed [`DataManagementService`]: one database file per hub
/// connection.
pub struct SqliteDataService {
    name: String,
    pool: SqlitePool,
    requests: Arc<DataTable<DeferredRequest>>,
    results: Arc<DataTable<DeferredResult>>,
    credentials: Arc<DataTable<ClientCredentials>>,
    log: Arc<TransactionLog>,
}

impl SqliteDataService {
    /// Open (or create) the database at `path` and its tables.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let url = format!("sqlite://{path_str}?mode=rwc");

        info!(path = %path_str, "opening sqlite data service");

        // Single writer: SQLite serializes writes anyway, and one
        // connection avoids busy errors under concurrent table access.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(backend_err)?;

        let log = Arc::new(
            TransactionLog::open(Box::new(
                SqliteBackend::<TransactionLogEntry>::open(pool.clone(), "transaction_log")
                    .await?,
            ))
            .await?,
        );
        let requests = Arc::new(
            DataTable::open(
                "deferred_requests",
                Box::new(
                    SqliteBackend::<DeferredRequest>::open(pool.clone(), "deferred_requests")
                        .await?,
                ),
                log.clone(),
            )
            .await?,
        );
        let results = Arc::new(
            DataTable::open(
                "deferred_results",
                Box::new(
                    SqliteBackend::<DeferredResult>::open(pool.clone(), "deferred_results")
                        .await?,
                ),
                log.clone(),
            )
            .await?,
        );
        let credentials = Arc::new(
            DataTable::open(
                "client_credentials",
                Box::new(
                    SqliteBackend::<ClientCredentials>::open(pool.clone(), "client_credentials")
                        .await?,
                ),
                log.clone(),
            )
            .await?,
        );

        Ok(Self { name: path_str, pool, requests, results, credentials, log })
    }
}

#[async_trait]
impl DataManagementService for SqliteDataService {
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
        self.pool.close().await;
        Ok(())
    }
}
