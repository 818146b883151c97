// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client credentials repository.
//!
//! Outbound credentials are keyed by (organisation, location, equipment)
//! and selected per connection before each hub call. Secrets are
//! encrypted by the storage backend, never here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::records::DataRecord;
use crate::storage::{DataTable, StorageError};

/// Credentials of one piece of equipment at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    /// Assigned by the credentials table on insert.
    pub timestamp: u64,
    pub organisation: String,
    pub location: String,
    pub equipment: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(
        organisation: impl Into<String>,
        location: impl Into<String>,
        equipment: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: 0,
            organisation: organisation.into(),
            location: location.into(),
            equipment: equipment.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey {
            organisation: self.organisation.clone(),
            location: self.location.clone(),
            equipment: self.equipment.clone(),
        }
    }
}

impl DataRecord for ClientCredentials {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

/// Unique identity of a connection: `organisation/location/equipment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub organisation: String,
    pub location: String,
    pub equipment: String,
}

impl ConnectionKey {
    pub fn new(
        organisation: impl Into<String>,
        location: impl Into<String>,
        equipment: impl Into<String>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            location: location.into(),
            equipment: equipment.into(),
        }
    }

    /// Parse a connection identifier of the form `org/location/equipment`.
    #[must_use]
    pub fn parse(identifier: &str) -> Option<Self> {
        let mut parts = identifier.splitn(3, '/');
        let organisation = parts.next()?.trim();
        let location = parts.next()?.trim();
        let equipment = parts.next()?.trim();
        if organisation.is_empty() || location.is_empty() || equipment.is_empty() {
            return None;
        }
        Some(Self::new(organisation, location, equipment))
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organisation, self.location, self.equipment)
    }
}

/// Keyed and grouped lookups over the credentials table.
pub struct CredentialsService {
    table: Arc<DataTable<ClientCredentials>>,
}

impl CredentialsService {
    #[must_use]
    pub fn new(table: Arc<DataTable<ClientCredentials>>) -> Self {
        Self { table }
    }

    /// Insert or update the credentials for their key. An existing record
    /// keeps its timestamp; otherwise the table assigns one.
    pub async fn add(&self, credentials: ClientCredentials) -> Result<u64, StorageError> {
        if let Some(existing) = self.find(&credentials.key()).await? {
            let mut updated = credentials;
            updated.timestamp = existing.timestamp;
            self.table.replace(updated).await?;
            Ok(existing.timestamp)
        } else {
            self.table.add(credentials).await
        }
    }

    /// Remove the credentials for `key`; returns whether anything was
    /// removed.
    pub async fn remove(&self, key: &ConnectionKey) -> Result<bool, StorageError> {
        match self.find(key).await? {
            Some(existing) => {
                self.table.remove(&existing).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.table.clear().await
    }

    /// Exact lookup by (organisation, location, equipment).
    pub async fn find(&self, key: &ConnectionKey) -> Result<Option<ClientCredentials>, StorageError> {
        Ok(self
            .table
            .records()
            .await?
            .into_iter()
            .find(|c| c.key() == *key))
    }

    /// Lookup by a `org/location/equipment` connection identifier.
    pub async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<ClientCredentials>, StorageError> {
        match ConnectionKey::parse(identifier) {
            Some(key) => self.find(&key).await,
            None => Ok(None),
        }
    }

    /// All credentials of one organisation.
    pub async fn by_organisation(
        &self,
        organisation: &str,
    ) -> Result<Vec<ClientCredentials>, StorageError> {
        Ok(self
            .table
            .records()
            .await?
            .into_iter()
            .filter(|c| c.organisation == organisation)
            .collect())
    }

    /// All credentials of one location within an organisation.
    pub async fn by_location(
        &self,
        organisation: &str,
        location: &str,
    ) -> Result<Vec<ClientCredentials>, StorageError> {
        Ok(self
            .table
            .records()
            .await?
            .into_iter()
            .filter(|c| c.organisation == organisation && c.location == location)
            .collect())
    }

    /// All credentials registered for one equipment id, across locations.
    pub async fn by_equipment(
        &self,
        equipment: &str,
    ) -> Result<Vec<ClientCredentials>, StorageError> {
        Ok(self
            .table
            .records()
            .await?
            .into_iter()
            .filter(|c| c.equipment == equipment)
            .collect())
    }
}
