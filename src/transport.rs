// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hub transport boundary.
//!
//! The concrete HTTP client talking to the national system lives outside
//! this crate; the engine only sees [`HubTransport`]. The error taxonomy
//! matters more than the wire format here: only failures classified as
//! connectivity-related may trigger deferral.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::credentials::ClientCredentials;
use crate::pack::{DataEntryMode, PackIdentifier, ReportedPackState, RequestedPackState};
use crate::records::DeferredRequest;

/// Transport-level failure, classified for the deferral decision.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The hub or the network path to it is down.
    #[error("hub unreachable: {0}")]
    Unreachable(String),

    /// No response within the transport's own deadline.
    #[error("hub request timed out after {0:?}")]
    Timeout(Duration),

    /// The engine's circuit breaker rejected the call without trying.
    #[error("hub circuit open, request not attempted")]
    CircuitOpen,

    /// The identity server or the hub refused the credentials.
    #[error("authorization rejected: {0}")]
    Authorization(String),

    /// The hub processed the request and said no.
    #[error("hub rejected request: {code} {message}")]
    Rejected { code: u32, message: String },
}

impl TransportError {
    /// Only connectivity failures are eligible for store-and-forward.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout(_) | Self::CircuitOpen
        )
    }
}

/// One outbound call, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HubRequest {
    pub verb: String,
    pub uri: String,
    pub body: Value,
    pub language: String,
    /// Credentials selected for this connection, if any were registered.
    pub credentials: Option<ClientCredentials>,
}

impl HubRequest {
    /// Build the state-change call for a single (already validated,
    /// normalized) pack.
    pub fn pack_state(
        base_url: &str,
        pack: &PackIdentifier,
        state: RequestedPackState,
        entry_mode: DataEntryMode,
        language: &str,
    ) -> Self {
        let uri = format!(
            "{}product/{}/pack/{}/state/{}",
            base_url,
            pack.product_code,
            pack.serial_number,
            state.path_segment()
        );
        let body = json!({
            "scheme": pack.scheme,
            "productCode": pack.product_code,
            "serialNumber": pack.serial_number,
            "batchId": pack.batch_id,
            "expiryDate": pack.expiry_date,
            "dataEntryMode": entry_mode,
        });
        Self {
            verb: "PUT".into(),
            uri,
            body,
            language: language.into(),
            credentials: None,
        }
    }

    /// Build the bulk state-change call for a collection of packs.
    pub fn bulk_state(
        base_url: &str,
        packs: &[PackIdentifier],
        state: RequestedPackState,
        entry_mode: DataEntryMode,
        language: &str,
    ) -> Self {
        let uri = format!("{}packs/state/{}", base_url, state.path_segment());
        let body = json!({
            "numberOfPacks": packs.len(),
            "dataEntryMode": entry_mode,
            "packs": packs,
        });
        Self {
            verb: "POST".into(),
            uri,
            body,
            language: language.into(),
            credentials: None,
        }
    }

    /// Reconstruct the original call from a deferred record for retry.
    pub fn from_deferred(deferred: &DeferredRequest) -> Self {
        Self {
            verb: deferred.verb.clone(),
            uri: deferred.uri.clone(),
            body: deferred.body.clone(),
            language: deferred.language.clone(),
            credentials: None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<ClientCredentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Hub acknowledgement of a processed request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HubResponse {
    /// Pack state as known to the hub after processing.
    pub reported_state: ReportedPackState,
    /// Hub operation code (0 = accepted).
    pub operation_code: u32,
    pub message: Option<String>,
}

impl HubResponse {
    /// A plain acknowledgement carrying the reported state.
    #[must_use]
    pub fn accepted(reported_state: ReportedPackState) -> Self {
        Self { reported_state, operation_code: 0, message: None }
    }
}

/// The out-of-scope HTTP client implements this.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Perform one call. The transport owns per-attempt timeouts; the
    /// engine owns retries and deferral.
    async fn send(&self, request: &HubRequest) -> Result<HubResponse, TransportError>;
}
