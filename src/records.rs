// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Timestamped record types stored by the engine's tables.
//!
//! Every persisted entity implements [`DataRecord`]: a monotonically
//! increasing timestamp is both its primary key and its ordering key.
//! Records are created with timestamp 0 and receive their real value from
//! the owning table's counter on insert.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pack::RequestedPackState;
use crate::transport::HubResponse;

/// Anything a [`DataTable`](crate::storage::DataTable) can store.
pub trait DataRecord: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// Primary/ordering key. 0 means "not yet assigned".
    fn timestamp(&self) -> u64;

    /// Called by the owning table when it assigns the key on insert.
    fn set_timestamp(&mut self, timestamp: u64);
}

/// A complete pending outbound call, queued while the hub is unreachable.
///
/// Destroyed once the transaction that forwarded it successfully commits
/// and its record is removed, or by an explicit administrative clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredRequest {
    /// Assigned by the request table on insert.
    pub timestamp: u64,
    /// HTTP verb of the original call.
    pub verb: String,
    /// Fully resolved hub URI.
    pub uri: String,
    /// Request body as sent.
    pub body: Value,
    /// The state transition the caller asked for.
    pub requested_state: RequestedPackState,
    /// Whether the pack data was entered manually.
    pub is_manual: bool,
    /// Language tag for hub messages.
    pub language: String,
    /// Set once the hub has confirmed processing; acknowledged requests
    /// are skipped by recovery but kept until removed.
    pub acknowledged: bool,
}

impl DeferredRequest {
    pub fn new(
        verb: impl Into<String>,
        uri: impl Into<String>,
        body: Value,
        requested_state: RequestedPackState,
        is_manual: bool,
        language: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: 0,
            verb: verb.into(),
            uri: uri.into(),
            body,
            requested_state,
            is_manual,
            language: language.into(),
            acknowledged: false,
        }
    }
}

impl DataRecord for DeferredRequest {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

/// Outcome of a recovered deferred request, queued for the caller to
/// reconcile asynchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredResult {
    /// Assigned by the result table on insert.
    pub timestamp: u64,
    /// Timestamp of the deferred request this result answers.
    pub request_timestamp: u64,
    /// Pack state the hub reported after processing.
    pub reported_state: crate::pack::ReportedPackState,
    /// Hub operation code (0 = accepted).
    pub operation_code: u32,
    /// Optional human-readable hub message.
    pub message: Option<String>,
}

impl DeferredResult {
    /// Build a result from the hub response to a recovered request.
    pub fn from_response(request_timestamp: u64, response: &HubResponse) -> Self {
        Self {
            timestamp: 0,
            request_timestamp,
            reported_state: response.reported_state,
            operation_code: response.operation_code,
            message: response.message.clone(),
        }
    }
}

impl DataRecord for DeferredResult {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

/// One in-flight record inside an uncommitted transaction.
///
/// Removed on commit; on rollback the referenced record is deleted and
/// the entry cleared. An entry whose referenced record never became
/// visible is treated as already rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Assigned by the transaction log on append.
    pub timestamp: u64,
    /// Timestamp of the record this entry protects.
    pub request_timestamp: u64,
}

impl DataRecord for TransactionLogEntry {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::ReportedPackState;
    use serde_json::json;

    #[test]
    fn test_new_deferred_request_is_unacknowledged() {
        let req = DeferredRequest::new(
            "PUT",
            "https://hub.example/pack/1/state/supplied",
            json!({"serial": "S1"}),
            RequestedPackState::Supplied,
            false,
            "de-DE",
        );

        assert_eq!(req.timestamp, 0);
        assert!(!req.acknowledged);
        assert_eq!(req.verb, "PUT");
    }

    #[test]
    fn test_set_timestamp() {
        let mut req = DeferredRequest::new(
            "PUT",
            "uri",
            json!({}),
            RequestedPackState::Destroyed,
            true,
            "en-GB",
        );
        req.set_timestamp(42);
        assert_eq!(DataRecord::timestamp(&req), 42);
    }

    #[test]
    fn test_deferred_request_roundtrip() {
        let mut req = DeferredRequest::new(
            "POST",
            "https://hub.example/packs/bulk",
            json!({"packs": []}),
            RequestedPackState::Exported,
            false,
            "de-DE",
        );
        req.set_timestamp(7);

        let json = serde_json::to_string(&req).unwrap();
        let back: DeferredRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn test_result_from_response() {
        let response = HubResponse {
            reported_state: ReportedPackState::Supplied,
            operation_code: 0,
            message: Some("ok".into()),
        };
        let result = DeferredResult::from_response(99, &response);

        assert_eq!(result.request_timestamp, 99);
        assert_eq!(result.reported_state, ReportedPackState::Supplied);
        assert_eq!(result.operation_code, 0);
    }

    #[test]
    fn test_log_entry_references_record() {
        let entry = TransactionLogEntry { timestamp: 3, request_timestamp: 17 };
        assert_eq!(entry.request_timestamp, 17);

        let json = serde_json::to_string(&entry).unwrap();
        let back: TransactionLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
