// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # serihub
//!
//! Client-side resilience engine for a national pack-serialization hub.
//! Equipment at healthcare sites reports pack state changes to a central
//! verification service; when the hub or the network is down, requests
//! are queued locally and forwarded later without loss, duplication or
//! reordering.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Validation Engine                       │
//! │  • GS1 / IFA scheme rules, checksum, normalization          │
//! │  • Bulk rules: counts, duplicates, size limit               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Forward Engine                         │
//! │  • Repeated-request suppression window                      │
//! │  • Retry + circuit breaker around hub sends                 │
//! │  • Offline detection, store-and-forward events              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (connectivity failure)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Transactional Record Store                    │
//! │  • DataTable + shared transaction log (crash recovery)      │
//! │  • TransactionManager commit/rollback semantics             │
//! │  • Memory and SQLite backends                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (recovery task: poll / manual)
//!                              ▼
//!                        national hub
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serihub::config::EngineConfig;
//! use serihub::engine::ForwardEngine;
//! use serihub::pack::{CodingScheme, DataEntryMode, PackIdentifier, RequestedPackState};
//! use serihub::storage::SqliteDataService;
//! # use serihub::transport::{HubRequest, HubResponse, HubTransport, TransportError};
//! # struct HttpTransport;
//! # #[async_trait::async_trait]
//! # impl HubTransport for HttpTransport {
//! #     async fn send(&self, _: &HubRequest) -> Result<HubResponse, TransportError> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EngineConfig {
//!         connection_identifier: "org1/berlin/scanner-1".into(),
//!         base_url: "https://hub.example/v1".into(),
//!         ..Default::default()
//!     };
//!
//!     let service = Arc::new(
//!         SqliteDataService::open("./serihub.db").await.expect("storage"),
//!     );
//!     let engine = Arc::new(ForwardEngine::new(config, service, Arc::new(HttpTransport)));
//!     engine.start();
//!
//!     let pack = PackIdentifier::new(CodingScheme::Gs1, "04012345123456", "SERIAL001")
//!         .with_batch("LOT42")
//!         .with_expiry("271200");
//!     let outcome = engine
//!         .report_pack_state(pack, RequestedPackState::Supplied, DataEntryMode::Scanner, "de-DE")
//!         .await;
//!     println!("{}", outcome.label());
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the [`ForwardEngine`] orchestrating all components
//! - [`validation`]: pack identifier and bulk request rules
//! - [`storage`]: record store contracts, transaction log, backends
//! - [`txn`]: transaction manager with commit/rollback semantics
//! - [`credentials`]: client credentials repository
//! - [`transport`]: hub transport boundary
//! - [`resilience`]: retry, circuit breaker, health tracking
//! - [`config`]: engine configuration

pub mod config;
pub mod counter;
pub mod credentials;
pub mod engine;
pub mod metrics;
pub mod pack;
pub mod records;
pub mod resilience;
pub mod storage;
pub mod transport;
pub mod txn;
pub mod validation;

pub use config::{EngineConfig, StoreAndForwardMode};
pub use credentials::{ClientCredentials, ConnectionKey, CredentialsService};
pub use engine::{
    DeferredStats, EngineHealth, EngineListener, ForwardEngine, RecoveryReport,
    StoreAndForwardEvent, SubmitOutcome,
};
pub use pack::{
    CodingScheme, DataEntryMode, PackIdentifier, ReportedPackState, RequestedPackState,
};
pub use records::{DataRecord, DeferredRequest, DeferredResult, TransactionLogEntry};
pub use storage::{
    DataManagementService, DataTable, MemoryDataService, ResourceManager, SqliteDataService,
    StorageError, TransactionLog,
};
pub use transport::{HubRequest, HubResponse, HubTransport, TransportError};
pub use txn::{TransactionManager, TransactionState, TxnContext, TxnError, TxnErrorSink, TxnOutcome};
pub use validation::{codes, validate_bulk, validate_pack, ValidationOutcome};
