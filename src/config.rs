// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the forwarding engine.
//!
//! # Example
//!
//! ```
//! use serihub::config::{EngineConfig, StoreAndForwardMode};
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.recovery_poll_interval_ms, 300_000);
//! assert_eq!(config.store_and_forward_mode, StoreAndForwardMode::Automatic);
//!
//! // Full config
//! let config = EngineConfig {
//!     connection_identifier: "org1/berlin/scanner-1".into(),
//!     base_url: "https://hub.example/v1".into(),
//!     detect_repeated_single_pack_requests: true,
//!     repeated_single_pack_requests_window_secs: 30,
//!     ..Default::default()
//! };
//! assert_eq!(config.hub_base(), "https://hub.example/v1/");
//! ```

use serde::Deserialize;

/// How failures to reach the hub are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreAndForwardMode {
    /// Deferred requests are retried transparently on a timer.
    Automatic,
    /// The caller explicitly triggers retry of deferred requests.
    Manual,
    /// Failures propagate directly; nothing is deferred.
    None,
}

impl std::fmt::Display for StoreAndForwardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "AUTOMATIC"),
            Self::Manual => write!(f, "MANUAL"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Upper bound applied when `max_bulk_pack_count` is left at 0.
pub const DEFAULT_MAX_BULK_PACK_COUNT: usize = 500_000;

/// Configuration for the forwarding engine.
///
/// All fields have defaults; at minimum `base_url` and
/// `connection_identifier` should be set for production use.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Connection identity: `organisation/location/equipment`.
    #[serde(default)]
    pub connection_identifier: String,

    /// Hub base URL; a trailing "/" is appended when missing.
    #[serde(default)]
    pub base_url: String,

    /// Identity server issuing outbound tokens.
    #[serde(default)]
    pub identity_server_url: String,

    #[serde(default = "default_store_and_forward_mode")]
    pub store_and_forward_mode: StoreAndForwardMode,

    /// Recovery poll interval in milliseconds (AUTOMATIC mode).
    #[serde(default = "default_recovery_poll_interval_ms")]
    pub recovery_poll_interval_ms: u64,

    /// Extra send attempts after the first failed one.
    #[serde(default)]
    pub retry_count: u32,

    /// Delay between send attempts in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Maximum packs per bulk request; 0 means "use system default".
    #[serde(default = "default_max_bulk_pack_count")]
    pub max_bulk_pack_count: usize,

    /// Explode offline bulk requests into one deferred request per pack.
    #[serde(default)]
    pub store_and_forward_bulk_requests: bool,

    /// Suppress repeated identical single-pack requests.
    #[serde(default)]
    pub detect_repeated_single_pack_requests: bool,

    /// Sliding window for repeated-request suppression, in seconds.
    #[serde(default = "default_repeated_window_secs")]
    pub repeated_single_pack_requests_window_secs: u64,
}

fn default_store_and_forward_mode() -> StoreAndForwardMode {
    StoreAndForwardMode::Automatic
}
fn default_recovery_poll_interval_ms() -> u64 {
    300_000 // 5 minutes
}
fn default_retry_interval_ms() -> u64 {
    10_000
}
fn default_max_bulk_pack_count() -> usize {
    DEFAULT_MAX_BULK_PACK_COUNT
}
fn default_repeated_window_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_identifier: String::new(),
            base_url: String::new(),
            identity_server_url: String::new(),
            store_and_forward_mode: default_store_and_forward_mode(),
            recovery_poll_interval_ms: default_recovery_poll_interval_ms(),
            retry_count: 0,
            retry_interval_ms: default_retry_interval_ms(),
            max_bulk_pack_count: default_max_bulk_pack_count(),
            store_and_forward_bulk_requests: false,
            detect_repeated_single_pack_requests: false,
            repeated_single_pack_requests_window_secs: default_repeated_window_secs(),
        }
    }
}

impl EngineConfig {
    /// Base URL with the trailing "/" guaranteed.
    #[must_use]
    pub fn hub_base(&self) -> String {
        if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        }
    }

    /// Bulk size limit with the 0-means-default rule applied.
    #[must_use]
    pub fn effective_max_bulk_pack_count(&self) -> usize {
        if self.max_bulk_pack_count == 0 {
            DEFAULT_MAX_BULK_PACK_COUNT
        } else {
            self.max_bulk_pack_count
        }
    }
}
