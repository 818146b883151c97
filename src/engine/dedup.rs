// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Repeated-request suppression.
//!
//! Two identical state transitions for the same pack within the window
//! are almost always a double scan; the second one is short-circuited
//! before any network call or deferral. Keys compare normalized field
//! values: suppression runs after validation, so equal keys mean equal
//! transitions from the hub's point of view.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::pack::{CodingScheme, DataEntryMode, PackIdentifier, RequestedPackState};

/// Composite value-equality key over one single-pack request. Every field
/// must match exactly for two requests to count as repeats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecentRequestKey {
    pub scheme: CodingScheme,
    pub requested_state: RequestedPackState,
    pub product_code: String,
    pub serial_number: String,
    pub batch_id: Option<String>,
    pub expiry_date: Option<String>,
    pub data_entry_mode: DataEntryMode,
    pub language: String,
}

impl RecentRequestKey {
    /// Key of a (validated, normalized) pack request.
    pub fn from_pack(
        pack: &PackIdentifier,
        requested_state: RequestedPackState,
        data_entry_mode: DataEntryMode,
        language: &str,
    ) -> Self {
        Self {
            scheme: pack.scheme,
            requested_state,
            product_code: pack.product_code.clone(),
            serial_number: pack.serial_number.clone(),
            batch_id: pack.batch_id.clone(),
            expiry_date: pack.expiry_date.clone(),
            data_entry_mode,
            language: language.to_string(),
        }
    }
}

/// Sliding-window registry of recently accepted requests.
#[derive(Debug, Default)]
pub struct RecentRequestWindow {
    seen: DashMap<RecentRequestKey, Instant>,
}

impl RecentRequestWindow {
    #[must_use]
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    /// Returns `true` when an identical key was accepted within `window`;
    /// otherwise records the key (refreshing any expired entry) and
    /// returns `false`. Expired entries are pruned on the way.
    pub fn check_and_record(&self, key: RecentRequestKey, window: Duration) -> bool {
        self.seen.retain(|_, seen_at| seen_at.elapsed() < window);
        if let Some(seen_at) = self.seen.get(&key) {
            if seen_at.elapsed() < window {
                return true;
            }
        }
        self.seen.insert(key, Instant::now());
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&self) {
        self.seen.clear();
    }
}
