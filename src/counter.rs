// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Monotonic timestamp generation.
//!
//! Every record type owns one [`TimestampCounter`]; the value doubles as
//! primary key and ordering key for its table. Values are never reused and
//! never decrease, except across the explicit wrap from `u64::MAX` to 1.
//!
//! The critical section is O(1) by contract: callers must never hold the
//! counter while touching storage.

use parking_lot::Mutex;

/// Process-wide monotonic counter for one record type.
///
/// # Example
///
/// ```
/// use serihub::counter::TimestampCounter;
///
/// let counter = TimestampCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
///
/// counter.advance_to(100);
/// assert_eq!(counter.next(), 101);
/// ```
#[derive(Debug, Default)]
pub struct TimestampCounter {
    last: Mutex<u64>,
}

impl TimestampCounter {
    #[must_use]
    pub fn new() -> Self {
        Self { last: Mutex::new(0) }
    }

    /// Next timestamp. Wraps to 1 on overflow, never returns 0.
    pub fn next(&self) -> u64 {
        let mut last = self.last.lock();
        *last = if *last == u64::MAX { 1 } else { *last + 1 };
        *last
    }

    /// Raise the counter so subsequent values exceed `timestamp`.
    ///
    /// Used when a table is opened: the store's maximum persisted
    /// timestamp seeds the counter so values keep increasing across
    /// process restarts. Lower values are ignored.
    pub fn advance_to(&self, timestamp: u64) {
        let mut last = self.last.lock();
        if timestamp > *last {
            *last = timestamp;
        }
    }

    /// Most recently issued (or seeded) value; 0 before first use.
    #[must_use]
    pub fn last(&self) -> u64 {
        *self.last.lock()
    }
}
