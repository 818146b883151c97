// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Circuit breaker for the hub connection, using the recloser crate.
//!
//! When the hub is down, every caller paying the full transport timeout
//! (plus retries) per request would stall the site; the breaker fails
//! fast instead, and a rejected call classifies as a connectivity
//! failure, so it defers like any other outage.
//!
//! States:
//! - Closed: normal operation, requests pass through
//! - Open: hub unhealthy, requests fail-fast without attempting
//! - HalfOpen: testing recovery, limited requests allowed

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open).
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Configuration for the hub circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Failure rate over the rolling window that trips the circuit.
    pub error_rate: f32,
    /// Rolling window of calls evaluated in the closed state.
    pub window: usize,
    /// Number of successes in half-open to close the circuit.
    pub success_threshold: u32,
    /// How long to wait before attempting recovery (half-open).
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.5,
            window: 20,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Fast trip and recovery for testing.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            error_rate: 0.5,
            window: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// A named circuit breaker with call statistics.
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.error_rate)
            .closed_len(config.window)
            .half_open_len(config.success_threshold as usize)
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitConfig::default())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `fut` through the breaker.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, CircuitError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        match self.inner.call(fut).await {
            Ok(value) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, "call rejected, circuit open");
                crate::metrics::record_circuit_rejection(&self.name);
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// (total, successes, failures, rejections)
    #[must_use]
    pub fn stats(&self) -> (u64, u64, u64, u64) {
        (
            self.calls_total.load(Ordering::Relaxed),
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.rejections.load(Ordering::Relaxed),
        )
    }
}
