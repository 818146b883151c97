// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for serihub.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `serihub_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `outcome`: delivered, deferred, suppressed, rejected, failed
//! - `circuit`: breaker name

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of one submission.
pub fn record_submission(outcome: &str) {
    counter!(
        "serihub_submissions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a validation failure by operation code.
pub fn record_validation_failure(code: u32) {
    counter!(
        "serihub_validation_failures_total",
        "code" => code.to_string()
    )
    .increment(1);
}

/// Record a request suppressed by the repeated-request window.
pub fn record_suppressed() {
    counter!("serihub_suppressed_requests_total").increment(1);
}

/// Record a request deferred for later forwarding.
pub fn record_deferred() {
    counter!("serihub_deferred_requests_total").increment(1);
}

/// Record one recovery pass over the deferred queue.
pub fn record_recovery_pass() {
    counter!("serihub_recovery_passes_total").increment(1);
}

/// Record one successfully recovered deferred request.
pub fn record_recovered() {
    counter!("serihub_recovered_requests_total").increment(1);
}

/// Record a failed recovery attempt (request stays queued).
pub fn record_recovery_failure() {
    counter!("serihub_recovery_failures_total").increment(1);
}

/// Record hub send latency.
pub fn record_send_latency(duration: Duration) {
    histogram!("serihub_send_seconds").record(duration.as_secs_f64());
}

/// Record a call rejected by the named circuit breaker.
pub fn record_circuit_rejection(circuit: &str) {
    counter!(
        "serihub_circuit_rejections_total",
        "circuit" => circuit.to_string()
    )
    .increment(1);
}

/// Set the current number of pending deferred requests.
pub fn set_pending_deferred(count: usize) {
    gauge!("serihub_pending_deferred_requests").set(count as f64);
}

/// Set the current number of recovered results awaiting reconciliation.
pub fn set_recovered_results(count: usize) {
    gauge!("serihub_recovered_results").set(count as f64);
}

/// Set the offline flag (1 = offline).
pub fn set_offline(offline: bool) {
    gauge!("serihub_offline").set(if offline { 1.0 } else { 0.0 });
}
