// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder can collect these metrics.
//! With no recorder installed every call is a no-op.

use metrics::{describe_counter, describe_histogram};

/// Register all Zapline metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "zapline_events_total",
        "Raw webhook elements received, by provider"
    );
    describe_counter!(
        "zapline_messages_stored_total",
        "Messages persisted, by direction"
    );
    describe_counter!(
        "zapline_duplicates_total",
        "Redelivered messages recognized by provider id"
    );
    describe_counter!(
        "zapline_reconciled_total",
        "Provider echoes matched to a local outbound send"
    );
    describe_counter!(
        "zapline_dropped_total",
        "Elements not persisted, by reason"
    );
    describe_counter!(
        "zapline_status_updates_total",
        "Delivery status acknowledgements, by result"
    );
    describe_counter!(
        "zapline_merges_total",
        "Duplicate open conversations merged away"
    );
    describe_counter!(
        "zapline_collaborator_failures_total",
        "Broadcaster and provider failures, by collaborator"
    );
    describe_histogram!(
        "zapline_ingest_latency_seconds",
        "Time to ingest one webhook element"
    );
}

/// Record one raw element received from `provider`.
pub fn record_event(provider: &str) {
    metrics::counter!("zapline_events_total", "provider" => provider.to_string()).increment(1);
}

/// Record a newly stored message.
pub fn record_stored(direction: &str) {
    metrics::counter!("zapline_messages_stored_total", "direction" => direction.to_string())
        .increment(1);
}

pub fn record_duplicate() {
    metrics::counter!("zapline_duplicates_total").increment(1);
}

pub fn record_reconciled() {
    metrics::counter!("zapline_reconciled_total").increment(1);
}

/// Record an element that was not persisted (`no_contact_key`, `empty_artifact`, ...).
pub fn record_dropped(reason: &'static str) {
    metrics::counter!("zapline_dropped_total", "reason" => reason).increment(1);
}

/// Record a status acknowledgement outcome (`applied`, `unmatched`, `stale`, ...).
pub fn record_status_update(result: &'static str) {
    metrics::counter!("zapline_status_updates_total", "result" => result).increment(1);
}

/// Record `count` duplicate conversations merged away.
pub fn record_merges(count: usize) {
    metrics::counter!("zapline_merges_total").increment(count as u64);
}

pub fn record_collaborator_failure(collaborator: &'static str) {
    metrics::counter!("zapline_collaborator_failures_total", "collaborator" => collaborator)
        .increment(1);
}

/// Record how long one element took to ingest.
pub fn record_ingest_latency(seconds: f64) {
    metrics::histogram!("zapline_ingest_latency_seconds").record(seconds);
}
