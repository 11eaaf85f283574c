//! Metric instrument factories for athanor.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"athanor"` meter; with no
//! provider installed they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("athanor")
}

/// Counter: stock adjustments.
/// Labels: `result` ("ok" | "insufficient_stock" | "not_found" | "error").
pub fn stock_adjustments() -> Counter<u64> {
    meter()
        .u64_counter("athanor.ledger.adjustments")
        .with_description("Number of stock adjustments attempted")
        .build()
}

/// Counter: jobs handed to the queue by producers.
/// Labels: `job_type`.
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("athanor.jobs.enqueued")
        .with_description("Number of jobs enqueued")
        .build()
}

/// Counter: what the worker pool did with each delivery.
/// Labels: `job_type`, `disposition`.
pub fn job_dispositions() -> Counter<u64> {
    meter()
        .u64_counter("athanor.jobs.dispositions")
        .with_description("Number of job deliveries by disposition")
        .build()
}

/// Counter: queue-level operations (send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("athanor.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: audit events by fate.
/// Labels: `result` ("written" | "dropped" | "failed").
pub fn audit_events() -> Counter<u64> {
    meter()
        .u64_counter("athanor.audit.events")
        .with_description("Number of audit events by outcome")
        .build()
}

/// Counter: anomalies reported by the periodic monitor.
/// Labels: `kind`.
pub fn anomalies_detected() -> Counter<u64> {
    meter()
        .u64_counter("athanor.monitor.anomalies")
        .with_description("Number of anomalies reported by the monitor")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("athanor.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
