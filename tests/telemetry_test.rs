//! Integration tests for telemetry initialization and span helpers.

use athanor::telemetry::job::{record_disposition, record_state_transition, start_job_span};
use athanor::telemetry::metrics;
use opentelemetry::KeyValue;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // init returns Err, which is fine here.
    let config = athanor::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "athanor-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = athanor::telemetry::init_telemetry(config);
}

#[test]
fn job_span_records_transitions_and_disposition() {
    let span = start_job_span("process:transmutation", 7, 1);
    record_state_transition(&span, "queued", "processing");
    record_disposition(&span, "completed");
}

#[test]
fn metric_factories_work_without_a_provider() {
    metrics::stock_adjustments().add(1, &[KeyValue::new("result", "ok")]);
    metrics::jobs_enqueued().add(1, &[KeyValue::new("job_type", "process:transmutation")]);
    metrics::anomalies_detected().add(1, &[KeyValue::new("kind", "stock")]);
    metrics::operation_duration_ms().record(1.5, &[KeyValue::new("operation", "test")]);
}
