//! Job execution span helpers.

use tracing::Span;

/// Start a span covering one delivery of a job.
///
/// `job.disposition` is declared empty and filled in once the delivery has
/// been acked, dead-lettered or left for redelivery.
pub fn start_job_span(job_type: &str, msg_id: i64, delivery_count: u32) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.type" = job_type,
        "job.msg_id" = msg_id,
        "job.delivery" = delivery_count,
        "job.disposition" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}

/// Record how a delivery ended.
pub fn record_disposition(span: &Span, disposition: &str) {
    span.record("job.disposition", disposition);
}
