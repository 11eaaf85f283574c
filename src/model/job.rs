//! Queue payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TransmutationId;

/// Job type handled by the transmutation worker.
pub const TRANSMUTATION_JOB: &str = "process:transmutation";

/// A unit of work: a type tag that selects the handler, plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_type: String,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
        }
    }
}

/// One delivery of a job to a worker. The same job can be delivered more
/// than once until it is acknowledged.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue-assigned message ID; the acknowledgment handle.
    pub msg_id: i64,
    pub job: Job,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Payload of a [`TRANSMUTATION_JOB`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmutationJob {
    pub transmutation_id: TransmutationId,
}

impl TransmutationJob {
    pub fn into_job(self) -> Job {
        Job::new(
            TRANSMUTATION_JOB,
            serde_json::json!({ "transmutation_id": self.transmutation_id }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmutation_payload_has_minimal_shape() {
        let id = TransmutationId::new();
        let job = TransmutationJob {
            transmutation_id: id,
        }
        .into_job();
        assert_eq!(job.job_type, TRANSMUTATION_JOB);
        assert_eq!(job.payload["transmutation_id"], id.0.to_string());

        let back: TransmutationJob = serde_json::from_value(job.payload).unwrap();
        assert_eq!(back.transmutation_id, id);
    }
}
