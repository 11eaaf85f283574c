//! Transmutation requests: persist, then hand off to the worker pool.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::*;
use crate::queue::JobQueue;
use crate::store::TransmutationStore;
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct TransmutationService {
    store: Arc<dyn TransmutationStore>,
    queue: Arc<dyn JobQueue>,
}

impl TransmutationService {
    pub fn new(store: Arc<dyn TransmutationStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Store a pending transmutation and enqueue its processing job.
    ///
    /// The row is committed before the job is sent, so a worker never sees
    /// a job for a row that does not exist yet. If the enqueue fails the
    /// error is returned and the row stays pending; [`Self::requeue`]
    /// recovers it.
    pub async fn create(&self, new: NewTransmutation) -> Result<Transmutation> {
        new.validate()?;
        let transmutation = new.into_transmutation();
        self.store.insert_transmutation(&transmutation).await?;

        if let Err(e) = self.enqueue(transmutation.id).await {
            warn!(
                transmutation = %transmutation.id,
                error = %e,
                "transmutation stored but not enqueued"
            );
            return Err(e);
        }

        info!(
            transmutation = %transmutation.id,
            name = %transmutation.name,
            cost = transmutation.cost,
            "transmutation requested"
        );
        Ok(transmutation)
    }

    /// Enqueue another processing job for a transmutation that is still
    /// pending.
    pub async fn requeue(&self, id: TransmutationId) -> Result<i64> {
        let transmutation = self.store.get_transmutation(id).await?;
        if transmutation.state.is_terminal() {
            return Err(Error::InvalidArgument(format!(
                "transmutation {id} is already {}",
                transmutation.state
            )));
        }
        let msg_id = self.enqueue(id).await?;
        info!(transmutation = %id, msg_id, "transmutation requeued");
        Ok(msg_id)
    }

    pub async fn get(&self, id: TransmutationId) -> Result<Transmutation> {
        self.store.get_transmutation(id).await
    }

    pub async fn list(
        &self,
        state: Option<TransmutationState>,
        limit: i64,
    ) -> Result<Vec<Transmutation>> {
        self.store.list_transmutations(state, limit).await
    }

    pub async fn count_pending(&self) -> Result<i64> {
        self.store.count_pending_transmutations().await
    }

    async fn enqueue(&self, id: TransmutationId) -> Result<i64> {
        let job = TransmutationJob {
            transmutation_id: id,
        }
        .into_job();
        let msg_id = self.queue.enqueue(&job).await?;
        metrics::jobs_enqueued().add(1, &[KeyValue::new("job_type", TRANSMUTATION_JOB)]);
        Ok(msg_id)
    }
}
