//! Worker pool: a fixed number of workers, each taking one job at a time
//! from the queue and running it end-to-end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use super::{HandlerOutcome, HandlerRegistry};
use crate::error::Result;
use crate::model::Delivery;
use crate::queue::JobQueue;
use crate::telemetry::job::{record_disposition, record_state_transition, start_job_span};
use crate::telemetry::metrics;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of jobs processed concurrently.
    pub concurrency: usize,
    /// How long a dequeued job stays hidden from other workers.
    pub visibility_timeout: Duration,
    /// Poll interval fallback when no wake-up arrives.
    pub poll_interval: Duration,
    /// Deliveries after which a job is dead-lettered instead of retried.
    pub max_deliveries: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            max_deliveries: 5,
        }
    }
}

/// How a single delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handler applied the job; acknowledged.
    Completed,
    /// Job had already been applied by an earlier delivery; acknowledged.
    Redelivered,
    /// Removed from the queue without success.
    DeadLettered(String),
    /// Not acknowledged; the queue will redeliver it.
    Retry(String),
    /// Shutdown interrupted the handler; not acknowledged.
    Abandoned,
}

impl Disposition {
    fn label(&self) -> &'static str {
        match self {
            Disposition::Completed => "completed",
            Disposition::Redelivered => "redelivered",
            Disposition::DeadLettered(_) => "dead_lettered",
            Disposition::Retry(_) => "retry",
            Disposition::Abandoned => "abandoned",
        }
    }
}

/// The pool: listen for jobs, run handlers, acknowledge or leave for retry.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    registry: Arc<HandlerRegistry>,
    config: PoolConfig,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Clone for WorkerPool {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn JobQueue>, registry: Arc<HandlerRegistry>, config: PoolConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            registry,
            config,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Signal every worker to stop. In-flight jobs are abandoned without
    /// acknowledgment and will be redelivered by the queue.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run the workers until shutdown.
    pub async fn run(&self) -> Result<()> {
        let concurrency = self.config.concurrency.max(1);
        info!(concurrency, "worker pool started");

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            let pool = self.clone();
            let stop = self.shutdown.subscribe();
            workers.spawn(async move { pool.worker_loop(worker_id, stop).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("worker task panicked: {e}");
            }
        }

        info!("worker pool stopped");
        Ok(())
    }

    async fn worker_loop(&self, worker_id: usize, mut stop: watch::Receiver<bool>) {
        debug!(worker_id, "worker started");

        loop {
            if *stop.borrow() {
                break;
            }

            let idle = match self.next_delivery(&mut stop).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(worker_id, "queue error: {e}");
                    true
                }
            };

            if idle {
                // Wait for: shutdown, a wake-up from the queue, or poll timeout
                tokio::select! {
                    _ = stopped(&mut stop) => {}
                    _ = self.queue.wait(self.config.poll_interval) => {}
                }
            }
        }

        debug!(worker_id, "worker stopped");
    }

    /// Take and process one job, if one is visible.
    pub async fn process_one(&self) -> Result<Option<Disposition>> {
        let mut stop = self.shutdown.subscribe();
        self.next_delivery(&mut stop).await
    }

    async fn next_delivery(&self, stop: &mut watch::Receiver<bool>) -> Result<Option<Disposition>> {
        let Some(delivery) = self.queue.dequeue(self.config.visibility_timeout).await? else {
            return Ok(None);
        };

        let span = start_job_span(
            &delivery.job.job_type,
            delivery.msg_id,
            delivery.delivery_count,
        );
        let disposition = self
            .process(&delivery, stop)
            .instrument(span.clone())
            .await;

        record_disposition(&span, disposition.label());
        metrics::job_dispositions().add(
            1,
            &[
                KeyValue::new("job_type", delivery.job.job_type.clone()),
                KeyValue::new("disposition", disposition.label()),
            ],
        );
        Ok(Some(disposition))
    }

    async fn process(&self, delivery: &Delivery, stop: &mut watch::Receiver<bool>) -> Disposition {
        let job_type = delivery.job.job_type.as_str();

        if delivery.delivery_count > self.config.max_deliveries {
            let reason = format!(
                "gave up after {} deliveries",
                delivery.delivery_count - 1
            );
            return self.dead_letter(delivery, reason).await;
        }

        // Route to handler
        let Some(handler) = self.registry.get(job_type).cloned() else {
            warn!(job_type, "no handler for job type, dead-lettering");
            return self
                .dead_letter(delivery, format!("no handler for job type '{job_type}'"))
                .await;
        };

        record_state_transition(&tracing::Span::current(), "queued", "processing");
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = stopped(stop) => {
                info!(msg_id = delivery.msg_id, "shutdown during job, leaving for redelivery");
                return Disposition::Abandoned;
            }
            result = handler.handle(&delivery.job.payload) => result,
        };

        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "job.execute")],
        );

        match result {
            Ok(outcome) => {
                let disposition = match outcome {
                    HandlerOutcome::Applied => Disposition::Completed,
                    HandlerOutcome::AlreadyResolved => {
                        debug!(msg_id = delivery.msg_id, "redelivery of resolved job, acknowledging");
                        Disposition::Redelivered
                    }
                };
                if let Err(e) = self.queue.ack(delivery).await {
                    // The effect is committed; a redelivery will be a no-op.
                    error!(msg_id = delivery.msg_id, "ack failed: {e}");
                    return Disposition::Retry(format!("ack failed: {e}"));
                }
                record_state_transition(&tracing::Span::current(), "processing", "acked");
                disposition
            }
            Err(e) if e.is_permanent() => {
                error!(msg_id = delivery.msg_id, job_type, error = %e, "job failed permanently");
                self.dead_letter(delivery, e.to_string()).await
            }
            Err(e) => {
                warn!(
                    msg_id = delivery.msg_id,
                    job_type,
                    delivery = delivery.delivery_count,
                    error = %e,
                    "job failed, leaving for redelivery"
                );
                // Leave it unacked; the visibility timeout brings it back
                Disposition::Retry(e.to_string())
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: String) -> Disposition {
        if let Err(e) = self.queue.dead_letter(delivery, &reason).await {
            error!(msg_id = delivery.msg_id, "dead-letter failed: {e}");
            return Disposition::Retry(format!("dead-letter failed: {e}"));
        }
        record_state_transition(&tracing::Span::current(), "queued", "dead");
        Disposition::DeadLettered(reason)
    }
}

/// Resolves once shutdown has been signalled.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        // Sender gone: nobody can signal shutdown any more.
        std::future::pending::<()>().await;
    }
}
