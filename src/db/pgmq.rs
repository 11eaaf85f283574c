//! pgmq-backed job queue via direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive, pgmq.delete. pgmq's visibility timeout gives the
//! at-least-once contract: a read message that is never archived becomes
//! readable again once the timeout lapses, with `read_ct` incremented.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::postgres::PgListener;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::Db;
use crate::error::{Error, Result};
use crate::model::{Delivery, Job};
use crate::queue::JobQueue;
use crate::telemetry::metrics;

/// NOTIFY channel signalled on every enqueue.
const READY_CHANNEL: &str = "jobs_ready";

/// A durable job queue stored in Postgres by pgmq.
///
/// Dead letters go to a sibling queue named `<queue>_dlq`.
pub struct PgmqQueue {
    db: Arc<Db>,
    queue: String,
    dlq: String,
    ready: Arc<Notify>,
}

impl PgmqQueue {
    /// Create the queue and its dead-letter queue (idempotent).
    pub async fn create(db: Arc<Db>, queue: &str) -> Result<Self> {
        let dlq = format!("{queue}_dlq");
        for name in [queue, dlq.as_str()] {
            sqlx::query("SELECT pgmq.create($1)")
                .bind(name)
                .execute(db.pool())
                .await?;
            record_op(name, "create");
        }
        Ok(Self {
            db,
            queue: queue.to_string(),
            dlq,
            ready: Arc::new(Notify::new()),
        })
    }

    /// Start forwarding NOTIFY wake-ups to idle workers.
    ///
    /// Without this, workers fall back to polling at their poll interval.
    pub async fn listen(&self) -> Result<()> {
        let mut listener = PgListener::connect_with(self.db.pool()).await?;
        listener.listen(READY_CHANNEL).await?;
        let ready = Arc::clone(&self.ready);

        tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(n) => {
                        debug!(job_type = n.payload(), "notified of new job");
                        ready.notify_one();
                    }
                    Err(e) => {
                        warn!("PgListener error: {e}, falling back to poll");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl JobQueue for PgmqQueue {
    async fn enqueue(&self, job: &Job) -> Result<i64> {
        let message = serde_json::to_value(job)?;
        let mut tx = self.db.pool().begin().await?;

        let msg_id: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(&self.queue)
            .bind(&message)
            .bind(0i32)
            .fetch_one(&mut *tx)
            .await?;

        // NOTIFY is transactional, fires only on commit
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(READY_CHANNEL)
            .bind(&job.job_type)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        record_op(&self.queue, "send");
        Ok(msg_id.0)
    }

    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<Delivery>> {
        let vt = i32::try_from(visibility_timeout.as_secs()).unwrap_or(i32::MAX);
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >("SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)")
        .bind(&self.queue)
        .bind(vt)
        .fetch_optional(self.db.pool())
        .await?;

        record_op(
            &self.queue,
            if row.is_some() { "read" } else { "read_empty" },
        );

        let Some((msg_id, read_ct, enqueued_at, message)) = row else {
            return Ok(None);
        };

        match serde_json::from_value::<Job>(message) {
            Ok(job) => Ok(Some(Delivery {
                msg_id,
                job,
                delivery_count: u32::try_from(read_ct).unwrap_or(0),
                enqueued_at,
            })),
            Err(e) => {
                // Nothing can ever handle it; park it where an operator can look.
                warn!(msg_id, error = %e, "unparseable queue message, archiving");
                sqlx::query("SELECT pgmq.archive($1, $2)")
                    .bind(&self.queue)
                    .bind(msg_id)
                    .execute(self.db.pool())
                    .await?;
                record_op(&self.queue, "archive");
                Err(Error::Serialization(e))
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        // Archive rather than delete: completed jobs stay queryable.
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue)
            .bind(delivery.msg_id)
            .execute(self.db.pool())
            .await?;
        record_op(&self.queue, "archive");
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let message = serde_json::json!({
            "job": delivery.job,
            "msg_id": delivery.msg_id,
            "delivery_count": delivery.delivery_count,
            "reason": reason,
        });
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("SELECT pgmq.send($1, $2, 0)")
            .bind(&self.dlq)
            .bind(&message)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(&self.queue)
            .bind(delivery.msg_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        record_op(&self.dlq, "send");
        record_op(&self.queue, "delete");
        Ok(())
    }

    async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
    }
}

fn record_op(queue: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}
