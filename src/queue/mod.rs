//! Job queue contract: durable, at-least-once delivery between producers and
//! the worker pool.
//!
//! A dequeued job stays invisible for its visibility timeout. If it is not
//! acknowledged in that window it becomes visible again and is redelivered
//! with a higher delivery count. Handlers must therefore tolerate duplicates.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Delivery, Job};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably store a job. Returns the queue's message ID.
    async fn enqueue(&self, job: &Job) -> Result<i64>;

    /// Take the next visible job, hiding it for `visibility_timeout`.
    /// Returns `None` if nothing is visible.
    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<Delivery>>;

    /// Acknowledge successful processing; the job is never redelivered.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Remove a job that can never succeed, keeping it for inspection.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Block until new work may be available, or `timeout` elapses.
    async fn wait(&self, timeout: Duration) {
        tokio::time::sleep(timeout).await;
    }
}
