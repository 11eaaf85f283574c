//! In-process job queue with visibility timeouts.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::JobQueue;
use crate::error::Result;
use crate::model::{Delivery, Job};

struct Message {
    job: Job,
    enqueued_at: DateTime<Utc>,
    read_ct: u32,
    visible_at: Instant,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    /// Keyed by message ID, so iteration is enqueue order.
    messages: BTreeMap<i64, Message>,
    dead: Vec<(Delivery, String)>,
}

/// Queue held in memory. Same delivery semantics as the Postgres queue,
/// minus durability across restarts.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    ready: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs stored and not yet acknowledged or dead-lettered, visible or not.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dead-lettered deliveries with their reasons.
    pub fn dead_letters(&self) -> Vec<(Delivery, String)> {
        self.inner.lock().dead.clone()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: &Job) -> Result<i64> {
        let msg_id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let msg_id = inner.next_id;
            inner.messages.insert(
                msg_id,
                Message {
                    job: job.clone(),
                    enqueued_at: Utc::now(),
                    read_ct: 0,
                    visible_at: Instant::now(),
                },
            );
            msg_id
        };
        self.ready.notify_one();
        Ok(msg_id)
    }

    async fn dequeue(&self, visibility_timeout: Duration) -> Result<Option<Delivery>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let next = inner
            .messages
            .iter_mut()
            .find(|(_, msg)| msg.visible_at <= now);
        Ok(next.map(|(&msg_id, msg)| {
            msg.read_ct += 1;
            msg.visible_at = now + visibility_timeout;
            Delivery {
                msg_id,
                job: msg.job.clone(),
                delivery_count: msg.read_ct,
                enqueued_at: msg.enqueued_at,
            }
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        // Acking twice, or after a redelivery was acked, is harmless.
        self.inner.lock().messages.remove(&delivery.msg_id);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.messages.remove(&delivery.msg_id).is_some() {
            inner.dead.push((delivery.clone(), reason.to_string()));
        }
        Ok(())
    }

    async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
    }
}
