//! Fire-and-forget audit sink.
//!
//! Producers push events into a bounded channel; a dedicated writer task
//! drains it into an [`AuditStore`]. Recording never blocks and never
//! fails from the caller's point of view: a full buffer or a failed write
//! is logged and the event is dropped. Audit completeness is best-effort.
//!
//! Operator-entered events go through [`AuditSink::submit`] instead, which
//! waits for buffer space and reports a stopped writer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Actor, NewAuditEvent};
use crate::store::AuditStore;
use crate::telemetry::metrics;

enum AuditMessage {
    Record(NewAuditEvent),
    /// Reply once everything queued before this message has been handled.
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle for submitting audit events.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditMessage>,
}

impl AuditSink {
    /// Start the writer task. It runs until every handle is dropped.
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = tokio::spawn(write_loop(store, rx));
        (Self { tx }, writer)
    }

    /// Submit an event without waiting for it to be written.
    pub fn record(
        &self,
        actor: Actor,
        action: &str,
        entity: &str,
        detail: impl Into<String>,
    ) {
        let event = NewAuditEvent {
            actor,
            action: action.to_string(),
            entity: entity.to_string(),
            detail: detail.into(),
        };
        if let Err(e) = self.tx.try_send(AuditMessage::Record(event)) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "buffer full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            warn!(action, entity, reason, "audit event dropped");
            metrics::audit_events().add(1, &[KeyValue::new("result", "dropped")]);
        }
    }

    /// Queue a manually entered event, waiting for buffer space.
    pub async fn submit(
        &self,
        actor: Actor,
        action: &str,
        entity: &str,
        detail: impl Into<String>,
    ) -> Result<()> {
        if action.trim().is_empty() || entity.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "audit events need an action and an entity".into(),
            ));
        }
        let event = NewAuditEvent {
            actor,
            action: action.trim().to_string(),
            entity: entity.trim().to_string(),
            detail: detail.into(),
        };
        self.tx
            .send(AuditMessage::Record(event))
            .await
            .map_err(|_| Error::Other("audit writer stopped".into()))
    }

    /// Wait until every event recorded before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditMessage::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn write_loop(store: Arc<dyn AuditStore>, mut rx: mpsc::Receiver<AuditMessage>) {
    let mut last: Option<DateTime<Utc>> = None;

    while let Some(message) = rx.recv().await {
        match message {
            AuditMessage::Record(new) => {
                // Wall clocks can step backwards; the trail must not.
                let now = Utc::now();
                let recorded_at = last.map_or(now, |prev| prev.max(now));
                last = Some(recorded_at);

                let event = new.into_event(recorded_at);
                match store.append_audit(&event).await {
                    Ok(()) => {
                        debug!(action = %event.action, entity = %event.entity, "audit event written");
                        metrics::audit_events().add(1, &[KeyValue::new("result", "written")]);
                    }
                    Err(e) => {
                        warn!(action = %event.action, entity = %event.entity, error = %e, "audit write failed");
                        metrics::audit_events().add(1, &[KeyValue::new("result", "failed")]);
                    }
                }
            }
            AuditMessage::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("audit writer stopped");
}
