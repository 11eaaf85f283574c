//! Audit sink delivery guarantees.

use std::sync::Arc;

use async_trait::async_trait;
use athanor::audit::AuditSink;
use athanor::error::{Error, Result};
use athanor::model::{Actor, AuditEvent};
use athanor::store::AuditStore;
use athanor::store::memory::MemoryStore;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

#[tokio::test]
async fn flush_waits_for_recorded_events() {
    let store = Arc::new(MemoryStore::new());
    let (audit, _writer) = AuditSink::spawn(store.clone(), 64);

    for i in 0..10 {
        audit.record(Actor::System, "test", "material", format!("event {i}"));
    }
    audit.flush().await;

    let events = store.list_audit(100).await.unwrap();
    assert_eq!(events.len(), 10);
    assert_eq!(events[0].detail, "event 9");
}

#[tokio::test]
async fn timestamps_never_go_backwards() {
    let store = Arc::new(MemoryStore::new());
    let (audit, _writer) = AuditSink::spawn(store.clone(), 1024);

    for i in 0..200 {
        audit.record(Actor::System, "tick", "material", i.to_string());
    }
    audit.flush().await;

    let events = store.list_audit(1000).await.unwrap();
    assert_eq!(events.len(), 200);
    // Newest first, so read it oldest first.
    let oldest_first: Vec<_> = events.iter().rev().collect();
    for pair in oldest_first.windows(2) {
        assert!(pair[0].recorded_at <= pair[1].recorded_at);
    }
}

struct FailingStore;

#[async_trait]
impl AuditStore for FailingStore {
    async fn append_audit(&self, _event: &AuditEvent) -> Result<()> {
        Err(Error::Other("audit table unavailable".into()))
    }

    async fn list_audit(&self, _limit: i64) -> Result<Vec<AuditEvent>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn write_failures_stay_inside_the_sink() {
    let (audit, writer) = AuditSink::spawn(Arc::new(FailingStore), 8);

    audit.record(Actor::System, "stock_adjusted", "material", "lost");
    audit.flush().await;

    // The writer survives failed writes.
    assert!(!writer.is_finished());
    audit.record(Actor::System, "stock_adjusted", "material", "also lost");
    audit.flush().await;
}

/// Holds every write until released.
struct GatedStore {
    entered: Notify,
    gate: Semaphore,
    written: Mutex<Vec<String>>,
}

#[async_trait]
impl AuditStore for GatedStore {
    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::Other(e.to_string()))?;
        permit.forget();
        self.written.lock().push(event.detail.clone());
        Ok(())
    }

    async fn list_audit(&self, _limit: i64) -> Result<Vec<AuditEvent>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn full_buffer_drops_instead_of_blocking() {
    let store = Arc::new(GatedStore {
        entered: Notify::new(),
        gate: Semaphore::new(0),
        written: Mutex::new(Vec::new()),
    });
    let (audit, _writer) = AuditSink::spawn(store.clone(), 1);

    // First event is taken by the writer, which then blocks on the gate.
    audit.record(Actor::System, "a", "material", "first");
    store.entered.notified().await;

    // Second fills the one-slot buffer; third has nowhere to go.
    audit.record(Actor::System, "b", "material", "second");
    audit.record(Actor::System, "c", "material", "third");

    store.gate.add_permits(10);
    audit.flush().await;

    assert_eq!(*store.written.lock(), ["first", "second"]);
}

#[tokio::test]
async fn record_after_writer_stops_is_harmless() {
    let store = Arc::new(MemoryStore::new());
    let (audit, writer) = AuditSink::spawn(store.clone(), 4);
    writer.abort();
    let _ = writer.await;

    audit.record(Actor::System, "late", "material", "dropped");
    audit.flush().await;
    assert!(store.list_audit(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn submitted_events_wait_for_room() {
    let store = Arc::new(GatedStore {
        entered: Notify::new(),
        gate: Semaphore::new(0),
        written: Mutex::new(Vec::new()),
    });
    let (audit, _writer) = AuditSink::spawn(store.clone(), 1);

    audit.record(Actor::System, "a", "material", "first");
    store.entered.notified().await;
    audit.record(Actor::System, "b", "material", "second");

    // The buffer is full; a manual entry waits instead of being dropped.
    let pending = {
        let audit = audit.clone();
        tokio::spawn(async move {
            audit
                .submit(Actor::System, "inspection", "workshop", "third")
                .await
        })
    };
    store.gate.add_permits(10);
    pending.await.unwrap().unwrap();
    audit.flush().await;

    assert_eq!(*store.written.lock(), ["first", "second", "third"]);
}

#[tokio::test]
async fn submit_validates_and_reports_a_stopped_writer() {
    let store = Arc::new(MemoryStore::new());
    let (audit, writer) = AuditSink::spawn(store.clone(), 4);

    assert!(matches!(
        audit.submit(Actor::System, " ", "workshop", "x").await,
        Err(Error::InvalidArgument(_))
    ));
    audit
        .submit(Actor::System, "inspection", "workshop", "furnace checked")
        .await
        .unwrap();
    audit.flush().await;
    let events = store.list_audit(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "inspection");
    assert_eq!(events[0].detail, "furnace checked");

    writer.abort();
    let _ = writer.await;
    assert!(matches!(
        audit.submit(Actor::System, "late", "workshop", "x").await,
        Err(Error::Other(_))
    ));
}
