//! Worker pool and transmutation processing against the in-process backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use athanor::audit::AuditSink;
use athanor::error::{Error, Result};
use athanor::model::*;
use athanor::queue::JobQueue;
use athanor::queue::memory::MemoryQueue;
use athanor::store::memory::MemoryStore;
use athanor::store::{AuditStore, TransmutationStore};
use athanor::transmutation::TransmutationService;
use athanor::worker::{
    Disposition, HandlerOutcome, HandlerRegistry, JobHandler, PoolConfig, Resolution,
    TransmutationHandler, WorkerPool,
};
use serde_json::json;

struct Harness {
    store: Arc<MemoryStore>,
    queue: Arc<MemoryQueue>,
    audit: AuditSink,
    service: TransmutationService,
    pool: WorkerPool,
}

fn config() -> PoolConfig {
    PoolConfig {
        concurrency: 2,
        visibility_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_millis(20),
        max_deliveries: 3,
    }
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let (audit, _writer) = AuditSink::spawn(store.clone(), 1024);
    let handler = TransmutationHandler::new(store.clone(), audit.clone()).with_seed(42);
    let registry = HandlerRegistry::new().register(TRANSMUTATION_JOB, Arc::new(handler));
    let pool = WorkerPool::new(queue.clone(), Arc::new(registry), config());
    let service = TransmutationService::new(store.clone(), queue.clone());
    Harness {
        store,
        queue,
        audit,
        service,
        pool,
    }
}

/// Pool with a single custom handler registered under `job_type`.
fn pool_with(
    queue: Arc<MemoryQueue>,
    job_type: &str,
    handler: Arc<dyn JobHandler>,
    config: PoolConfig,
) -> WorkerPool {
    let registry = HandlerRegistry::new().register(job_type, handler);
    WorkerPool::new(queue, Arc::new(registry), config)
}

#[tokio::test]
async fn transmutation_is_resolved_and_audited() {
    let h = harness();
    let t = h
        .service
        .create(NewTransmutation::new("Lead to gold", 100.0))
        .await
        .unwrap();
    assert_eq!(t.state, TransmutationState::Pending);
    assert_eq!(h.queue.len(), 1);

    let disposition = h.pool.process_one().await.unwrap();
    assert_eq!(disposition, Some(Disposition::Completed));
    assert!(h.queue.is_empty());

    let resolved = h.service.get(t.id).await.unwrap();
    assert!(resolved.state.is_terminal());
    assert!(resolved.resolved_at.is_some());
    let amount = Resolution::reported_amount(&resolved.result).unwrap();
    match resolved.state {
        TransmutationState::Completed => {
            assert!(resolved.result.starts_with("Success: stable matter. Final cost: "));
            assert!((80.0..130.0).contains(&amount), "{}", resolved.result);
        }
        TransmutationState::Failed => {
            assert!(
                resolved
                    .result
                    .starts_with("Failure: unbalanced exchange. Wasted energy: ")
            );
            assert!((40.0..65.0).contains(&amount), "{}", resolved.result);
        }
        TransmutationState::Pending => unreachable!(),
    }

    h.audit.flush().await;
    let events = h.store.list_audit(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "transmutation_resolved");
    assert_eq!(events[0].entity, "transmutation");
    assert_eq!(events[0].actor, Actor::System);
    assert!(events[0].detail.contains(&resolved.result));
}

#[tokio::test]
async fn redelivery_of_resolved_job_is_a_no_op() {
    let h = harness();
    let t = h
        .service
        .create(NewTransmutation::new("Salt to silver", 40.0))
        .await
        .unwrap();
    h.pool.process_one().await.unwrap();
    let first = h.service.get(t.id).await.unwrap();

    // Same job delivered again.
    h.queue
        .enqueue(&TransmutationJob { transmutation_id: t.id }.into_job())
        .await
        .unwrap();
    let disposition = h.pool.process_one().await.unwrap();
    assert_eq!(disposition, Some(Disposition::Redelivered));
    assert!(h.queue.is_empty());

    let second = h.service.get(t.id).await.unwrap();
    assert_eq!(first, second);

    h.audit.flush().await;
    assert_eq!(h.store.list_audit(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn first_resolution_wins() {
    let h = harness();
    let t = h
        .service
        .create(NewTransmutation::new("Water to wine", 10.0))
        .await
        .unwrap();

    // Another delivery got there first.
    assert!(
        h.store
            .resolve_transmutation(t.id, TransmutationState::Failed, "first")
            .await
            .unwrap()
    );
    assert!(
        !h.store
            .resolve_transmutation(t.id, TransmutationState::Completed, "second")
            .await
            .unwrap()
    );

    assert_eq!(
        h.pool.process_one().await.unwrap(),
        Some(Disposition::Redelivered)
    );
    let stored = h.service.get(t.id).await.unwrap();
    assert_eq!(stored.state, TransmutationState::Failed);
    assert_eq!(stored.result, "first");
}

#[tokio::test]
async fn missing_transmutation_is_dead_lettered() {
    let h = harness();
    h.queue
        .enqueue(
            &TransmutationJob {
                transmutation_id: TransmutationId::new(),
            }
            .into_job(),
        )
        .await
        .unwrap();

    let disposition = h.pool.process_one().await.unwrap();
    assert!(matches!(disposition, Some(Disposition::DeadLettered(_))));
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.dead_letters().len(), 1);
}

#[tokio::test]
async fn malformed_payload_is_dead_lettered() {
    let h = harness();
    h.queue
        .enqueue(&Job::new(TRANSMUTATION_JOB, json!({ "transmutation": "nope" })))
        .await
        .unwrap();

    let disposition = h.pool.process_one().await.unwrap();
    assert!(matches!(disposition, Some(Disposition::DeadLettered(_))));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn unknown_job_type_is_dead_lettered() {
    let h = harness();
    h.queue
        .enqueue(&Job::new("process:unknown", json!({})))
        .await
        .unwrap();

    match h.pool.process_one().await.unwrap() {
        Some(Disposition::DeadLettered(reason)) => assert!(reason.contains("process:unknown")),
        other => panic!("expected dead letter, got {other:?}"),
    }
    let dead = h.queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].0.job.job_type, "process:unknown");
}

#[tokio::test]
async fn empty_queue_yields_nothing() {
    let h = harness();
    assert_eq!(h.pool.process_one().await.unwrap(), None);
}

/// Fails with a retryable error until `failures` attempts have been made.
struct Flaky {
    attempts: AtomicU32,
    failures: u32,
}

#[async_trait]
impl JobHandler for Flaky {
    async fn handle(&self, _payload: &serde_json::Value) -> Result<HandlerOutcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(Error::TransientStorage(sqlx::Error::PoolTimedOut));
        }
        Ok(HandlerOutcome::Applied)
    }
}

#[tokio::test]
async fn transient_failure_is_redelivered() {
    let queue = Arc::new(MemoryQueue::new());
    let flaky = Arc::new(Flaky {
        attempts: AtomicU32::new(0),
        failures: 2,
    });
    let pool = pool_with(
        queue.clone(),
        "flaky",
        flaky.clone(),
        PoolConfig {
            visibility_timeout: Duration::ZERO,
            ..config()
        },
    );
    queue.enqueue(&Job::new("flaky", json!({}))).await.unwrap();

    assert!(matches!(
        pool.process_one().await.unwrap(),
        Some(Disposition::Retry(_))
    ));
    assert_eq!(queue.len(), 1);
    assert!(matches!(
        pool.process_one().await.unwrap(),
        Some(Disposition::Retry(_))
    ));
    assert_eq!(
        pool.process_one().await.unwrap(),
        Some(Disposition::Completed)
    );

    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn job_is_dead_lettered_after_max_deliveries() {
    let queue = Arc::new(MemoryQueue::new());
    let flaky = Arc::new(Flaky {
        attempts: AtomicU32::new(0),
        failures: u32::MAX,
    });
    let pool = pool_with(
        queue.clone(),
        "doomed",
        flaky.clone(),
        PoolConfig {
            visibility_timeout: Duration::ZERO,
            max_deliveries: 3,
            ..config()
        },
    );
    queue.enqueue(&Job::new("doomed", json!({}))).await.unwrap();

    for _ in 0..3 {
        assert!(matches!(
            pool.process_one().await.unwrap(),
            Some(Disposition::Retry(_))
        ));
    }
    match pool.process_one().await.unwrap() {
        Some(Disposition::DeadLettered(reason)) => assert!(reason.contains("3 deliveries")),
        other => panic!("expected dead letter, got {other:?}"),
    }

    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    assert!(queue.is_empty());
}

/// Never finishes.
struct Stuck;

#[async_trait]
impl JobHandler for Stuck {
    async fn handle(&self, _payload: &serde_json::Value) -> Result<HandlerOutcome> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn shutdown_abandons_in_flight_job() {
    let queue = Arc::new(MemoryQueue::new());
    let pool = pool_with(queue.clone(), "stuck", Arc::new(Stuck), config());
    queue.enqueue(&Job::new("stuck", json!({}))).await.unwrap();

    let stopper = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.shutdown();
    });

    let disposition = tokio::time::timeout(Duration::from_secs(5), pool.process_one())
        .await
        .expect("shutdown did not interrupt the handler")
        .unwrap();
    assert_eq!(disposition, Some(Disposition::Abandoned));
    // Not acknowledged: still stored for redelivery.
    assert_eq!(queue.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_pool_drains_queue_then_stops() {
    let h = harness();
    let mut ids = Vec::new();
    for i in 0..8 {
        let t = h
            .service
            .create(NewTransmutation::new(format!("batch {i}"), 10.0 * i as f64))
            .await
            .unwrap();
        ids.push(t.id);
    }

    let pool = h.pool.clone();
    let running = tokio::spawn(async move { pool.run().await });

    tokio::time::timeout(Duration::from_secs(10), async {
        while h.store.count_pending_transmutations().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pool did not drain the queue");

    h.pool.shutdown();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("pool did not stop")
        .unwrap()
        .unwrap();

    for id in ids {
        assert!(h.service.get(id).await.unwrap().state.is_terminal());
    }
    h.audit.flush().await;
    assert_eq!(h.store.list_audit(100).await.unwrap().len(), 8);
}

#[tokio::test]
async fn requeue_only_applies_to_pending() {
    let h = harness();
    let t = h
        .service
        .create(NewTransmutation::new("Iron to steel", 5.0))
        .await
        .unwrap();

    h.service.requeue(t.id).await.unwrap();
    assert_eq!(h.queue.len(), 2);

    // Two jobs, one row: the second is a no-op.
    assert_eq!(
        h.pool.process_one().await.unwrap(),
        Some(Disposition::Completed)
    );
    assert_eq!(
        h.pool.process_one().await.unwrap(),
        Some(Disposition::Redelivered)
    );

    assert!(matches!(
        h.service.requeue(t.id).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        h.service.requeue(TransmutationId::new()).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn invalid_request_is_not_stored_or_enqueued() {
    let h = harness();
    assert!(matches!(
        h.service.create(NewTransmutation::new("  ", 1.0)).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        h.service
            .create(NewTransmutation::new("Infinite", f64::INFINITY))
            .await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(h.queue.is_empty());
    assert!(h.service.list(None, 10).await.unwrap().is_empty());
}
