//! Periodic monitor scans.

use std::sync::Arc;
use std::time::Duration;

use athanor::audit::AuditSink;
use athanor::config::MonitorSettings;
use athanor::ledger::StockLedger;
use athanor::model::*;
use athanor::monitor::Monitor;
use athanor::store::memory::MemoryStore;
use athanor::store::{AuditStore, MissionStore, TransmutationStore};

fn setup(interval_secs: u64) -> (Arc<MemoryStore>, StockLedger, AuditSink, Monitor) {
    let store = Arc::new(MemoryStore::new());
    let (audit, _writer) = AuditSink::spawn(store.clone(), 1024);
    let ledger = StockLedger::new(store.clone(), audit.clone());
    let monitor = Monitor::new(
        ledger.clone(),
        store.clone(),
        store.clone(),
        audit.clone(),
        &MonitorSettings {
            interval_secs,
            anomaly_threshold: 1000.0,
        },
    );
    (store, ledger, audit, monitor)
}

#[tokio::test]
async fn quiet_workshop_reports_nothing() {
    let (store, ledger, audit, monitor) = setup(300);
    ledger
        .create(NewMaterial::new("Salt", "g", 10.0))
        .await
        .unwrap();

    let report = monitor.tick().await.unwrap();
    assert!(report.anomalies.is_empty());
    assert_eq!(report.open_missions, 0);
    assert_eq!(report.pending_transmutations, 0);

    audit.flush().await;
    assert!(store.list_audit(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn tick_reports_anomalies_and_open_work() {
    let (store, ledger, audit, monitor) = setup(300);
    ledger
        .create(NewMaterial::new("Mercury", "kg", 1500.0))
        .await
        .unwrap();
    ledger
        .create(NewMaterial::new("Salt", "g", 1000.0))
        .await
        .unwrap();

    let open = NewMission::new("Find the stone").into_mission();
    let done = NewMission::new("Sweep the lab").into_mission();
    store.insert_mission(&open).await.unwrap();
    store.insert_mission(&done).await.unwrap();
    store
        .update_mission(
            done.id,
            &MissionUpdate {
                state: Some(MissionState::Completed),
                final_report: Some("spotless".into()),
            },
        )
        .await
        .unwrap();

    store
        .insert_transmutation(&NewTransmutation::new("Lead to gold", 50.0).into_transmutation())
        .await
        .unwrap();

    let report = monitor.tick().await.unwrap();
    assert_eq!(report.anomalies, vec![("Mercury".to_string(), 1500.0)]);
    assert_eq!(report.open_missions, 1);
    assert_eq!(report.pending_transmutations, 1);

    audit.flush().await;
    let events = store.list_audit(10).await.unwrap();
    let mut actions: Vec<_> = events.iter().map(|e| e.action.as_str()).collect();
    actions.sort();
    assert_eq!(
        actions,
        ["anomaly_detected", "open_missions", "pending_transmutations"]
    );
    assert!(events.iter().all(|e| e.actor == Actor::System));

    let anomaly = events
        .iter()
        .find(|e| e.action == "anomaly_detected")
        .unwrap();
    assert_eq!(anomaly.entity, "material");
    assert!(anomaly.detail.contains("Mercury"));
}

#[tokio::test]
async fn repeated_ticks_only_repeat_the_report() {
    let (store, ledger, audit, monitor) = setup(300);
    let m = ledger
        .create(NewMaterial::new("Aether", "ml", 2000.0))
        .await
        .unwrap();

    let first = monitor.tick().await.unwrap();
    let second = monitor.tick().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(ledger.get(m.id).await.unwrap().quantity, 2000.0);

    audit.flush().await;
    assert_eq!(store.list_audit(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn run_ticks_until_shutdown() {
    let (store, ledger, audit, monitor) = setup(3600);
    ledger
        .create(NewMaterial::new("Mercury", "kg", 5000.0))
        .await
        .unwrap();

    let runner = monitor.clone();
    let running = tokio::spawn(async move { runner.run().await });

    // The first tick fires immediately.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            audit.flush().await;
            if !store.list_audit(10).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor never ticked");

    monitor.shutdown();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("monitor did not stop")
        .unwrap();
}

#[tokio::test]
async fn zero_interval_runs_and_stops_cleanly() {
    let (store, ledger, audit, monitor) = setup(0);
    ledger
        .create(NewMaterial::new("Mercury", "kg", 5000.0))
        .await
        .unwrap();

    let runner = monitor.clone();
    let running = tokio::spawn(async move { runner.run().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            audit.flush().await;
            if !store.list_audit(10).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor never ticked");

    monitor.shutdown();
    let joined = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("monitor did not stop");
    assert!(joined.is_ok(), "monitor task panicked");
}
