//! Periodic monitor: scans for stock anomalies and unfinished work, and
//! reports what it finds to the audit trail.
//!
//! Each tick is a stateless read-then-report pass. A missed or repeated
//! tick only changes how many audit events are written.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::audit::AuditSink;
use crate::config::MonitorSettings;
use crate::error::Result;
use crate::ledger::StockLedger;
use crate::model::Actor;
use crate::store::{MissionStore, TransmutationStore};
use crate::telemetry::metrics;

/// What one tick found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorReport {
    /// Materials above the anomaly threshold, as `(name, quantity)`.
    pub anomalies: Vec<(String, f64)>,
    pub open_missions: i64,
    pub pending_transmutations: i64,
}

#[derive(Clone)]
pub struct Monitor {
    ledger: StockLedger,
    missions: Arc<dyn MissionStore>,
    transmutations: Arc<dyn TransmutationStore>,
    audit: AuditSink,
    interval: Duration,
    anomaly_threshold: f64,
    shutdown: Arc<Notify>,
}

impl Monitor {
    pub fn new(
        ledger: StockLedger,
        missions: Arc<dyn MissionStore>,
        transmutations: Arc<dyn TransmutationStore>,
        audit: AuditSink,
        settings: &MonitorSettings,
    ) -> Self {
        Self {
            ledger,
            missions,
            transmutations,
            audit,
            interval: settings.interval(),
            anomaly_threshold: settings.anomaly_threshold,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the run loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Tick on a fixed interval until shutdown. The first tick runs
    /// immediately.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.interval, threshold = self.anomaly_threshold, "monitor started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("monitor shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("monitor tick failed: {e}");
                    }
                }
            }
        }
    }

    /// Run one scan and report its findings.
    pub async fn tick(&self) -> Result<MonitorReport> {
        let mut report = MonitorReport::default();

        for material in self.ledger.materials_above(self.anomaly_threshold).await? {
            warn!(
                material = %material.id,
                name = %material.name,
                quantity = material.quantity,
                "unusual stock level"
            );
            metrics::anomalies_detected().add(1, &[KeyValue::new("kind", "stock")]);
            self.audit.record(
                Actor::System,
                "anomaly_detected",
                "material",
                format!(
                    "Material {} ({}): quantity {:.3} {} exceeds threshold {:.3}",
                    material.id,
                    material.name,
                    material.quantity,
                    material.unit,
                    self.anomaly_threshold
                ),
            );
            report.anomalies.push((material.name, material.quantity));
        }

        report.open_missions = self.missions.count_open_missions().await?;
        if report.open_missions > 0 {
            self.audit.record(
                Actor::System,
                "open_missions",
                "mission",
                format!("{} missions not yet completed", report.open_missions),
            );
        }

        report.pending_transmutations = self.transmutations.count_pending_transmutations().await?;
        if report.pending_transmutations > 0 {
            self.audit.record(
                Actor::System,
                "pending_transmutations",
                "transmutation",
                format!(
                    "{} transmutations awaiting processing",
                    report.pending_transmutations
                ),
            );
        }

        debug!(
            anomalies = report.anomalies.len(),
            open_missions = report.open_missions,
            pending_transmutations = report.pending_transmutations,
            "monitor tick complete"
        );
        Ok(report)
    }
}
