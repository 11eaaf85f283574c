//! Stock ledger: the only way a material's quantity changes.
//!
//! Adjustments are a locked read-modify-write inside the storage backend.
//! Only committed adjustments are audited; a rejected adjustment leaves no
//! trace beyond the error returned to the caller.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::MaterialStore;
use crate::telemetry::metrics;

#[derive(Clone)]
pub struct StockLedger {
    materials: Arc<dyn MaterialStore>,
    audit: AuditSink,
}

impl StockLedger {
    pub fn new(materials: Arc<dyn MaterialStore>, audit: AuditSink) -> Self {
        Self { materials, audit }
    }

    /// Apply `delta` to a material's quantity.
    ///
    /// Fails with `InvalidArgument` for a zero or non-finite delta,
    /// `NotFound` for an unknown material, `InsufficientStock` if the
    /// quantity would go negative (nothing changes), and `TransientStorage`
    /// for infrastructure failures the caller may retry.
    pub async fn adjust(
        &self,
        id: MaterialId,
        delta: f64,
        reason: &str,
        actor: Actor,
    ) -> Result<Material> {
        if delta == 0.0 {
            return Err(Error::InvalidArgument("delta must not be zero".into()));
        }
        if !delta.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "delta must be a finite number, got {delta}"
            )));
        }

        let start = Instant::now();
        let result = self.materials.adjust_quantity(id, delta).await;
        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "ledger.adjust")],
        );

        let material = match result {
            Ok(material) => material,
            Err(e) => {
                let label = match &e {
                    Error::InsufficientStock { .. } => "insufficient_stock",
                    Error::NotFound(_) => "not_found",
                    _ => "error",
                };
                warn!(material = %id, delta, error = %e, "stock adjustment rejected");
                metrics::stock_adjustments().add(1, &[KeyValue::new("result", label)]);
                return Err(e);
            }
        };

        info!(
            material = %material.id,
            delta,
            quantity = material.quantity,
            %actor,
            "stock adjusted"
        );
        metrics::stock_adjustments().add(1, &[KeyValue::new("result", "ok")]);

        self.audit.record(
            actor,
            "stock_adjusted",
            "material",
            format!(
                "Material {} ({}): delta={:.3}, reason={}, new={:.3}",
                material.id, material.name, delta, reason, material.quantity
            ),
        );

        Ok(material)
    }

    /// Create a material. Creation is not an adjustment and is not audited.
    pub async fn create(&self, new: NewMaterial) -> Result<Material> {
        new.validate()?;
        let material = new.into_material();
        self.materials.insert_material(&material).await?;
        info!(material = %material.id, name = %material.name, "material created");
        Ok(material)
    }

    /// Change a material's name and/or unit. Audited as `material_renamed`.
    pub async fn rename(
        &self,
        id: MaterialId,
        rename: MaterialRename,
        actor: Actor,
    ) -> Result<Material> {
        rename.validate()?;
        let material = self.materials.rename_material(id, &rename).await?;
        info!(material = %material.id, name = %material.name, unit = %material.unit, "material renamed");
        self.audit.record(
            actor,
            "material_renamed",
            "material",
            format!(
                "Material {}: name={}, unit={}",
                material.id, material.name, material.unit
            ),
        );
        Ok(material)
    }

    pub async fn get(&self, id: MaterialId) -> Result<Material> {
        self.materials.get_material(id).await
    }

    pub async fn list(&self, filter: &MaterialFilter, limit: i64) -> Result<Vec<Material>> {
        self.materials.list_materials(filter, limit).await
    }

    pub async fn delete(&self, id: MaterialId) -> Result<()> {
        self.materials.delete_material(id).await?;
        info!(material = %id, "material deleted");
        Ok(())
    }

    /// Materials holding more than `threshold`. Read contract for the monitor.
    pub async fn materials_above(&self, threshold: f64) -> Result<Vec<Material>> {
        self.materials.materials_above(threshold).await
    }
}
