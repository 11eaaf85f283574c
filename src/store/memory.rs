//! In-process storage backend.
//!
//! Backs tests and local runs. Each material sits behind its own mutex, so
//! adjustments to one material serialize while others proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use super::{AlchemistStore, AuditStore, MaterialStore, MissionStore, TransmutationStore};
use crate::error::{Error, Result};
use crate::model::*;

/// Storage held entirely in memory. Cheap to construct; nothing persists.
#[derive(Default)]
pub struct MemoryStore {
    materials: RwLock<HashMap<MaterialId, Arc<Mutex<Material>>>>,
    transmutations: RwLock<HashMap<TransmutationId, Transmutation>>,
    alchemists: RwLock<HashMap<AlchemistId, Alchemist>>,
    missions: RwLock<HashMap<MissionId, Mission>>,
    audit: RwLock<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn material_row(&self, id: MaterialId) -> Result<Arc<Mutex<Material>>> {
        self.materials
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("material {id}")))
    }
}

fn take(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl MaterialStore for MemoryStore {
    async fn insert_material(&self, material: &Material) -> Result<()> {
        self.materials
            .write()
            .insert(material.id, Arc::new(Mutex::new(material.clone())));
        Ok(())
    }

    async fn get_material(&self, id: MaterialId) -> Result<Material> {
        let row = self.material_row(id)?;
        let material = row.lock().clone();
        Ok(material)
    }

    async fn list_materials(&self, filter: &MaterialFilter, limit: i64) -> Result<Vec<Material>> {
        let rows: Vec<_> = self.materials.read().values().cloned().collect();
        let mut materials: Vec<Material> = rows
            .iter()
            .map(|row| row.lock().clone())
            .filter(|m| filter.matches(m))
            .collect();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        materials.truncate(take(limit));
        Ok(materials)
    }

    async fn delete_material(&self, id: MaterialId) -> Result<()> {
        self.materials
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("material {id}")))
    }

    async fn rename_material(&self, id: MaterialId, rename: &MaterialRename) -> Result<Material> {
        let row = self.material_row(id)?;
        let mut material = row.lock();
        rename.apply(&mut material);
        material.updated_at = Utc::now();
        Ok(material.clone())
    }

    async fn adjust_quantity(&self, id: MaterialId, delta: f64) -> Result<Material> {
        let row = self.material_row(id)?;
        let mut material = row.lock();

        // Deleted while we waited for the lock.
        let still_present = self
            .materials
            .read()
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current, &row));
        if !still_present {
            return Err(Error::NotFound(format!("material {id}")));
        }

        let quantity = material.adjusted(delta)?;
        material.quantity = quantity;
        material.updated_at = Utc::now();
        Ok(material.clone())
    }

    async fn materials_above(&self, threshold: f64) -> Result<Vec<Material>> {
        let rows: Vec<_> = self.materials.read().values().cloned().collect();
        let mut materials: Vec<Material> = rows
            .iter()
            .map(|row| row.lock().clone())
            .filter(|m| m.quantity > threshold)
            .collect();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(materials)
    }
}

#[async_trait]
impl TransmutationStore for MemoryStore {
    async fn insert_transmutation(&self, transmutation: &Transmutation) -> Result<()> {
        self.transmutations
            .write()
            .insert(transmutation.id, transmutation.clone());
        Ok(())
    }

    async fn get_transmutation(&self, id: TransmutationId) -> Result<Transmutation> {
        self.transmutations
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("transmutation {id}")))
    }

    async fn list_transmutations(
        &self,
        state: Option<TransmutationState>,
        limit: i64,
    ) -> Result<Vec<Transmutation>> {
        let mut items: Vec<Transmutation> = self
            .transmutations
            .read()
            .values()
            .filter(|t| state.is_none_or(|s| t.state == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(take(limit));
        Ok(items)
    }

    async fn resolve_transmutation(
        &self,
        id: TransmutationId,
        state: TransmutationState,
        result: &str,
    ) -> Result<bool> {
        let mut transmutations = self.transmutations.write();
        let transmutation = transmutations
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("transmutation {id}")))?;
        if transmutation.state != TransmutationState::Pending {
            return Ok(false);
        }
        let now = Utc::now();
        transmutation.state = state;
        transmutation.result = result.to_string();
        transmutation.updated_at = now;
        transmutation.resolved_at = Some(now);
        Ok(true)
    }

    async fn count_pending_transmutations(&self) -> Result<i64> {
        let count = self
            .transmutations
            .read()
            .values()
            .filter(|t| t.state == TransmutationState::Pending)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl AlchemistStore for MemoryStore {
    async fn insert_alchemist(&self, alchemist: &Alchemist) -> Result<()> {
        self.alchemists
            .write()
            .insert(alchemist.id, alchemist.clone());
        Ok(())
    }

    async fn get_alchemist(&self, id: AlchemistId) -> Result<Alchemist> {
        self.alchemists
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("alchemist {id}")))
    }

    async fn list_alchemists(&self, limit: i64) -> Result<Vec<Alchemist>> {
        let mut alchemists: Vec<Alchemist> = self.alchemists.read().values().cloned().collect();
        alchemists.sort_by(|a, b| a.name.cmp(&b.name));
        alchemists.truncate(take(limit));
        Ok(alchemists)
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn insert_mission(&self, mission: &Mission) -> Result<()> {
        // Same reference rule as the foreign key in Postgres.
        if let Some(alchemist) = mission.alchemist {
            if !self.alchemists.read().contains_key(&alchemist) {
                return Err(Error::InvalidArgument(format!(
                    "mission references unknown alchemist {alchemist}"
                )));
            }
        }
        self.missions.write().insert(mission.id, mission.clone());
        Ok(())
    }

    async fn list_missions(&self, limit: i64) -> Result<Vec<Mission>> {
        let mut missions: Vec<Mission> = self.missions.read().values().cloned().collect();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        missions.truncate(take(limit));
        Ok(missions)
    }

    async fn update_mission(&self, id: MissionId, update: &MissionUpdate) -> Result<Mission> {
        let mut missions = self.missions.write();
        let mission = missions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("mission {id}")))?;
        update.apply(mission);
        Ok(mission.clone())
    }

    async fn count_open_missions(&self) -> Result<i64> {
        let count = self
            .missions
            .read()
            .values()
            .filter(|m| !m.state.is_terminal())
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.audit.write().push(event.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEvent>> {
        // Insertion order is write order; reverse it before the stable sort
        // so equal timestamps still come out newest first.
        let mut events: Vec<AuditEvent> = self.audit.read().iter().rev().cloned().collect();
        events.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        events.truncate(take(limit));
        Ok(events)
    }
}
