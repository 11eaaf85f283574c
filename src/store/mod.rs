//! Storage contracts.
//!
//! Each trait is implemented twice: by [`crate::db::Db`] over Postgres and
//! by [`memory::MemoryStore`] in-process. Components hold `Arc<dyn ...>`
//! handles passed in at construction; nothing reaches for a global.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::*;

#[async_trait]
pub trait MaterialStore: Send + Sync {
    async fn insert_material(&self, material: &Material) -> Result<()>;

    async fn get_material(&self, id: MaterialId) -> Result<Material>;

    /// Materials matching `filter`, ordered by name.
    async fn list_materials(&self, filter: &MaterialFilter, limit: i64) -> Result<Vec<Material>>;

    async fn delete_material(&self, id: MaterialId) -> Result<()>;

    /// Change name and/or unit. Never touches the quantity.
    async fn rename_material(&self, id: MaterialId, rename: &MaterialRename) -> Result<Material>;

    /// Locked read-modify-write of one material's quantity.
    ///
    /// Implementations lock the row for the whole transaction, compute the
    /// new quantity with [`Material::adjusted`] and commit only if it
    /// succeeds. Adjusters of the same material serialize; adjusters of
    /// different materials must not block each other. Returns the material
    /// as committed.
    async fn adjust_quantity(&self, id: MaterialId, delta: f64) -> Result<Material>;

    /// Materials whose quantity is strictly greater than `threshold`.
    async fn materials_above(&self, threshold: f64) -> Result<Vec<Material>>;
}

#[async_trait]
pub trait TransmutationStore: Send + Sync {
    async fn insert_transmutation(&self, transmutation: &Transmutation) -> Result<()>;

    async fn get_transmutation(&self, id: TransmutationId) -> Result<Transmutation>;

    /// Newest first, optionally filtered by state.
    async fn list_transmutations(
        &self,
        state: Option<TransmutationState>,
        limit: i64,
    ) -> Result<Vec<Transmutation>>;

    /// Move a pending transmutation to a terminal state in one atomic write.
    ///
    /// Returns `false` if the row was no longer pending: another delivery
    /// already resolved it and the first application wins.
    async fn resolve_transmutation(
        &self,
        id: TransmutationId,
        state: TransmutationState,
        result: &str,
    ) -> Result<bool>;

    async fn count_pending_transmutations(&self) -> Result<i64>;
}

#[async_trait]
pub trait AlchemistStore: Send + Sync {
    async fn insert_alchemist(&self, alchemist: &Alchemist) -> Result<()>;

    async fn get_alchemist(&self, id: AlchemistId) -> Result<Alchemist>;

    /// Ordered by name.
    async fn list_alchemists(&self, limit: i64) -> Result<Vec<Alchemist>>;
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn insert_mission(&self, mission: &Mission) -> Result<()>;

    /// Newest first.
    async fn list_missions(&self, limit: i64) -> Result<Vec<Mission>>;

    async fn update_mission(&self, id: MissionId, update: &MissionUpdate) -> Result<Mission>;

    /// Missions not in a terminal state.
    async fn count_open_missions(&self) -> Result<i64>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    /// Newest first.
    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEvent>>;
}
