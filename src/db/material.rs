//! Material rows and the locked stock adjustment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, clamp_limit};
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::MaterialStore;

#[async_trait]
impl MaterialStore for Db {
    async fn insert_material(&self, material: &Material) -> Result<()> {
        sqlx::query(
            "INSERT INTO materials (id, name, unit, quantity, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(material.id.0)
        .bind(&material.name)
        .bind(&material.unit)
        .bind(material.quantity)
        .bind(material.created_at)
        .bind(material.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_material(&self, id: MaterialId) -> Result<Material> {
        let row: Option<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, quantity, created_at, updated_at
             FROM materials WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.map(Material::from)
            .ok_or_else(|| Error::NotFound(format!("material {id}")))
    }

    async fn list_materials(&self, filter: &MaterialFilter, limit: i64) -> Result<Vec<Material>> {
        let pattern = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{q}%"));

        let rows: Vec<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, quantity, created_at, updated_at
             FROM materials
             WHERE ($1::text IS NULL OR name ILIKE $1 OR unit ILIKE $1)
             ORDER BY name ASC
             LIMIT $2",
        )
        .bind(pattern)
        .bind(clamp_limit(limit))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    async fn delete_material(&self, id: MaterialId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id.0)
            .execute(self.pool())
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("material {id}")));
        }
        Ok(())
    }

    async fn rename_material(&self, id: MaterialId, rename: &MaterialRename) -> Result<Material> {
        let row: Option<MaterialRow> = sqlx::query_as(
            "UPDATE materials
             SET name = COALESCE($1, name),
                 unit = COALESCE($2, unit),
                 updated_at = now()
             WHERE id = $3
             RETURNING id, name, unit, quantity, created_at, updated_at",
        )
        .bind(&rename.name)
        .bind(&rename.unit)
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.map(Material::from)
            .ok_or_else(|| Error::NotFound(format!("material {id}")))
    }

    async fn adjust_quantity(&self, id: MaterialId, delta: f64) -> Result<Material> {
        let mut tx = self.pool().begin().await?;

        // FOR UPDATE holds the row until commit or rollback; concurrent
        // adjusters of this material queue up here.
        let row: Option<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, quantity, created_at, updated_at
             FROM materials WHERE id = $1
             FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        // Early returns drop `tx`, which rolls back and releases the lock.
        let mut material = row
            .map(Material::from)
            .ok_or_else(|| Error::NotFound(format!("material {id}")))?;
        let quantity = material.adjusted(delta)?;

        let updated_at: (DateTime<Utc>,) = sqlx::query_as(
            "UPDATE materials SET quantity = $1, updated_at = now()
             WHERE id = $2
             RETURNING updated_at",
        )
        .bind(quantity)
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        material.quantity = quantity;
        material.updated_at = updated_at.0;
        Ok(material)
    }

    async fn materials_above(&self, threshold: f64) -> Result<Vec<Material>> {
        let rows: Vec<MaterialRow> = sqlx::query_as(
            "SELECT id, name, unit, quantity, created_at, updated_at
             FROM materials WHERE quantity > $1
             ORDER BY name ASC",
        )
        .bind(threshold)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MaterialRow {
    id: Uuid,
    name: String,
    unit: String,
    quantity: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: MaterialId(row.id),
            name: row.name,
            unit: row.unit,
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
