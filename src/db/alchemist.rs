//! Alchemist roster rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, clamp_limit};
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::AlchemistStore;

#[async_trait]
impl AlchemistStore for Db {
    async fn insert_alchemist(&self, a: &Alchemist) -> Result<()> {
        sqlx::query(
            "INSERT INTO alchemists (id, name, rank, specialty, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(a.id.0)
        .bind(&a.name)
        .bind(&a.rank)
        .bind(&a.specialty)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_alchemist(&self, id: AlchemistId) -> Result<Alchemist> {
        let row: Option<AlchemistRow> = sqlx::query_as(
            "SELECT id, name, rank, specialty, created_at, updated_at
             FROM alchemists WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.map(Alchemist::from)
            .ok_or_else(|| Error::NotFound(format!("alchemist {id}")))
    }

    async fn list_alchemists(&self, limit: i64) -> Result<Vec<Alchemist>> {
        let rows: Vec<AlchemistRow> = sqlx::query_as(
            "SELECT id, name, rank, specialty, created_at, updated_at
             FROM alchemists ORDER BY name ASC LIMIT $1",
        )
        .bind(clamp_limit(limit))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Alchemist::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct AlchemistRow {
    id: Uuid,
    name: String,
    rank: String,
    specialty: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AlchemistRow> for Alchemist {
    fn from(row: AlchemistRow) -> Self {
        Alchemist {
            id: AlchemistId(row.id),
            name: row.name,
            rank: row.rank,
            specialty: row.specialty,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
