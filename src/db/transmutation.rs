//! Transmutation rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, clamp_limit};
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::TransmutationStore;

const COLUMNS: &str =
    "id, name, description, cost, state, result, created_at, updated_at, resolved_at";

#[async_trait]
impl TransmutationStore for Db {
    async fn insert_transmutation(&self, t: &Transmutation) -> Result<()> {
        sqlx::query(
            "INSERT INTO transmutations (id, name, description, cost, state, result, created_at, updated_at, resolved_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(t.id.0)
        .bind(&t.name)
        .bind(&t.description)
        .bind(t.cost)
        .bind(t.state.as_str())
        .bind(&t.result)
        .bind(t.created_at)
        .bind(t.updated_at)
        .bind(t.resolved_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_transmutation(&self, id: TransmutationId) -> Result<Transmutation> {
        let row: Option<TransmutationRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM transmutations WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("transmutation {id}")))?
            .try_into_transmutation()
    }

    async fn list_transmutations(
        &self,
        state: Option<TransmutationState>,
        limit: i64,
    ) -> Result<Vec<Transmutation>> {
        let rows: Vec<TransmutationRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM transmutations
             WHERE ($1::text IS NULL OR state = $1)
             ORDER BY created_at DESC
             LIMIT $2"
        ))
        .bind(state.map(TransmutationState::as_str))
        .bind(clamp_limit(limit))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(TransmutationRow::try_into_transmutation)
            .collect()
    }

    async fn resolve_transmutation(
        &self,
        id: TransmutationId,
        state: TransmutationState,
        result: &str,
    ) -> Result<bool> {
        // Conditional on 'pending': the first resolution wins, replays
        // affect zero rows.
        let rows_affected = sqlx::query(
            "UPDATE transmutations
             SET state = $1, result = $2, updated_at = now(), resolved_at = now()
             WHERE id = $3 AND state = 'pending'",
        )
        .bind(state.as_str())
        .bind(result)
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Distinguish "already resolved" from "gone".
            self.get_transmutation(id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn count_pending_transmutations(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transmutations WHERE state = 'pending'")
                .fetch_one(self.pool())
                .await?;
        Ok(count.0)
    }
}

#[derive(sqlx::FromRow)]
struct TransmutationRow {
    id: Uuid,
    name: String,
    description: String,
    cost: f64,
    state: String,
    result: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TransmutationRow {
    fn try_into_transmutation(self) -> Result<Transmutation> {
        Ok(Transmutation {
            id: TransmutationId(self.id),
            name: self.name,
            description: self.description,
            cost: self.cost,
            state: self.state.parse()?,
            result: self.result,
            created_at: self.created_at,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
        })
    }
}
