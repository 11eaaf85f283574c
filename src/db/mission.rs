//! Mission rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, clamp_limit};
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::MissionStore;

const COLUMNS: &str = "id, title, description, priority, alchemist_id, materials, state, final_report, created_at, closed_at";

#[async_trait]
impl MissionStore for Db {
    async fn insert_mission(&self, m: &Mission) -> Result<()> {
        sqlx::query(
            "INSERT INTO missions (id, title, description, priority, alchemist_id, materials, state, final_report, created_at, closed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(m.id.0)
        .bind(&m.title)
        .bind(&m.description)
        .bind(m.priority.as_str())
        .bind(m.alchemist.map(|a| a.0))
        .bind(&m.materials)
        .bind(m.state.as_str())
        .bind(&m.final_report)
        .bind(m.created_at)
        .bind(m.closed_at)
        .execute(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Error::InvalidArgument(format!(
                    "mission references unknown alchemist {}",
                    m.alchemist.map(|a| a.to_string()).unwrap_or_default()
                ))
            }
            other => Error::from(other),
        })?;
        Ok(())
    }

    async fn list_missions(&self, limit: i64) -> Result<Vec<Mission>> {
        let rows: Vec<MissionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM missions ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(clamp_limit(limit))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(MissionRow::try_into_mission).collect()
    }

    async fn update_mission(&self, id: MissionId, update: &MissionUpdate) -> Result<Mission> {
        let row: Option<MissionRow> = sqlx::query_as(&format!(
            "UPDATE missions
             SET state = COALESCE($1, state),
                 final_report = COALESCE($2, final_report),
                 closed_at = CASE WHEN $2::text IS NULL THEN closed_at ELSE now() END
             WHERE id = $3
             RETURNING {COLUMNS}"
        ))
        .bind(update.state.map(MissionState::as_str))
        .bind(&update.final_report)
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("mission {id}")))?
            .try_into_mission()
    }

    async fn count_open_missions(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM missions WHERE state NOT IN ('completed', 'rejected')",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(count.0)
    }
}

#[derive(sqlx::FromRow)]
struct MissionRow {
    id: Uuid,
    title: String,
    description: String,
    priority: String,
    alchemist_id: Option<Uuid>,
    materials: String,
    state: String,
    final_report: Option<String>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl MissionRow {
    fn try_into_mission(self) -> Result<Mission> {
        Ok(Mission {
            id: MissionId(self.id),
            title: self.title,
            description: self.description,
            priority: self.priority.parse()?,
            alchemist: self.alchemist_id.map(AlchemistId),
            materials: self.materials,
            state: self.state.parse()?,
            final_report: self.final_report,
            created_at: self.created_at,
            closed_at: self.closed_at,
        })
    }
}
