//! Audit rows. Insert and list only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, clamp_limit};
use crate::error::Result;
use crate::model::*;
use crate::store::AuditStore;

#[async_trait]
impl AuditStore for Db {
    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_events (id, actor, action, entity, detail, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.id.0)
        .bind(event.actor.to_string())
        .bind(&event.action)
        .bind(&event.entity)
        .bind(&event.detail)
        .bind(event.recorded_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, actor, action, entity, detail, recorded_at
             FROM audit_events
             ORDER BY recorded_at DESC
             LIMIT $1",
        )
        .bind(clamp_limit(limit))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(AuditRow::try_into_event).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor: String,
    action: String,
    entity: String,
    detail: String,
    recorded_at: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_event(self) -> Result<AuditEvent> {
        Ok(AuditEvent {
            id: AuditId(self.id),
            actor: self.actor.parse()?,
            action: self.action,
            entity: self.entity,
            detail: self.detail,
            recorded_at: self.recorded_at,
        })
    }
}
