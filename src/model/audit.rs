//! Audit trail entries. Append-only: no update or delete exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Actor, AuditId};

/// A persisted audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditId,
    pub actor: Actor,
    /// What happened (e.g. "stock_adjusted").
    pub action: String,
    /// Kind of entity affected (e.g. "material").
    pub entity: String,
    pub detail: String,
    /// Assigned by the writer, never by the caller.
    pub recorded_at: DateTime<Utc>,
}

/// An event as submitted to the audit sink, before the writer stamps it.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor: Actor,
    pub action: String,
    pub entity: String,
    pub detail: String,
}

impl NewAuditEvent {
    pub fn into_event(self, recorded_at: DateTime<Utc>) -> AuditEvent {
        AuditEvent {
            id: AuditId::new(),
            actor: self.actor,
            action: self.action,
            entity: self.entity,
            detail: self.detail,
            recorded_at,
        }
    }
}
