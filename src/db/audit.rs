//! Audit trail persistence

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tracing::error;

use super::Database;
use crate::error::Result;
use crate::models::{AuditEvent, NewAuditEvent};

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: i64,
    ticket_id: Option<i64>,
    actor_type: String,
    actor: String,
    action: String,
    payload: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl Database {
    /// Write a batch of audit events. Individual failures are logged and
    /// skipped; returns how many were written.
    pub async fn insert_audit_batch(&self, events: &[NewAuditEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for event in events {
            match sqlx::query(
                "INSERT INTO audit_log (ticket_id, actor_type, actor, action, payload, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(event.ticket_id)
            .bind(&event.actor_type)
            .bind(&event.actor)
            .bind(&event.action)
            .bind(Json(&event.payload))
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            {
                Ok(_) => inserted += 1,
                Err(e) => {
                    error!(error = %e, action = %event.action, "Failed to insert audit event");
                }
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Audit trail of one ticket, newest first
    pub async fn list_audit(&self, ticket_id: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT id, ticket_id, actor_type, actor, action, payload, created_at \
             FROM audit_log WHERE ticket_id = ? ORDER BY id DESC",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AuditEvent {
                id: row.id,
                ticket_id: row.ticket_id,
                actor_type: row.actor_type,
                actor: row.actor,
                action: row.action,
                payload: row.payload.map(|p| p.0).unwrap_or(serde_json::Value::Null),
                created_at: row.created_at,
            })
            .collect())
    }
}
