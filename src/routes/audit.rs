//! Audit trail endpoint

use axum::{extract::State, Json};

use super::ApiPath;
use crate::error::Result;
use crate::models::AuditEvent;
use crate::state::AppState;

/// GET /api/audit/:ticket_id
///
/// Events still waiting in the side channel are not visible yet.
pub async fn list_audit(
    State(state): State<AppState>,
    ApiPath(ticket_id): ApiPath<i64>,
) -> Result<Json<Vec<AuditEvent>>> {
    Ok(Json(state.db.list_audit(ticket_id).await?))
}
