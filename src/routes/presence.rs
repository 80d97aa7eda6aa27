//! Agent presence endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{ApiJson, ApiPath};
use crate::models::OkResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PresenceRequest {
    #[serde(rename = "agentId")]
    pub agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewersResponse {
    pub viewers: Vec<String>,
}

/// Agent id from an optional body; anonymous callers are "agent".
fn agent_id(payload: Option<ApiJson<PresenceRequest>>) -> String {
    payload
        .and_then(|ApiJson(p)| p.agent_id)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "agent".to_string())
}

/// POST /api/presence/:ticket_id
pub async fn heartbeat(
    State(state): State<AppState>,
    ApiPath(ticket_id): ApiPath<i64>,
    payload: Option<ApiJson<PresenceRequest>>,
) -> Json<OkResponse> {
    state.presence.heartbeat(ticket_id, &agent_id(payload));
    Json(OkResponse { ok: true })
}

/// DELETE /api/presence/:ticket_id
pub async fn leave(
    State(state): State<AppState>,
    ApiPath(ticket_id): ApiPath<i64>,
    payload: Option<ApiJson<PresenceRequest>>,
) -> Json<OkResponse> {
    state.presence.leave(ticket_id, &agent_id(payload));
    Json(OkResponse { ok: true })
}

/// GET /api/presence/:ticket_id
pub async fn viewers(
    State(state): State<AppState>,
    ApiPath(ticket_id): ApiPath<i64>,
) -> Json<ViewersResponse> {
    Json(ViewersResponse {
        viewers: state.presence.viewers(ticket_id),
    })
}
