//! Magic-link login for the customer portal

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::ApiJson;
use crate::error::Result;
use crate::services::magic_link::{ConsumeError, MagicLink};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MagicLinkRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsumeQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub ok: bool,
    pub email: String,
}

impl IntoResponse for ConsumeError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": self.code() })),
        )
            .into_response()
    }
}

/// POST /api/auth/magic-link
///
/// The link is returned in the response rather than emailed.
pub async fn issue_magic_link(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<MagicLinkRequest>,
) -> Result<Json<MagicLink>> {
    let link = state.magic_links.issue(&payload.email)?;
    info!(outstanding = state.magic_links.outstanding(), "Magic link issued");
    Ok(Json(link))
}

/// GET /api/auth/magic-link/consume?token=
pub async fn consume_magic_link(
    State(state): State<AppState>,
    Query(query): Query<ConsumeQuery>,
) -> std::result::Result<Json<ConsumeResponse>, ConsumeError> {
    let email = state.magic_links.consume(query.token.trim()).map_err(|e| {
        debug!(reason = e.code(), "Magic link rejected");
        e
    })?;
    Ok(Json(ConsumeResponse { ok: true, email }))
}
