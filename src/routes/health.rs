//! Health and readiness endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: CheckStatus,
    pub audit_buffer: CheckStatus,
    pub triage: CheckStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub healthy: bool,
    pub message: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /ready
///
/// Only the database gates readiness. A full audit buffer or a missing
/// API key degrade features but the service still answers.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match state.db.ping().await {
        Ok(()) => CheckStatus {
            healthy: true,
            message: "Connected".to_string(),
        },
        Err(e) => CheckStatus {
            healthy: false,
            message: format!("Connection failed: {}", e),
        },
    };

    let depth = state.audit.len();
    let audit_buffer = CheckStatus {
        healthy: depth < state.audit.capacity(),
        message: format!("{} of {} queued", depth, state.audit.capacity()),
    };

    let triage = CheckStatus {
        healthy: true,
        message: if state.triage.is_remote() {
            "Remote classifier".to_string()
        } else {
            "Local classifier only".to_string()
        },
    };

    let (status, code) = if database.healthy {
        ("ready", StatusCode::OK)
    } else {
        ("not_ready", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            checks: ReadinessChecks {
                database,
                audit_buffer,
                triage,
            },
        }),
    )
}
