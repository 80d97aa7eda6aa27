//! Customer portal endpoints
//!
//! The caller is identified only by the `?email=` it presents, compared
//! case-insensitively with the ticket's requester.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{ApiJson, ApiPath};
use crate::error::Result;
use crate::models::{
    AuthorType, EmailQuery, Message, NewAuditEvent, PublicMessageRequest, PublicTicketView,
    Ticket, TicketEventKind,
};
use crate::state::AppState;

/// GET /api/tickets/public?email=
pub async fn list_my_tickets(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<Ticket>>> {
    let email = query.email()?;
    Ok(Json(state.db.list_by_requester(&email).await?))
}

/// GET /api/tickets/public/:id?email=
pub async fn get_ticket(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<PublicTicketView>> {
    let email = query.email()?;
    Ok(Json(state.db.get_public_ticket(id, &email).await?))
}

/// POST /api/tickets/public/:id/messages?email=
pub async fn append_message(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    Query(query): Query<EmailQuery>,
    ApiJson(payload): ApiJson<PublicMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let email = query.email()?;
    let message = state
        .db
        .append_public_message(id, &email, &payload.body)
        .await?;

    state.audit(NewAuditEvent::for_ticket(
        id,
        AuthorType::Customer,
        email,
        "reply",
        json!({ "message_id": message.id }),
        message.created_at,
    ));
    state.publish(TicketEventKind::Message, id);

    Ok((StatusCode::CREATED, Json(message)))
}
