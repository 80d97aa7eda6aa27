//! Agent console endpoints

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{actor_from, ApiJson, ApiPath};
use crate::analytics::AnalyticsReport;
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::{
    AddTagRequest, AppendMessageRequest, AuthorType, CannedReply, CreateTicketRequest,
    CsatRating, CsatRequest, Message, NewAuditEvent, OkResponse, SetStatusRequest, TagsResponse,
    Ticket, TicketEventKind, TriageProbeRequest, CANNED_REPLIES,
};
use crate::services::triage::{Suggestion, TriageResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TicketQuery {
    #[serde(rename = "refreshAi")]
    pub refresh_ai: Option<String>,
}

impl TicketQuery {
    fn refresh(&self) -> bool {
        matches!(
            self.refresh_ai.as_deref().map(str::trim),
            Some("1") | Some("true") | Some("yes")
        )
    }
}

/// GET /api/tickets
pub async fn list_tickets(State(state): State<AppState>) -> Result<Json<Vec<Ticket>>> {
    Ok(Json(state.db.list_tickets().await?))
}

/// POST /api/tickets
///
/// Validates, triages and stores a new ticket with its opening message.
pub async fn create_ticket(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>)> {
    let input = payload.validate()?;
    let ticket = state.db.create_ticket(input, &state.triage).await?;

    state.metrics.inc_tickets_created();
    state.audit(NewAuditEvent::for_ticket(
        ticket.id,
        AuthorType::Customer,
        ticket.requester_email.clone(),
        "create",
        json!({
            "subject": ticket.subject,
            "category": ticket.category,
            "priority": ticket.priority,
        }),
        ticket.created_at,
    ));
    state.publish(TicketEventKind::Created, ticket.id);

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// GET /api/tickets/:id
///
/// Generates the suggested reply when none is stored yet or `?refreshAi=1`
/// is given. A failed generation is shown as a placeholder and not stored.
pub async fn get_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Ticket>> {
    let mut ticket = state.db.get_ticket(id).await?;

    let missing = ticket
        .ai_suggestion
        .as_deref()
        .map_or(true, |s| s.trim().is_empty());
    if !(query.refresh() || missing) {
        return Ok(Json(ticket));
    }

    match state.triage.suggest_reply(&ticket).await {
        Suggestion::Generated(text) => {
            state.db.set_ai_suggestion(id, &text).await?;
            state.audit(NewAuditEvent::for_ticket(
                id,
                AuthorType::Agent,
                actor_from(&headers),
                "ai_suggestion",
                json!({ "chars": text.chars().count() }),
                state.clock.now(),
            ));
            ticket = state.db.get_ticket(id).await?;
        }
        unavailable @ Suggestion::Unavailable(_) => {
            ticket.ai_suggestion = Some(unavailable.text());
        }
    }

    Ok(Json(ticket))
}

/// GET /api/tickets/:id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Message>>> {
    Ok(Json(state.db.list_messages(id).await?))
}

/// POST /api/tickets/:id/messages
pub async fn append_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AppendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    let author = payload.author()?;
    let message = state.db.append_message(id, author, &payload.body).await?;

    state.audit(NewAuditEvent::for_ticket(
        id,
        author,
        actor_from(&headers),
        "reply",
        json!({ "message_id": message.id }),
        message.created_at,
    ));
    state.publish(TicketEventKind::Message, id);

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/tickets/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<SetStatusRequest>,
) -> Result<Json<OkResponse>> {
    let status = payload.status()?;
    state.db.set_status(id, status).await?;

    info!(ticket_id = id, status = %status, "Ticket status changed");
    state.audit(NewAuditEvent::for_ticket(
        id,
        AuthorType::Agent,
        actor_from(&headers),
        "status",
        json!({ "status": status }),
        state.clock.now(),
    ));
    state.publish(TicketEventKind::Status, id);

    Ok(Json(OkResponse { ok: true }))
}

/// POST /api/tickets/:id/tags
pub async fn add_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<AddTagRequest>,
) -> Result<Json<TagsResponse>> {
    let tags = state.db.add_tag(id, &payload.tag).await?;

    state.audit(NewAuditEvent::for_ticket(
        id,
        AuthorType::Agent,
        actor_from(&headers),
        "tag",
        json!({ "tag": payload.tag.trim() }),
        state.clock.now(),
    ));
    state.publish(TicketEventKind::Tag, id);

    Ok(Json(TagsResponse { ok: true, tags }))
}

/// POST /api/tickets/:id/csat
pub async fn record_csat(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CsatRequest>,
) -> Result<(StatusCode, Json<CsatRating>)> {
    let rating = payload
        .rating
        .ok_or_else(|| AppError::InvalidRequest("rating is required".into()))?;
    let csat = state
        .db
        .record_csat(id, rating, payload.comment.as_deref())
        .await?;

    state.audit(NewAuditEvent::for_ticket(
        id,
        AuthorType::Agent,
        actor_from(&headers),
        "csat",
        json!({ "rating": csat.rating }),
        csat.created_at,
    ));
    state.publish(TicketEventKind::Csat, id);

    Ok((StatusCode::CREATED, Json(csat)))
}

/// GET /api/tickets/meta/tags
pub async fn list_all_tags(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.list_all_tags().await?))
}

/// GET /api/tickets/meta/macros
pub async fn list_macros() -> Json<&'static [CannedReply]> {
    Json(&CANNED_REPLIES[..])
}

/// GET /api/tickets/meta/analytics
pub async fn analytics(State(state): State<AppState>) -> Result<Json<AnalyticsReport>> {
    let snapshot = state.db.analytics_snapshot().await?;
    Ok(Json(snapshot.report(state.clock.now())))
}

/// POST /api/tickets/test-ai
///
/// Runs the classifier without creating a ticket.
pub async fn test_ai(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<TriageProbeRequest>,
) -> Result<Json<TriageResult>> {
    if payload.subject.trim().is_empty() && payload.body.trim().is_empty() {
        return Err(AppError::InvalidRequest("subject or body is required".into()));
    }
    Ok(Json(
        state.triage.classify(&payload.subject, &payload.body).await,
    ))
}
