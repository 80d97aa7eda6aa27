//! HTTP surface

pub mod audit;
pub mod auth;
pub mod health;
pub mod kb;
pub mod metrics;
pub mod presence;
pub mod public;
pub mod tickets;
pub mod ws;

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections surface as `AppError::InvalidRequest`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Path extractor; a malformed segment such as `/api/tickets/abc` becomes a
/// JSON 400 like every other input error.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Agent name from the optional `X-Actor` header
pub fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("agent")
        .to_string()
}

/// Every route, without middleware layers
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::prometheus_metrics))
        // Agent console
        .route(
            "/api/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route("/api/tickets/stream", get(ws::ws_handler))
        .route("/api/tickets/test-ai", post(tickets::test_ai))
        .route("/api/tickets/meta/tags", get(tickets::list_all_tags))
        .route("/api/tickets/meta/macros", get(tickets::list_macros))
        .route("/api/tickets/meta/analytics", get(tickets::analytics))
        .route("/api/tickets/:id", get(tickets::get_ticket))
        .route(
            "/api/tickets/:id/messages",
            get(tickets::list_messages).post(tickets::append_message),
        )
        .route("/api/tickets/:id/status", post(tickets::set_status))
        .route("/api/tickets/:id/tags", post(tickets::add_tag))
        .route("/api/tickets/:id/csat", post(tickets::record_csat))
        // Customer portal
        .route("/api/tickets/public", get(public::list_my_tickets))
        .route("/api/tickets/public/:id", get(public::get_ticket))
        .route("/api/tickets/public/:id/messages", post(public::append_message))
        // Knowledge base
        .route(
            "/api/kb/articles",
            get(kb::list_articles).post(kb::create_article),
        )
        .route("/api/kb/articles/:id", get(kb::get_article))
        .route("/api/kb/search", get(kb::search))
        // Audit, auth, presence
        .route("/api/audit/:ticket_id", get(audit::list_audit))
        .route("/api/auth/magic-link", post(auth::issue_magic_link))
        .route("/api/auth/magic-link/consume", get(auth::consume_magic_link))
        .route(
            "/api/presence/:ticket_id",
            get(presence::viewers)
                .post(presence::heartbeat)
                .delete(presence::leave),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_actor_defaults_to_agent() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_from(&headers), "agent");
        headers.insert("X-Actor", HeaderValue::from_static("  "));
        assert_eq!(actor_from(&headers), "agent");
        headers.insert("X-Actor", HeaderValue::from_static("dana"));
        assert_eq!(actor_from(&headers), "dana");
    }
}
