//! WebSocket stream of ticket change events

use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::models::TicketEvent;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub ticket_id: Option<i64>,
}

/// GET /api/tickets/stream
///
/// Pushes every ticket event as JSON, or only those for `?ticket_id=`.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.ticket_id))
}

fn wanted(event: &TicketEvent, filter: Option<i64>) -> bool {
    filter.map_or(true, |id| event.ticket_id == id)
}

async fn handle_socket(socket: WebSocket, state: AppState, filter: Option<i64>) {
    info!(ticket_id = ?filter, "Event stream client connected");
    state.metrics.inc_ws_connections();

    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !wanted(&event, filter) {
                        continue;
                    }
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize ticket event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Event stream lagged, some events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.metrics.dec_ws_connections();
    info!(ticket_id = ?filter, "Event stream client disconnected");
}
