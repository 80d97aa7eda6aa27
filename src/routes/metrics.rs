//! Prometheus metrics endpoint

use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::services::triage::TriageStats;
use crate::state::AppState;

/// Process-wide counters exported at `/metrics`
#[derive(Default)]
pub struct Metrics {
    tickets_created_total: AtomicU64,
    audit_recorded_total: AtomicU64,
    audit_dropped_total: AtomicU64,
    audit_persisted_total: AtomicU64,
    ws_connections: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_tickets_created(&self) {
        self.tickets_created_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_audit_recorded(&self) {
        self.audit_recorded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_audit_dropped(&self) {
        self.audit_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_audit_persisted(&self, count: u64) {
        self.audit_persisted_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_ws_connections(&self) {
        self.ws_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_ws_connections(&self) {
        self.ws_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tickets_created_total: self.tickets_created_total.load(Ordering::Relaxed),
            audit_recorded_total: self.audit_recorded_total.load(Ordering::Relaxed),
            audit_dropped_total: self.audit_dropped_total.load(Ordering::Relaxed),
            audit_persisted_total: self.audit_persisted_total.load(Ordering::Relaxed),
            ws_connections: self.ws_connections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tickets_created_total: u64,
    pub audit_recorded_total: u64,
    pub audit_dropped_total: u64,
    pub audit_persisted_total: u64,
    pub ws_connections: u64,
}

fn render(snapshot: &MetricsSnapshot, triage: &TriageStats, audit_buffer_depth: usize) -> String {
    format!(
        r#"# HELP support_desk_tickets_created_total Tickets created
# TYPE support_desk_tickets_created_total counter
support_desk_tickets_created_total {}

# HELP support_desk_triage_total Triage outcomes by classifier source
# TYPE support_desk_triage_total counter
support_desk_triage_total{{source="openai"}} {}
support_desk_triage_total{{source="local-fallback"}} {}
support_desk_triage_total{{source="error-fallback"}} {}

# HELP support_desk_audit_recorded_total Audit events accepted by the side channel
# TYPE support_desk_audit_recorded_total counter
support_desk_audit_recorded_total {}

# HELP support_desk_audit_dropped_total Audit events dropped because the buffer was full
# TYPE support_desk_audit_dropped_total counter
support_desk_audit_dropped_total {}

# HELP support_desk_audit_persisted_total Audit events written to storage
# TYPE support_desk_audit_persisted_total counter
support_desk_audit_persisted_total {}

# HELP support_desk_audit_buffer_depth Audit events waiting to be flushed
# TYPE support_desk_audit_buffer_depth gauge
support_desk_audit_buffer_depth {}

# HELP support_desk_websocket_connections Open ticket event streams
# TYPE support_desk_websocket_connections gauge
support_desk_websocket_connections {}

# HELP support_desk_info Build information
# TYPE support_desk_info gauge
support_desk_info{{version="{}"}} 1
"#,
        snapshot.tickets_created_total,
        triage.remote.load(Ordering::Relaxed),
        triage.local_fallback.load(Ordering::Relaxed),
        triage.error_fallback.load(Ordering::Relaxed),
        snapshot.audit_recorded_total,
        snapshot.audit_dropped_total,
        snapshot.audit_persisted_total,
        audit_buffer_depth,
        snapshot.ws_connections,
        env!("CARGO_PKG_VERSION"),
    )
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let output = render(
        &state.metrics.snapshot(),
        state.triage.stats(),
        state.audit.len(),
    );
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        output,
    )
}
