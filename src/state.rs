//! Application state shared across handlers

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::buffer::AuditBuffer;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::Database;
use crate::models::{NewAuditEvent, TicketEvent, TicketEventKind};
use crate::routes::metrics::Metrics;
use crate::services::magic_link::MagicLinkIssuer;
use crate::services::presence::PresenceTracker;
use crate::services::triage::TriageService;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub triage: Arc<TriageService>,
    /// Audit side channel, drained by the flush task
    pub audit: AuditBuffer,
    /// Ticket change notifications for WebSocket subscribers
    pub events: broadcast::Sender<TicketEvent>,
    pub magic_links: Arc<MagicLinkIssuer>,
    pub presence: Arc<PresenceTracker>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(db: Database, triage: TriageService, config: &Config) -> Self {
        let clock = db.clock();
        let (events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            triage: Arc::new(triage),
            audit: AuditBuffer::new(config.audit_buffer_capacity),
            events,
            magic_links: Arc::new(MagicLinkIssuer::new(
                &config.public_base_url,
                config.magic_link_ttl,
                clock.clone(),
            )),
            presence: Arc::new(PresenceTracker::new(config.presence_ttl, clock.clone())),
            clock,
            metrics: Arc::new(Metrics::new()),
            db: Arc::new(db),
        }
    }

    /// Queue an audit event. Never blocks; a full buffer drops the event.
    pub fn audit(&self, event: NewAuditEvent) {
        let action = event.action.clone();
        if self.audit.record(event) {
            self.metrics.inc_audit_recorded();
        } else {
            self.metrics.inc_audit_dropped();
            warn!(action = %action, "Audit buffer full, event dropped");
        }
    }

    /// Notify stream subscribers; having none is not an error.
    pub fn publish(&self, kind: TicketEventKind, ticket_id: i64) {
        let _ = self.events.send(TicketEvent {
            ticket_id,
            kind,
            at: self.clock.now(),
        });
    }
}
