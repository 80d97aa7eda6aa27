//! Which agents are currently looking at a ticket

use chrono::Duration;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::Clock;

/// Heartbeat-based presence; a viewer disappears once its last heartbeat
/// is older than the TTL.
pub struct PresenceTracker {
    viewers: TtlCache<(i64, String), ()>,
}

impl PresenceTracker {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            viewers: TtlCache::new(ttl, clock),
        }
    }

    pub fn heartbeat(&self, ticket_id: i64, agent_id: &str) {
        self.viewers.insert((ticket_id, agent_id.to_string()), ());
    }

    pub fn leave(&self, ticket_id: i64, agent_id: &str) {
        self.viewers.remove(&(ticket_id, agent_id.to_string()));
    }

    /// Live viewers of a ticket, sorted
    pub fn viewers(&self, ticket_id: i64) -> Vec<String> {
        let mut agents: Vec<String> = self
            .viewers
            .live_keys(|(tid, _)| *tid == ticket_id)
            .into_iter()
            .map(|(_, agent)| agent)
            .collect();
        agents.sort();
        agents
    }

    pub fn sweep(&self) -> usize {
        self.viewers.sweep()
    }
}
