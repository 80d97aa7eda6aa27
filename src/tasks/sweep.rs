//! Sweep task - evicts expired magic-link tokens and presence heartbeats

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::services::magic_link::MagicLinkIssuer;
use crate::services::presence::PresenceTracker;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn sweep_task(magic_links: Arc<MagicLinkIssuer>, presence: Arc<PresenceTracker>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    info!("Sweep task started (60s interval)");

    loop {
        interval.tick().await;

        let tokens = magic_links.sweep();
        let viewers = presence.sweep();
        if tokens > 0 || viewers > 0 {
            debug!(tokens, viewers, "Evicted expired cache entries");
        }
    }
}
