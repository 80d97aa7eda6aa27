//! Audit flush task - moves audit events from the side channel to storage

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::buffer::AuditBuffer;
use crate::db::Database;
use crate::routes::metrics::Metrics;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const MAX_BATCH: usize = 1_000;

/// Drain the buffer every second until the process exits.
pub async fn audit_flush_task(buffer: AuditBuffer, db: Arc<Database>, metrics: Arc<Metrics>) {
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);

    info!("Audit flush task started (1s interval)");

    loop {
        interval.tick().await;
        while flush_once(&buffer, &db, &metrics).await == MAX_BATCH {}
    }
}

/// Write one batch; returns how many events were taken off the buffer.
/// Events that fail to persist are logged and dropped.
pub async fn flush_once(buffer: &AuditBuffer, db: &Database, metrics: &Metrics) -> usize {
    let batch = buffer.pop_batch(MAX_BATCH);
    if batch.is_empty() {
        return 0;
    }

    let batch_size = batch.len();
    debug!(batch_size, "Flushing audit batch");

    match db.insert_audit_batch(&batch).await {
        Ok(inserted) => {
            metrics.inc_audit_persisted(inserted as u64);
            if inserted < batch_size {
                error!(inserted, expected = batch_size, "Some audit events failed to insert");
            }
        }
        Err(e) => {
            error!(error = %e, batch_size, "Failed to insert audit batch");
        }
    }
    batch_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_db, start};
    use crate::models::{AuthorType, NewAuditEvent};
    use serde_json::json;

    #[tokio::test]
    async fn test_flush_once_persists_and_counts() {
        let (_clock, db) = memory_db().await;
        let buffer = AuditBuffer::new(16);
        let metrics = Metrics::new();

        for action in ["create", "reply", "status"] {
            buffer.record(NewAuditEvent::for_ticket(
                3,
                AuthorType::Agent,
                "agent",
                action,
                json!({}),
                start(),
            ));
        }

        assert_eq!(flush_once(&buffer, &db, &metrics).await, 3);
        assert!(buffer.is_empty());
        assert_eq!(metrics.snapshot().audit_persisted_total, 3);
        assert_eq!(db.list_audit(3).await.unwrap().len(), 3);

        assert_eq!(flush_once(&buffer, &db, &metrics).await, 0);
    }
}
