//! Lock-free side channel for audit events

use crate::models::NewAuditEvent;
use crossbeam::queue::ArrayQueue;
use std::sync::Arc;

/// Bounded audit queue backed by crossbeam's ArrayQueue.
///
/// Request handlers push, the flush task drains. Pushing never blocks; when
/// the queue is full the event is handed back and the caller drops it.
#[derive(Clone)]
pub struct AuditBuffer {
    queue: Arc<ArrayQueue<NewAuditEvent>>,
}

impl AuditBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    /// Returns `false` if the buffer was full and the event was discarded.
    pub fn record(&self, event: NewAuditEvent) -> bool {
        self.queue.push(event).is_ok()
    }

    /// Pop up to `max` events, oldest first.
    pub fn pop_batch(&self, max: usize) -> Vec<NewAuditEvent> {
        let mut batch = Vec::with_capacity(max.min(self.queue.len()));
        while batch.len() < max {
            match self.queue.pop() {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        batch
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorType;
    use chrono::Utc;
    use serde_json::json;

    fn event(action: &str) -> NewAuditEvent {
        NewAuditEvent::for_ticket(1, AuthorType::Agent, "agent", action, json!({}), Utc::now())
    }

    #[test]
    fn test_record_and_drain_in_order() {
        let buffer = AuditBuffer::new(10);
        assert!(buffer.record(event("create")));
        assert!(buffer.record(event("reply")));

        let batch = buffer.pop_batch(10);
        let actions: Vec<_> = batch.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["create", "reply"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_drops() {
        let buffer = AuditBuffer::new(2);
        assert!(buffer.record(event("a")));
        assert!(buffer.record(event("b")));
        assert!(!buffer.record(event("c")));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_pop_batch_max() {
        let buffer = AuditBuffer::new(100);
        for _ in 0..50 {
            buffer.record(event("tag"));
        }
        assert_eq!(buffer.pop_batch(20).len(), 20);
        assert_eq!(buffer.len(), 30);
        assert_eq!(buffer.capacity(), 100);
    }
}
