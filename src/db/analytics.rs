//! Snapshot queries feeding the analytics aggregator

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::Database;
use crate::analytics::{AnalyticsSnapshot, TicketFacts};
use crate::error::Result;
use crate::models::{AuthorType, TicketStatus};

impl Database {
    /// Read what analytics needs without locking out writers; concurrent
    /// mutations may or may not be reflected.
    pub async fn analytics_snapshot(&self) -> Result<AnalyticsSnapshot> {
        let tickets: Vec<(i64, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, status, created_at FROM tickets")
                .fetch_all(&self.pool)
                .await?;

        let agent_messages: Vec<(i64, DateTime<Utc>)> =
            sqlx::query_as("SELECT ticket_id, created_at FROM messages WHERE author_type = ?")
                .bind(AuthorType::Agent.as_str())
                .fetch_all(&self.pool)
                .await?;

        let mut first_reply: HashMap<i64, DateTime<Utc>> = HashMap::new();
        for (ticket_id, created_at) in agent_messages {
            first_reply
                .entry(ticket_id)
                .and_modify(|earliest| *earliest = (*earliest).min(created_at))
                .or_insert(created_at);
        }

        let ratings: Vec<i64> = sqlx::query_scalar("SELECT rating FROM csat")
            .fetch_all(&self.pool)
            .await?;

        Ok(AnalyticsSnapshot {
            tickets: tickets
                .into_iter()
                .map(|(id, status, created_at)| TicketFacts {
                    id,
                    status: status.parse().unwrap_or(TicketStatus::New),
                    created_at,
                    first_agent_reply_at: first_reply.get(&id).copied(),
                })
                .collect(),
            ratings,
        })
    }
}
