//! Ticket store: tickets, messages, tags and CSAT ratings

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use tracing::{debug, info};

use super::Database;
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, AuthorType, CsatRating, Message, NewTicket, Priority, PublicTicketView,
    Ticket, TicketStatus,
};
use crate::services::triage::{guess_priority, TriageService};

const TICKET_COLUMNS: &str = "id, subject, body, channel, requester_email, requester_name, \
     status, priority, category, sentiment, sla_due_at, ai_suggestion, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: i64,
    subject: String,
    body: String,
    channel: String,
    requester_email: String,
    requester_name: Option<String>,
    status: String,
    priority: String,
    category: String,
    sentiment: Option<String>,
    sla_due_at: DateTime<Utc>,
    ai_suggestion: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self, tags: Vec<String>) -> Ticket {
        Ticket {
            id: self.id,
            subject: self.subject,
            body: self.body,
            channel: self.channel,
            requester_email: self.requester_email,
            requester_name: self.requester_name,
            status: self.status.parse().unwrap_or(TicketStatus::New),
            priority: self.priority.parse().unwrap_or(Priority::Normal),
            category: self.category.parse().unwrap_or(crate::models::Category::Other),
            sentiment: self.sentiment.and_then(|s| s.parse().ok()),
            sla_due_at: self.sla_due_at,
            tags,
            ai_suggestion: self.ai_suggestion,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    ticket_id: i64,
    author_type: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            ticket_id: row.ticket_id,
            author_type: row.author_type.parse().unwrap_or(AuthorType::System),
            body: row.body,
            created_at: row.created_at,
        }
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Ticket {} not found", id))
}

/// Creation time of a ticket, or NotFound.
async fn ticket_created_at(conn: &mut SqliteConnection, id: i64) -> Result<DateTime<Utc>> {
    sqlx::query_scalar::<_, DateTime<Utc>>("SELECT created_at FROM tickets WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Existence check that opens every mutation, returning the creation time.
/// It is a write, so the transaction holds the write lock before its first
/// read and never has to upgrade a stale WAL snapshot (SQLITE_BUSY_SNAPSHOT).
async fn lock_ticket(conn: &mut SqliteConnection, id: i64) -> Result<DateTime<Utc>> {
    sqlx::query_scalar::<_, DateTime<Utc>>(
        "UPDATE tickets SET updated_at = updated_at WHERE id = ? RETURNING created_at",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| not_found(id))
}

async fn touch(conn: &mut SqliteConnection, id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE tickets SET updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn tags_of(conn: &mut SqliteConnection, id: i64) -> Result<Vec<String>> {
    let tags = sqlx::query_scalar::<_, String>(
        "SELECT tag FROM ticket_tags WHERE ticket_id = ? ORDER BY tag ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tags)
}

impl Database {
    /// Triage the ticket, then write it together with its opening customer
    /// message.
    pub async fn create_ticket(&self, input: NewTicket, triage: &TriageService) -> Result<Ticket> {
        let triaged = triage.classify(&input.subject, &input.body).await;
        let priority = input
            .priority
            .unwrap_or_else(|| guess_priority(&format!("{} {}", input.subject, input.body)));

        let now = self.now();
        let sla_due_at = now + priority.sla();

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO tickets (
                subject, body, channel, requester_email, requester_email_norm,
                requester_name, status, priority, category, sentiment,
                sla_due_at, ai_suggestion, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&input.subject)
        .bind(&input.body)
        .bind(&input.channel)
        .bind(&input.requester.email)
        .bind(normalize_email(&input.requester.email))
        .bind(&input.requester.name)
        .bind(TicketStatus::New.as_str())
        .bind(priority.as_str())
        .bind(triaged.category.as_str())
        .bind(triaged.sentiment.as_str())
        .bind(sla_due_at)
        .bind(&triaged.ai_suggestion)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO messages (ticket_id, author_type, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(AuthorType::Customer.as_str())
        .bind(&input.body)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            ticket_id = id,
            category = %triaged.category,
            priority = %priority,
            source = ?triaged.source,
            "Ticket created"
        );

        Ok(Ticket {
            id,
            subject: input.subject,
            body: input.body,
            channel: input.channel,
            requester_email: input.requester.email,
            requester_name: input.requester.name,
            status: TicketStatus::New,
            priority,
            category: triaged.category,
            sentiment: Some(triaged.sentiment),
            sla_due_at,
            tags: Vec::new(),
            ai_suggestion: triaged.ai_suggestion,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_ticket(&self, id: i64) -> Result<Ticket> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE id = ?",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| not_found(id))?;

        let tags = tags_of(&mut conn, id).await?;
        Ok(row.into_ticket(tags))
    }

    /// All tickets, most recently updated first
    pub async fn list_tickets(&self) -> Result<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets ORDER BY updated_at DESC, id DESC",
            TICKET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        self.with_tags(rows).await
    }

    /// Tickets owned by `email`, most recently updated first. Matches on the
    /// same normalization as [`Ticket::is_owned_by`].
    pub async fn list_by_requester(&self, email: &str) -> Result<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE requester_email_norm = ? \
             ORDER BY updated_at DESC, id DESC",
            TICKET_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_all(&self.pool)
        .await?;

        self.with_tags(rows).await
    }

    async fn with_tags(&self, rows: Vec<TicketRow>) -> Result<Vec<Ticket>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT ticket_id, tag FROM ticket_tags WHERE ticket_id IN (");
        let mut ids = builder.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
        builder.push(") ORDER BY tag ASC");

        let pairs: Vec<(i64, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        for (ticket_id, tag) in pairs {
            tags.entry(ticket_id).or_default().push(tag);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let ticket_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_ticket(ticket_tags)
            })
            .collect())
    }

    /// Messages of a ticket, oldest first
    pub async fn list_messages(&self, ticket_id: i64) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        ticket_created_at(&mut conn, ticket_id).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, ticket_id, author_type, body, created_at FROM messages \
             WHERE ticket_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Append a message and bump the ticket's `updated_at`.
    ///
    /// The message timestamp never precedes the ticket's latest message.
    pub async fn append_message(
        &self,
        ticket_id: i64,
        author_type: AuthorType,
        body: &str,
    ) -> Result<Message> {
        if body.trim().is_empty() {
            return Err(AppError::InvalidRequest("body is required".into()));
        }

        let mut tx = self.pool.begin().await?;
        let created_at = lock_ticket(&mut tx, ticket_id).await?;

        let last_message = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM messages WHERE ticket_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut at = self.now().max(created_at);
        if let Some(last) = last_message {
            at = at.max(last);
        }

        let id = sqlx::query(
            "INSERT INTO messages (ticket_id, author_type, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(ticket_id)
        .bind(author_type.as_str())
        .bind(body)
        .bind(at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        touch(&mut tx, ticket_id, at).await?;
        tx.commit().await?;

        debug!(ticket_id, message_id = id, author = %author_type, "Message appended");

        Ok(Message {
            id,
            ticket_id,
            author_type,
            body: body.to_string(),
            created_at: at,
        })
    }

    /// Any status may follow any other.
    pub async fn set_status(&self, ticket_id: i64, status: TicketStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let created_at = lock_ticket(&mut tx, ticket_id).await?;
        let at = self.now().max(created_at);

        sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(at)
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(ticket_id, status = %status, "Status updated");
        Ok(())
    }

    /// Add a trimmed tag. Re-adding an existing tag changes nothing but
    /// `updated_at`. Returns the ticket's tags afterwards.
    pub async fn add_tag(&self, ticket_id: i64, tag: &str) -> Result<Vec<String>> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(AppError::InvalidRequest("tag is required".into()));
        }

        let mut tx = self.pool.begin().await?;
        let created_at = lock_ticket(&mut tx, ticket_id).await?;

        sqlx::query("INSERT OR IGNORE INTO ticket_tags (ticket_id, tag) VALUES (?, ?)")
            .bind(ticket_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;

        touch(&mut tx, ticket_id, self.now().max(created_at)).await?;
        let tags = tags_of(&mut tx, ticket_id).await?;
        tx.commit().await?;

        Ok(tags)
    }

    /// Record a 1-5 rating. Ratings are telemetry, so `updated_at` is left alone.
    pub async fn record_csat(
        &self,
        ticket_id: i64,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<CsatRating> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::InvalidRequest(
                "rating must be an integer between 1 and 5".into(),
            ));
        }
        let comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let mut tx = self.pool.begin().await?;
        lock_ticket(&mut tx, ticket_id).await?;

        let created_at = self.now();
        let id = sqlx::query(
            "INSERT INTO csat (ticket_id, rating, comment, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(ticket_id)
        .bind(rating)
        .bind(&comment)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(CsatRating {
            id,
            ticket_id,
            rating,
            comment,
            created_at,
        })
    }

    pub async fn set_ai_suggestion(&self, ticket_id: i64, suggestion: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let created_at = lock_ticket(&mut tx, ticket_id).await?;

        sqlx::query("UPDATE tickets SET ai_suggestion = ?, updated_at = ? WHERE id = ?")
            .bind(suggestion)
            .bind(self.now().max(created_at))
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Ticket and conversation, only for the ticket's requester.
    pub async fn get_public_ticket(&self, ticket_id: i64, email: &str) -> Result<PublicTicketView> {
        let ticket = self.owned_ticket(ticket_id, email).await?;
        let messages = self.list_messages(ticket_id).await?;
        Ok(PublicTicketView { ticket, messages })
    }

    /// Customer reply on a ticket they own.
    pub async fn append_public_message(
        &self,
        ticket_id: i64,
        email: &str,
        body: &str,
    ) -> Result<Message> {
        self.owned_ticket(ticket_id, email).await?;
        self.append_message(ticket_id, AuthorType::Customer, body).await
    }

    async fn owned_ticket(&self, ticket_id: i64, email: &str) -> Result<Ticket> {
        let ticket = self.get_ticket(ticket_id).await?;
        if !ticket.is_owned_by(email) {
            return Err(AppError::Forbidden("Forbidden".into()));
        }
        Ok(ticket)
    }

    /// Every distinct tag in use, sorted
    pub async fn list_all_tags(&self) -> Result<Vec<String>> {
        let tags = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tag FROM ticket_tags ORDER BY tag ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tags)
    }
}
