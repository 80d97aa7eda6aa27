//! Core domain models for the support desk

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, Result};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::InvalidRequest(format!(
                        "Invalid {} '{}'. Valid options: {}",
                        $label,
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Lifecycle state of a ticket. Any state may be set from any other.
    TicketStatus, "status" {
        New => "new",
        Open => "open",
        Pending => "pending",
        Solved => "solved",
    }
);

text_enum!(
    Priority, "priority" {
        Normal => "normal",
        High => "high",
    }
);

text_enum!(
    Category, "category" {
        Shipping => "shipping",
        Refund => "refund",
        Bug => "bug",
        Vip => "vip",
        Other => "other",
    }
);

text_enum!(
    Sentiment, "sentiment" {
        Positive => "positive",
        Neutral => "neutral",
        Negative => "negative",
    }
);

text_enum!(
    /// Who wrote a message
    AuthorType, "author_type" {
        Customer => "customer",
        Agent => "agent",
        System => "system",
    }
);

impl Priority {
    /// Time allowed until the first response is due
    pub fn sla(&self) -> Duration {
        match self {
            Priority::High => Duration::hours(12),
            Priority::Normal => Duration::hours(24),
        }
    }
}

/// A customer support request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub channel: String,
    pub requester_email: String,
    pub requester_name: Option<String>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub category: Category,
    pub sentiment: Option<Sentiment>,
    pub sla_due_at: DateTime<Utc>,
    /// Sorted, unique
    pub tags: Vec<String>,
    pub ai_suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Case-insensitive ownership check against the requester email
    pub fn is_owned_by(&self, email: &str) -> bool {
        normalize_email(&self.requester_email) == normalize_email(email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub ticket_id: i64,
    pub author_type: AuthorType,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CsatRating {
    pub id: i64,
    pub ticket_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub ticket_id: Option<i64>,
    pub actor_type: String,
    pub actor: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit event waiting in the side channel
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub ticket_id: Option<i64>,
    pub actor_type: String,
    pub actor: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NewAuditEvent {
    pub fn for_ticket(
        ticket_id: i64,
        actor_type: AuthorType,
        actor: impl Into<String>,
        action: &str,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: Some(ticket_id),
            actor_type: actor_type.as_str().to_string(),
            actor: actor.into(),
            action: action.to_string(),
            payload,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbArticle {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing/search view of an article
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbArticleSummary {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Canned agent reply
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CannedReply {
    pub id: u32,
    pub name: &'static str,
    pub body: &'static str,
}

pub static CANNED_REPLIES: [CannedReply; 3] = [
    CannedReply {
        id: 1,
        name: "Shipping delay apology",
        body: "Sorry about the delay! We've escalated with our carrier. Please allow 24-48h. We'll keep you posted and refund shipping if it misses the new ETA.",
    },
    CannedReply {
        id: 2,
        name: "Refund policy",
        body: "We can refund to the original payment method within 3-5 business days once the item is received back. I've sent a return label. Let me know if you need a pickup.",
    },
    CannedReply {
        id: 3,
        name: "Troubleshooting basics",
        body: "Please try: 1) power cycle, 2) reseat cables, 3) factory reset. If that doesn't help, share a short video and your device firmware version.",
    },
];

/// Pushed to WebSocket subscribers after every ticket mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketEvent {
    pub ticket_id: i64,
    pub kind: TicketEventKind,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketEventKind {
    Created,
    Message,
    Status,
    Tag,
    Csat,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn required(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidRequest(format!("{} is required", field)));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Request contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequesterInput {
    #[serde(default)]
    pub email: String,
    pub name: Option<String>,
}

/// Request payload for creating a ticket
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub channel: Option<String>,
    pub requester: Option<RequesterInput>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    pub email: String,
    pub name: Option<String>,
}

/// Validated ticket creation input
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub subject: String,
    pub body: String,
    pub channel: String,
    pub requester: Requester,
    /// Overrides the urgency heuristic when present
    pub priority: Option<Priority>,
}

impl CreateTicketRequest {
    pub fn validate(self) -> Result<NewTicket> {
        let subject = required("subject", self.subject)?;
        let body = required("body", self.body)?;
        let requester = self.requester.unwrap_or_default();
        let email = requester.email.trim().to_string();
        if email.is_empty() {
            return Err(AppError::InvalidRequest("requester.email is required".into()));
        }
        if !is_valid_email(&email) {
            return Err(AppError::InvalidRequest(format!(
                "requester.email '{}' is not a valid email address",
                email
            )));
        }
        let name = requester
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let channel = self
            .channel
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "web".to_string());
        let priority = self.priority.as_deref().map(Priority::from_str).transpose()?;

        Ok(NewTicket {
            subject,
            body,
            channel,
            requester: Requester { email, name },
            priority,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppendMessageRequest {
    #[serde(default)]
    pub body: String,
    pub author_type: Option<String>,
}

impl AppendMessageRequest {
    /// Agent routes default to an agent author; `requester` is the legacy
    /// spelling of `customer`.
    pub fn author(&self) -> Result<AuthorType> {
        match self.author_type.as_deref().map(str::trim) {
            None | Some("") => Ok(AuthorType::Agent),
            Some(t) if t.eq_ignore_ascii_case("requester") => Ok(AuthorType::Customer),
            Some(t) => t.parse(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicMessageRequest {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetStatusRequest {
    #[serde(default)]
    pub status: String,
}

impl SetStatusRequest {
    pub fn status(&self) -> Result<TicketStatus> {
        required("status", self.status.clone())?.parse()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddTagRequest {
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CsatRequest {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriageProbeRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Customer-facing routes identify the caller by `?email=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

impl EmailQuery {
    pub fn email(&self) -> Result<String> {
        let email = normalize_email(self.email.as_deref().unwrap_or_default());
        if email.is_empty() {
            return Err(AppError::InvalidRequest("email is required".into()));
        }
        Ok(email)
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsResponse {
    pub ok: bool,
    pub tags: Vec<String>,
}

/// Ticket plus its conversation, as shown to the requester
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTicketView {
    pub ticket: Ticket,
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subject: &str, body: &str, email: &str) -> CreateTicketRequest {
        CreateTicketRequest {
            subject: subject.into(),
            body: body.into(),
            channel: None,
            requester: Some(RequesterInput {
                email: email.into(),
                name: None,
            }),
            priority: None,
        }
    }

    #[test]
    fn test_validate_defaults_channel_to_web() {
        let ticket = request("Hi", "Help", "a@x.com").validate().unwrap();
        assert_eq!(ticket.channel, "web");
        assert_eq!(ticket.priority, None);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert!(matches!(
            request("", "Help", "a@x.com").validate(),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            request("Hi", "   ", "a@x.com").validate(),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            request("Hi", "Help", "not-an-email").validate(),
            Err(AppError::InvalidRequest(_))
        ));
        let mut no_requester = request("Hi", "Help", "a@x.com");
        no_requester.requester = None;
        assert!(matches!(
            no_requester.validate(),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_parses_priority() {
        let mut req = request("Hi", "Help", "a@x.com");
        req.priority = Some("high".into());
        assert_eq!(req.clone().validate().unwrap().priority, Some(Priority::High));
        req.priority = Some("critical".into());
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Solved".parse::<TicketStatus>().unwrap(), TicketStatus::Solved);
        assert!("closed".parse::<TicketStatus>().is_err());
        let missing = SetStatusRequest::default();
        assert!(missing.status().is_err());
    }

    #[test]
    fn test_author_aliases() {
        let req = AppendMessageRequest {
            body: "x".into(),
            author_type: Some("requester".into()),
        };
        assert_eq!(req.author().unwrap(), AuthorType::Customer);
        let req = AppendMessageRequest {
            body: "x".into(),
            author_type: None,
        };
        assert_eq!(req.author().unwrap(), AuthorType::Agent);
    }

    #[test]
    fn test_sla_hours() {
        assert_eq!(Priority::High.sla(), Duration::hours(12));
        assert_eq!(Priority::Normal.sla(), Duration::hours(24));
    }

    #[test]
    fn test_email_query_normalizes() {
        let q = EmailQuery {
            email: Some("  A@X.com ".into()),
        };
        assert_eq!(q.email().unwrap(), "a@x.com");
        assert!(EmailQuery::default().email().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&TicketStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(Category::Vip.to_string(), "vip");
    }
}
