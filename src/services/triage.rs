//! Ticket triage: category, sentiment and a drafted reply
//!
//! Two strategies sit behind [`TriageService`]. The remote one asks a
//! completion endpoint for strict JSON; the local one is a keyword match.
//! Remote failures of any kind degrade to the local strategy, so
//! [`TriageService::classify`] always returns a fully populated result.
//!
//! Priority is derived separately by [`guess_priority`] from urgency words
//! and is never influenced by the classifier.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{Category, Priority, Sentiment, Ticket};
use crate::services::openai::{CompletionClient, TriageError};

const TRIAGE_PROMPT: &str = "You are a support triage assistant. Classify the ticket and draft a short reply.
Return strict JSON with keys: category, sentiment, reply.
Categories: shipping, refund, bug, vip, other.
Sentiment: positive, neutral, negative.
Keep reply under 120 words, friendly, and actionable. Do not include JSON fences.";

const SUGGESTION_PROMPT: &str = "You are a concise, helpful customer support agent.";

/// Shown in place of a suggestion when no remote client is configured
pub const MISSING_KEY_REASON: &str = "OPENAI_API_KEY missing or invalid";

/// Which strategy produced a [`TriageResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriageSource {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "local-fallback")]
    LocalFallback,
    #[serde(rename = "error-fallback")]
    ErrorFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub category: Category,
    pub sentiment: Sentiment,
    pub ai_suggestion: Option<String>,
    pub source: TriageSource,
}

/// Result of asking for a suggested reply on an existing ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestion {
    Generated(String),
    Unavailable(String),
}

impl Suggestion {
    /// Text to show; unavailable suggestions become a visible placeholder.
    pub fn text(&self) -> String {
        match self {
            Suggestion::Generated(text) => text.clone(),
            Suggestion::Unavailable(reason) => format!("[AI unavailable: {}]", reason),
        }
    }
}

/// Per-source outcome counters
#[derive(Debug, Default)]
pub struct TriageStats {
    pub remote: AtomicU64,
    pub local_fallback: AtomicU64,
    pub error_fallback: AtomicU64,
}

impl TriageStats {
    fn record(&self, source: TriageSource) {
        let counter = match source {
            TriageSource::OpenAi => &self.remote,
            TriageSource::LocalFallback => &self.local_fallback,
            TriageSource::ErrorFallback => &self.error_fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct TriageService {
    client: Option<Arc<dyn CompletionClient>>,
    timeout: Duration,
    stats: TriageStats,
}

impl TriageService {
    pub fn new(client: Option<Arc<dyn CompletionClient>>, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            stats: TriageStats::default(),
        }
    }

    /// Keyword-only classifier
    pub fn local() -> Self {
        Self::new(None, Duration::from_secs(10))
    }

    pub fn is_remote(&self) -> bool {
        self.client.is_some()
    }

    pub fn stats(&self) -> &TriageStats {
        &self.stats
    }

    pub async fn classify(&self, subject: &str, body: &str) -> TriageResult {
        let text = format!("{}\n{}", subject, body);

        let Some(client) = &self.client else {
            return self.finish(local_result(&text, TriageSource::LocalFallback));
        };

        let user = format!("Subject: {}\n\nBody:\n{}", subject, body);
        let result = match self.call(client.as_ref(), TRIAGE_PROMPT, &user, 0.2).await {
            Ok(reply) => {
                let parsed = parse_triage_reply(&reply);
                TriageResult {
                    category: normalize_category(parsed.category.as_deref()),
                    sentiment: normalize_sentiment(parsed.sentiment.as_deref()),
                    ai_suggestion: parsed.reply,
                    source: TriageSource::OpenAi,
                }
            }
            Err(e) => {
                warn!(error = %e, "Remote triage failed, using local classifier");
                local_result(&text, TriageSource::ErrorFallback)
            }
        };
        self.finish(result)
    }

    /// Draft a reply for an existing ticket.
    pub async fn suggest_reply(&self, ticket: &Ticket) -> Suggestion {
        let Some(client) = &self.client else {
            return Suggestion::Unavailable(MISSING_KEY_REASON.to_string());
        };

        let user = format!(
            "Ticket:\nSubject: {}\nCategory: {}\nBody:\n{}\n\nWrite a short, empathetic 3-5 sentence reply with next steps and any clarifying question.",
            ticket.subject, ticket.category, ticket.body
        );

        match self.call(client.as_ref(), SUGGESTION_PROMPT, &user, 0.3).await {
            Ok(text) => Suggestion::Generated(text),
            Err(e) => {
                warn!(ticket_id = ticket.id, error = %e, "Suggestion generation failed");
                Suggestion::Unavailable(e.to_string())
            }
        }
    }

    async fn call(
        &self,
        client: &dyn CompletionClient,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, TriageError> {
        match tokio::time::timeout(self.timeout, client.complete(system, user, temperature)).await
        {
            Ok(result) => result,
            Err(_) => Err(TriageError::Timeout(self.timeout)),
        }
    }

    fn finish(&self, result: TriageResult) -> TriageResult {
        self.stats.record(result.source);
        debug!(
            category = %result.category,
            sentiment = %result.sentiment,
            source = ?result.source,
            "Ticket triaged"
        );
        result
    }
}

fn local_result(text: &str, source: TriageSource) -> TriageResult {
    TriageResult {
        category: guess_category(text),
        sentiment: Sentiment::Neutral,
        ai_suggestion: None,
        source,
    }
}

// ---------------------------------------------------------------------------
// Local heuristics
// ---------------------------------------------------------------------------

static CATEGORY_RULES: Lazy<Vec<(Regex, Category)>> = Lazy::new(|| {
    [
        (r"\btracking|where.*order|deliv|ship|late|eta\b", Category::Shipping),
        (r"\brefund|return|chargeback|cancel\b", Category::Refund),
        (r"\berror|bug|broken|crash|doesn.?t work\b", Category::Bug),
        (r"\bvip|priority|enterprise|manager\b", Category::Vip),
    ]
    .into_iter()
    .map(|(pattern, category)| (Regex::new(pattern).expect("valid category regex"), category))
    .collect()
});

/// First matching rule wins; checked shipping, refund, bug, vip.
pub fn guess_category(text: &str) -> Category {
    let lowered = text.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(re, _)| re.is_match(&lowered))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Other)
}

/// Urgency words raise priority to high.
pub fn guess_priority(text: &str) -> Priority {
    let lowered = text.to_lowercase();
    if ["urgent", "immediately", "asap"]
        .iter()
        .any(|word| lowered.contains(word))
    {
        Priority::High
    } else {
        Priority::Normal
    }
}

pub fn normalize_category(value: Option<&str>) -> Category {
    value
        .and_then(|v| v.parse().ok())
        .unwrap_or(Category::Other)
}

pub fn normalize_sentiment(value: Option<&str>) -> Sentiment {
    value
        .and_then(|v| v.parse().ok())
        .unwrap_or(Sentiment::Neutral)
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Raw fields from a model reply; absent when the reply could not be read
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriageReply {
    pub category: Option<String>,
    pub sentiment: Option<String>,
    pub reply: Option<String>,
}

pub fn parse_triage_reply(text: &str) -> TriageReply {
    let value = serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(Value::is_object)
        .or_else(|| rescue_json_object(text))
        .unwrap_or(Value::Null);

    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    TriageReply {
        category: field("category"),
        sentiment: field("sentiment"),
        reply: field("reply"),
    }
}

/// Find the first balanced `{...}` in surrounding prose that parses as a
/// JSON object.
fn rescue_json_object(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(|(start, _)| balanced_object_end(&text[start..]).map(|end| &text[start..start + end]))
        .find_map(|candidate| {
            serde_json::from_str::<Value>(candidate)
                .ok()
                .filter(Value::is_object)
        })
}

/// Byte length of the object starting at `s[0] == '{'`, if it closes.
fn balanced_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
