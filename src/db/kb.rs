//! Knowledge base articles with FTS5 search

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{parse_tag_list, Database};
use crate::error::{AppError, Result};
use crate::models::{KbArticle, KbArticleSummary};

/// Maximum search hits returned
pub const SEARCH_LIMIT: i64 = 10;

const SEED_ARTICLES: [(&str, &str, &[&str]); 3] = [
    (
        "Track your order",
        "Visit Orders and enter your email and order number. If the carrier shows \"label created\", allow 24-48 hours for the first scan.",
        &["shipping", "orders", "tracking"],
    ),
    (
        "Start a return or exchange",
        "We accept returns within 30 days. Use the Returns Portal to get a prepaid label. Refunds post 3-5 business days after we receive it.",
        &["returns", "refund", "exchange"],
    ),
    (
        "Troubleshoot connection issues",
        "Power cycle the device, reseat cables, and factory reset. Check firmware is current. If issues persist, send a 30s video of the behavior.",
        &["troubleshooting", "connectivity", "firmware"],
    ),
];

#[derive(Debug, sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    body: String,
    tags: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    title: String,
    excerpt: String,
    tags: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<SummaryRow> for KbArticleSummary {
    fn from(row: SummaryRow) -> Self {
        KbArticleSummary {
            id: row.id,
            title: row.title,
            excerpt: row.excerpt,
            tags: parse_tag_list(row.tags.as_deref()),
            updated_at: row.updated_at,
        }
    }
}

/// Quote every whitespace-separated token so user input is never read as
/// FTS5 query syntax.
fn fts_query(q: &str) -> String {
    q.split_whitespace()
        .map(|token| token.replace('"', ""))
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{}\"", token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl Database {
    /// Insert the starter articles when the knowledge base is empty.
    pub async fn seed_kb_if_empty(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kb_articles")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(0);
        }

        let now = self.now();
        let mut tx = self.pool.begin().await?;
        for (title, body, tags) in SEED_ARTICLES {
            sqlx::query(
                "INSERT INTO kb_articles (title, body, tags, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(title)
            .bind(body)
            .bind(serde_json::to_string(tags)?)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(count = SEED_ARTICLES.len(), "Seeded knowledge base");
        Ok(SEED_ARTICLES.len())
    }

    /// Newest first
    pub async fn list_articles(&self) -> Result<Vec<KbArticleSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, title, substr(body, 1, 240) AS excerpt, tags, updated_at \
             FROM kb_articles ORDER BY updated_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(KbArticleSummary::from).collect())
    }

    pub async fn get_article(&self, id: i64) -> Result<KbArticle> {
        let row = sqlx::query_as::<_, ArticleRow>(
            "SELECT id, title, body, tags, created_at, updated_at FROM kb_articles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Article {} not found", id)))?;

        Ok(KbArticle {
            id: row.id,
            title: row.title,
            body: row.body,
            tags: parse_tag_list(row.tags.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub async fn create_article(&self, title: &str, body: &str, tags: &[String]) -> Result<KbArticle> {
        let title = title.trim();
        let body = body.trim();
        if title.chars().count() < 3 {
            return Err(AppError::InvalidRequest(
                "title must be at least 3 characters".into(),
            ));
        }
        if body.chars().count() < 20 {
            return Err(AppError::InvalidRequest(
                "body must be at least 20 characters".into(),
            ));
        }

        let mut clean_tags: Vec<String> = Vec::new();
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !clean_tags.iter().any(|existing| existing == tag) {
                clean_tags.push(tag.to_string());
            }
        }

        let now = self.now();
        let id = sqlx::query(
            "INSERT INTO kb_articles (title, body, tags, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(title)
        .bind(body)
        .bind(serde_json::to_string(&clean_tags)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(KbArticle {
            id,
            title: title.to_string(),
            body: body.to_string(),
            tags: clean_tags,
            created_at: now,
            updated_at: now,
        })
    }

    /// Ranked full-text search, falling back to substring match when the
    /// index has nothing.
    pub async fn search_articles(&self, q: &str) -> Result<Vec<KbArticleSummary>> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }

        let query = fts_query(q);
        let mut rows = if query.is_empty() {
            Vec::new()
        } else {
            match sqlx::query_as::<_, SummaryRow>(
                r#"
                SELECT a.id, a.title, substr(a.body, 1, 240) AS excerpt, a.tags, a.updated_at
                FROM kb_articles_fts
                JOIN kb_articles a ON a.id = kb_articles_fts.rowid
                WHERE kb_articles_fts MATCH ?
                ORDER BY bm25(kb_articles_fts)
                LIMIT ?
                "#,
            )
            .bind(&query)
            .bind(SEARCH_LIMIT)
            .fetch_all(&self.pool)
            .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(error = %e, query = %query, "Full-text search failed, using substring match");
                    Vec::new()
                }
            }
        };

        if rows.is_empty() {
            let pattern = like_pattern(q);
            rows = sqlx::query_as::<_, SummaryRow>(
                r#"
                SELECT id, title, substr(body, 1, 240) AS excerpt, tags, updated_at
                FROM kb_articles
                WHERE title LIKE ? ESCAPE '\' OR body LIKE ? ESCAPE '\'
                ORDER BY updated_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(&pattern)
            .bind(&pattern)
            .bind(SEARCH_LIMIT)
            .fetch_all(&self.pool)
            .await?;
        }

        Ok(rows.into_iter().map(KbArticleSummary::from).collect())
    }
}
