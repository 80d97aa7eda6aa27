//! One-time magic-link tokens for the customer portal

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{Lookup, TtlCache};
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::normalize_email;

/// Issued link, returned to the caller instead of being emailed
#[derive(Debug, Clone, Serialize)]
pub struct MagicLink {
    pub ok: bool,
    pub url: String,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    InvalidOrExpired,
    Expired,
}

impl ConsumeError {
    pub fn code(&self) -> &'static str {
        match self {
            ConsumeError::InvalidOrExpired => "invalid_or_expired",
            ConsumeError::Expired => "expired",
        }
    }
}

pub struct MagicLinkIssuer {
    tokens: TtlCache<String, String>,
    base_url: String,
}

impl MagicLinkIssuer {
    pub fn new(base_url: &str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: TtlCache::new(ttl, clock),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn issue(&self, email: &str) -> Result<MagicLink> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::InvalidRequest("email_required".into()));
        }

        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), email);

        Ok(MagicLink {
            ok: true,
            url: format!("{}/portal-login.html?token={}", self.base_url, token),
            expires_in_seconds: self.tokens.ttl().num_seconds(),
        })
    }

    /// Redeem a token; each token works once.
    pub fn consume(&self, token: &str) -> std::result::Result<String, ConsumeError> {
        match self.tokens.take(&token.to_string()) {
            Lookup::Fresh(email) => Ok(email),
            Lookup::Expired => Err(ConsumeError::Expired),
            Lookup::Missing => Err(ConsumeError::InvalidOrExpired),
        }
    }

    pub fn sweep(&self) -> usize {
        self.tokens.sweep()
    }

    pub fn outstanding(&self) -> usize {
        self.tokens.len()
    }
}
