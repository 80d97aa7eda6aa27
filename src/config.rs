//! Environment-driven configuration

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    /// Remote triage is enabled only when this is set
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub triage_timeout: Duration,
    pub audit_buffer_capacity: usize,
    pub broadcast_capacity: usize,
    pub public_base_url: String,
    pub magic_link_ttl: chrono::Duration,
    pub presence_ttl: chrono::Duration,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 4000)),
            database_url: "sqlite://data/support.db".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            triage_timeout: Duration::from_secs(10),
            audit_buffer_capacity: 10_000,
            broadcast_capacity: 1024,
            public_base_url: "http://localhost:4000".to_string(),
            magic_link_ttl: chrono::Duration::seconds(900),
            presence_ttl: chrono::Duration::seconds(30),
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Read configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset and blank values take
    /// the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => anyhow::bail!("Invalid LOG_FORMAT {:?} (expected text or json)", other),
        };

        Ok(Self {
            listen_addr: parse_or(get("LISTEN_ADDR"), "LISTEN_ADDR", defaults.listen_addr)?,
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            triage_timeout: Duration::from_secs(parse_or(
                get("TRIAGE_TIMEOUT_SECS"),
                "TRIAGE_TIMEOUT_SECS",
                defaults.triage_timeout.as_secs(),
            )?),
            audit_buffer_capacity: parse_or(
                get("AUDIT_BUFFER_CAPACITY"),
                "AUDIT_BUFFER_CAPACITY",
                defaults.audit_buffer_capacity,
            )?,
            broadcast_capacity: parse_or(
                get("BROADCAST_CAPACITY"),
                "BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?,
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
            magic_link_ttl: chrono::Duration::seconds(parse_or(
                get("MAGIC_LINK_TTL_SECS"),
                "MAGIC_LINK_TTL_SECS",
                defaults.magic_link_ttl.num_seconds(),
            )?),
            presence_ttl: chrono::Duration::seconds(parse_or(
                get("PRESENCE_TTL_SECS"),
                "PRESENCE_TTL_SECS",
                defaults.presence_ttl.num_seconds(),
            )?),
            log_format,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {} {:?}", key, raw)),
        None => Ok(default),
    }
}
