//! Support desk - customer-support ticketing backend

use anyhow::Context;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use support_desk::clock::SystemClock;
use support_desk::config::{Config, LogFormat};
use support_desk::db::Database;
use support_desk::routes;
use support_desk::services::openai::{CompletionClient, OpenAiClient};
use support_desk::services::triage::TriageService;
use support_desk::state::AppState;
use support_desk::tasks::{audit_flush, sweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let json_logs = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_desk=info,tower_http=info".into()),
        )
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .init();

    let db = Database::new(&config.database_url, Arc::new(SystemClock))
        .await
        .context("Failed to open database")?;
    let seeded = db.seed_kb_if_empty().await?;
    if seeded > 0 {
        info!(articles = seeded, "Knowledge base was empty, seeded starter articles");
    }

    let client: Option<Arc<dyn CompletionClient>> = match &config.openai_api_key {
        Some(key) => {
            let client = OpenAiClient::new(
                key.clone(),
                &config.openai_base_url,
                &config.openai_model,
                config.triage_timeout,
            )
            .context("Failed to build completion client")?;
            info!(model = %config.openai_model, "Remote triage enabled");
            Some(Arc::new(client))
        }
        None => {
            warn!("OPENAI_API_KEY not set, using local triage only");
            None
        }
    };
    let triage = TriageService::new(client, config.triage_timeout);

    let state = AppState::new(db, triage, &config);

    // Background tasks
    tokio::spawn(audit_flush::audit_flush_task(
        state.audit.clone(),
        Arc::clone(&state.db),
        Arc::clone(&state.metrics),
    ));
    tokio::spawn(sweep::sweep_task(
        Arc::clone(&state.magic_links),
        Arc::clone(&state.presence),
    ));

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Support desk v{} starting on {}", env!("CARGO_PKG_VERSION"), config.listen_addr);
    info!("Audit buffer capacity: {}", config.audit_buffer_capacity);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
