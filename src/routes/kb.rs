//! Knowledge base endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{ApiJson, ApiPath};
use crate::error::Result;
use crate::models::{CreateArticleRequest, KbArticle, KbArticleSummary};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/kb/articles
pub async fn list_articles(State(state): State<AppState>) -> Result<Json<Vec<KbArticleSummary>>> {
    Ok(Json(state.db.list_articles().await?))
}

/// GET /api/kb/articles/:id
pub async fn get_article(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<KbArticle>> {
    Ok(Json(state.db.get_article(id).await?))
}

/// POST /api/kb/articles
pub async fn create_article(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateArticleRequest>,
) -> Result<(StatusCode, Json<KbArticle>)> {
    let article = state
        .db
        .create_article(&payload.title, &payload.body, &payload.tags)
        .await?;
    Ok((StatusCode::CREATED, Json(article)))
}

/// GET /api/kb/search?q=
///
/// Top ten matches; an empty query returns an empty list.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<KbArticleSummary>>> {
    Ok(Json(state.db.search_articles(&query.q).await?))
}
