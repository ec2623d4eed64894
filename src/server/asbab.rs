use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::extract::{PathParams, QueryParams};
use super::{surah_param, AppState};
use crate::asbab::{self, AsbabRecord, AsbabSource, AsbabStats, SurahAsbab, VerseAsbab};
use crate::error::ApiError;
use crate::models::VerseKey;
use crate::quran;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/sources", get(handle_sources))
        .route("/verse/{key}", get(handle_verse))
        .route("/surah/{id}", get(handle_surah))
        .route("/search", get(handle_search))
        .route("/stats", get(handle_stats))
}

async fn handle_sources(State(state): State<AppState>) -> Result<Json<Vec<AsbabSource>>, ApiError> {
    Ok(Json(asbab::list_sources(&state.pool).await?))
}

async fn handle_verse(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
) -> Result<Json<VerseAsbab>, ApiError> {
    let key: VerseKey = key.parse()?;
    Ok(Json(asbab::for_verse(&state.pool, key).await?))
}

async fn handle_surah(
    State(state): State<AppState>,
    PathParams(id): PathParams<String>,
) -> Result<Json<SurahAsbab>, ApiError> {
    let id = surah_param(&id)?;
    Ok(Json(asbab::for_surah(&state.pool, id).await?))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    source_id: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    count: usize,
    results: Vec<AsbabRecord>,
}

async fn handle_search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let search = &state.config.search;
    let q = quran::validate_query(params.q.as_deref().unwrap_or(""), search.min_query_chars)?;
    let limit = quran::clamp_limit(params.limit, search.default_limit, search.max_limit);
    let results = asbab::search(&state.pool, &q, params.source_id, limit).await?;
    Ok(Json(SearchResponse {
        query: q,
        count: results.len(),
        results,
    }))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<AsbabStats>, ApiError> {
    Ok(Json(asbab::stats(&state.pool).await?))
}
