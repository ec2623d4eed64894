use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::extract::{PathParams, QueryParams};
use super::{surah_param, AppState};
use crate::error::ApiError;
use crate::models::{Surah, Verse, VerseKey};
use crate::quran::{self, SearchResults, SurahWithVerses};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/surahs", get(handle_surahs))
        .route("/surahs/{id}", get(handle_surah))
        .route("/verses/{key}", get(handle_verse))
        .route("/search", get(handle_search))
}

async fn handle_surahs(State(state): State<AppState>) -> Result<Json<Vec<Surah>>, ApiError> {
    Ok(Json(quran::list_surahs(&state.pool).await?))
}

async fn handle_surah(
    State(state): State<AppState>,
    PathParams(id): PathParams<String>,
) -> Result<Json<SurahWithVerses>, ApiError> {
    let id = surah_param(&id)?;
    Ok(Json(quran::get_surah(&state.pool, id).await?))
}

async fn handle_verse(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
) -> Result<Json<Verse>, ApiError> {
    let key: VerseKey = key.parse()?;
    Ok(Json(quran::get_verse(&state.pool, key).await?))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<i64>,
}

async fn handle_search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    let search = &state.config.search;
    let q = quran::validate_query(params.q.as_deref().unwrap_or(""), search.min_query_chars)?;
    let limit = quran::clamp_limit(params.limit, search.default_limit, search.max_limit);
    Ok(Json(quran::search_verses(&state.pool, &q, limit).await?))
}
