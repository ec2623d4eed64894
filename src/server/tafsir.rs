use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::extract::{PathParams, QueryParams};
use super::{surah_param, AppState};
use crate::error::ApiError;
use crate::models::VerseKey;
use crate::tafsir::{self, Comparison, Layout, RenderedComparison, SurahTafsir, TafsirSourceSummary};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(handle_books))
        .route("/verse/{key}", get(handle_verse))
        .route("/compare/{key}", get(handle_compare))
        .route("/surah/{id}/source/{source}", get(handle_surah_source))
}

#[derive(Deserialize)]
struct CompareParams {
    /// Comma-separated source slugs; absent means all sources.
    sources: Option<String>,
    layout: Option<String>,
}

async fn handle_books(
    State(state): State<AppState>,
) -> Result<Json<Vec<TafsirSourceSummary>>, ApiError> {
    Ok(Json(tafsir::list_sources(&state.pool).await?))
}

async fn handle_verse(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
    QueryParams(params): QueryParams<CompareParams>,
) -> Result<Json<Comparison>, ApiError> {
    let key: VerseKey = key.parse()?;
    let requested = tafsir::split_source_list(params.sources.as_deref());
    Ok(Json(
        tafsir::entries_for_verse(&state.pool, key, &requested).await?,
    ))
}

async fn handle_compare(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
    QueryParams(params): QueryParams<CompareParams>,
) -> Result<Json<RenderedComparison>, ApiError> {
    let key: VerseKey = key.parse()?;
    let layout: Layout = params.layout.as_deref().unwrap_or("").parse()?;
    let requested = tafsir::split_source_list(params.sources.as_deref());
    let comparison = tafsir::compare(&state.pool, key, &requested).await?;
    Ok(Json(tafsir::render(comparison, layout)))
}

async fn handle_surah_source(
    State(state): State<AppState>,
    PathParams((id, source)): PathParams<(String, String)>,
) -> Result<Json<SurahTafsir>, ApiError> {
    let id = surah_param(&id)?;
    Ok(Json(
        tafsir::surah_in_source(&state.pool, id, &source).await?,
    ))
}
