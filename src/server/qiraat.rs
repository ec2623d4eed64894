use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::extract::{PathParams, QueryParams};
use super::{surah_param, AppState};
use crate::error::{bad_request, ApiError, LookupError};
use crate::models::{parse_reader_pair, VerseKey};
use crate::qiraat::{
    self, Difference, QiraatSearch, QiraatSearchResults, QiraatStats, ReaderInfo, ReciterList,
    Riwaya, RiwayaPairComparison, RiwayaSurah, RiwayatComparison, TransmitterInfo, VerseRiwayat,
    VerseVariants,
};
use crate::quran;
use crate::rules::{self, RuleAnswer, RuleCategory};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/readers", get(handle_readers))
        .route("/transmitters", get(handle_transmitters))
        .route("/rules/categories", get(handle_categories))
        .route("/rules/resolve", get(handle_resolve))
        .route("/rules/reader/{reader}", get(handle_reader_rules))
        .route("/variants/verse/{key}", get(handle_verse_variants))
        .route("/variants/surah/{id}", get(handle_surah_variants))
        .route("/riwayat", get(handle_riwayat))
        .route("/verse/{key}", get(handle_verse_riwayat))
        .route("/verse/{key}/compare", get(handle_compare_riwayat))
        .route("/riwaya/{code}/surah/{id}", get(handle_riwaya_surah))
        .route("/surah/{id}/differences", get(handle_surah_differences))
        .route("/search", get(handle_search))
        .route("/compare/{first}/{second}", get(handle_compare_two))
        .route("/stats", get(handle_stats))
        .route("/audio/reciters", get(handle_reciters))
}

async fn handle_readers(State(state): State<AppState>) -> Result<Json<Vec<ReaderInfo>>, ApiError> {
    Ok(Json(qiraat::list_readers(&state.pool).await?))
}

async fn handle_transmitters(
    State(state): State<AppState>,
) -> Result<Json<Vec<TransmitterInfo>>, ApiError> {
    Ok(Json(qiraat::list_transmitters(&state.pool).await?))
}

// ============ Rules ============

#[derive(Serialize)]
struct CategoryInfo {
    slug: RuleCategory,
    title: &'static str,
}

async fn handle_categories() -> Json<Vec<CategoryInfo>> {
    Json(
        RuleCategory::ALL
            .iter()
            .map(|c| CategoryInfo {
                slug: *c,
                title: c.title(),
            })
            .collect(),
    )
}

#[derive(Deserialize)]
struct ResolveParams {
    category: Option<String>,
    reader: Option<String>,
    transmitter: Option<String>,
}

async fn handle_resolve(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ResolveParams>,
) -> Result<Json<RuleAnswer>, ApiError> {
    let category = params
        .category
        .ok_or_else(|| bad_request("missing required parameter: category"))?;
    let reader = params
        .reader
        .ok_or_else(|| bad_request("missing required parameter: reader"))?;

    let (category, reader, transmitter) =
        rules::parse_request(&category, &reader, params.transmitter.as_deref())?;
    let resolution = rules::resolve(&state.pool, category, reader, transmitter).await?;
    Ok(Json(RuleAnswer::new(category, reader, transmitter, resolution)))
}

#[derive(Deserialize)]
struct TransmitterParam {
    transmitter: Option<String>,
}

async fn handle_reader_rules(
    State(state): State<AppState>,
    PathParams(reader): PathParams<String>,
    QueryParams(params): QueryParams<TransmitterParam>,
) -> Result<Json<Vec<RuleAnswer>>, ApiError> {
    let (reader, transmitter) = parse_reader_pair(&reader, params.transmitter.as_deref())
        .map_err(LookupError::from)?;
    Ok(Json(rules::resolve_all(&state.pool, reader, transmitter).await?))
}

// ============ Variants and riwayat ============

async fn handle_verse_variants(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
) -> Result<Json<VerseVariants>, ApiError> {
    let key: VerseKey = key.parse()?;
    Ok(Json(qiraat::variants_for_verse(&state.pool, key).await?))
}

async fn handle_surah_variants(
    State(state): State<AppState>,
    PathParams(id): PathParams<String>,
) -> Result<Json<Vec<VerseVariants>>, ApiError> {
    let id = surah_param(&id)?;
    Ok(Json(qiraat::variants_for_surah(&state.pool, id).await?))
}

async fn handle_riwayat(State(state): State<AppState>) -> Result<Json<Vec<Riwaya>>, ApiError> {
    Ok(Json(qiraat::list_riwayat(&state.pool).await?))
}

async fn handle_verse_riwayat(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
) -> Result<Json<VerseRiwayat>, ApiError> {
    let key: VerseKey = key.parse()?;
    Ok(Json(qiraat::verse_riwayat(&state.pool, key).await?))
}

async fn handle_compare_riwayat(
    State(state): State<AppState>,
    PathParams(key): PathParams<String>,
) -> Result<Json<RiwayatComparison>, ApiError> {
    let key: VerseKey = key.parse()?;
    Ok(Json(qiraat::compare_riwayat(&state.pool, key).await?))
}

async fn handle_riwaya_surah(
    State(state): State<AppState>,
    PathParams((code, id)): PathParams<(String, String)>,
) -> Result<Json<RiwayaSurah>, ApiError> {
    let id = surah_param(&id)?;
    Ok(Json(qiraat::riwaya_surah(&state.pool, &code, id).await?))
}

#[derive(Deserialize)]
struct DifferenceParams {
    #[serde(rename = "type")]
    difference_type: Option<String>,
}

async fn handle_surah_differences(
    State(state): State<AppState>,
    PathParams(id): PathParams<String>,
    QueryParams(params): QueryParams<DifferenceParams>,
) -> Result<Json<Vec<Difference>>, ApiError> {
    let id = surah_param(&id)?;
    let difference_type = params
        .difference_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    Ok(Json(
        qiraat::surah_differences(&state.pool, id, difference_type).await?,
    ))
}

#[derive(Deserialize)]
struct SearchParams {
    word: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    surah: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Optional surah filter from a query parameter.
fn surah_filter(surah: Option<i64>) -> Result<Option<u16>, ApiError> {
    surah
        .map(|id| crate::models::check_surah(id).map_err(bad_request))
        .transpose()
}

async fn handle_search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<Json<QiraatSearchResults>, ApiError> {
    let search = &state.config.search;
    let query = QiraatSearch {
        word: params.word,
        kind: params.kind,
        surah: surah_filter(params.surah)?,
        limit: quran::clamp_limit(params.limit, search.default_limit, search.max_limit),
        offset: params.offset.unwrap_or(0).max(0),
    };
    Ok(Json(qiraat::search(&state.pool, &query).await?))
}

#[derive(Deserialize)]
struct PairParams {
    surah: Option<i64>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn handle_compare_two(
    State(state): State<AppState>,
    PathParams((first, second)): PathParams<(String, String)>,
    QueryParams(params): QueryParams<PairParams>,
) -> Result<Json<RiwayaPairComparison>, ApiError> {
    let search = &state.config.search;
    let limit = quran::clamp_limit(params.limit, search.default_limit, search.max_limit);
    Ok(Json(
        qiraat::compare_two_riwayat(
            &state.pool,
            &first,
            &second,
            surah_filter(params.surah)?,
            limit,
            params.offset.unwrap_or(0).max(0),
        )
        .await?,
    ))
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<QiraatStats>, ApiError> {
    Ok(Json(qiraat::stats(&state.pool).await?))
}

// ============ Audio ============

#[derive(Deserialize)]
struct ReciterParams {
    riwaya: Option<String>,
    verse: Option<String>,
}

async fn handle_reciters(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ReciterParams>,
) -> Result<Json<ReciterList>, ApiError> {
    let verse = match params.verse.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.parse::<VerseKey>()?),
        _ => None,
    };
    Ok(Json(
        qiraat::list_reciters(&state.pool, params.riwaya.as_deref(), verse).await,
    ))
}
