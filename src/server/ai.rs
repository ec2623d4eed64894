//! `/api/ai` routes.
//!
//! `/ask/stream` answers with `text/event-stream`; each event's data is one
//! JSON frame (`sources`, `content`, `done` or `error`). The generating task
//! stops reading from the vendor as soon as the client disconnects.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use super::extract::{JsonBody, QueryParams};
use super::AppState;
use crate::ai::rag::{
    self, AiHealth, AiStats, Answer, AskRequest, ChatReply, ChatRequest, Explanation,
    QiraatAnalysis, SemanticQuery, SemanticResults, StreamFrame, TafsirComparison, VerseRequest,
};
use crate::error::ApiError;

/// Frames buffered between the generating task and the HTTP body.
const FRAME_BUFFER: usize = 32;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/search", get(handle_search_get).post(handle_search_post))
        .route("/ask", post(handle_ask))
        .route("/ask/stream", get(handle_stream_get).post(handle_stream_post))
        .route("/compare-tafsir", post(handle_compare_tafsir))
        .route("/explain-verse", post(handle_explain_verse))
        .route("/analyze-qiraat", post(handle_analyze_qiraat))
        .route("/chat", post(handle_chat))
}

async fn handle_health(State(state): State<AppState>) -> Json<AiHealth> {
    Json(rag::health(&state.ai).await)
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<AiStats>, ApiError> {
    Ok(Json(rag::stats(&state.ai).await?))
}

async fn handle_search_get(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SemanticQuery>,
) -> Result<Json<SemanticResults>, ApiError> {
    Ok(Json(rag::semantic_search(&state.ai, &state.pool, &query).await?))
}

async fn handle_search_post(
    State(state): State<AppState>,
    JsonBody(query): JsonBody<SemanticQuery>,
) -> Result<Json<SemanticResults>, ApiError> {
    Ok(Json(rag::semantic_search(&state.ai, &state.pool, &query).await?))
}

async fn handle_ask(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    Ok(Json(rag::ask(&state.ai, &request).await?))
}

async fn handle_stream_get(
    State(state): State<AppState>,
    QueryParams(request): QueryParams<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    start_stream(state, request)
}

async fn handle_stream_post(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    start_stream(state, request)
}

/// Input and configuration errors are answered as plain HTTP errors; once
/// the stream is open, failures arrive as an `error` frame.
fn start_stream(
    state: AppState,
    request: AskRequest,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    request.validate()?;
    state.ai.require_all()?;

    let (tx, rx) = mpsc::channel::<StreamFrame>(FRAME_BUFFER);
    let ai = state.ai.clone();
    tokio::spawn(async move {
        rag::ask_stream(&ai, request, tx).await;
    });

    let events = ReceiverStream::new(rx).map(|frame| Event::default().json_data(frame));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn handle_compare_tafsir(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerseRequest>,
) -> Result<Json<TafsirComparison>, ApiError> {
    Ok(Json(
        rag::compare_tafsir(&state.ai, &state.pool, &request).await?,
    ))
}

async fn handle_explain_verse(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerseRequest>,
) -> Result<Json<Explanation>, ApiError> {
    Ok(Json(
        rag::explain_verse(&state.ai, &state.pool, &request).await?,
    ))
}

async fn handle_analyze_qiraat(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<VerseRequest>,
) -> Result<Json<QiraatAnalysis>, ApiError> {
    Ok(Json(
        rag::analyze_qiraat(&state.ai, &state.pool, &request).await?,
    ))
}

async fn handle_chat(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    Ok(Json(rag::chat(&state.ai, &request).await?))
}
