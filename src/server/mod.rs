//! HTTP API server.
//!
//! Serves the corpus read-only over JSON, plus the AI pass-through routes.
//! The SQLite file is opened with `mode=ro`; nothing under `/api` writes.
//!
//! # Endpoints
//!
//! | Prefix | Module | Contents |
//! |--------|--------|----------|
//! | `/health` | here | liveness and version |
//! | `/api` | here | service info and corpus counts |
//! | `/api/quran` | [`quran`] | surahs, verses, keyword search |
//! | `/api/tafsir` | [`tafsir`] | sources, per-verse entries, comparison layouts |
//! | `/api/qiraat` | [`qiraat`] | readers, rules, variants, riwayat, search, reciters |
//! | `/api/asbab` | [`asbab`] | revelation context records |
//! | `/api/ai` | [`ai`] | semantic search, question answering, SSE stream, chat |
//!
//! # Error Contract
//!
//! Every error is rendered by [`ApiError`](crate::error::ApiError), including
//! malformed paths, query strings and JSON bodies:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must be at least 2 characters" } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

mod ai;
mod asbab;
mod extract;
mod qiraat;
mod quran;
mod tafsir;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::AiServices;
use crate::config::Config;
use crate::db;
use crate::error::{bad_request, ApiError};
use crate::models::check_surah;
use crate::quran::CorpusStats;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub ai: Arc<AiServices>,
}

impl AppState {
    pub fn new(config: Config, pool: SqlitePool) -> anyhow::Result<Self> {
        let ai = AiServices::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            pool,
            ai: Arc::new(ai),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api", get(handle_info))
        .nest("/api/quran", quran::routes())
        .nest("/api/tafsir", tafsir::routes())
        .nest("/api/qiraat", qiraat::routes())
        .nest("/api/asbab", asbab::routes())
        .nest("/api/ai", ai::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open the database read-only and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect_read_only(config).await?;
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), pool)?;
    let app = build_router(state);

    println!("Serving on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse a surah number from a path segment.
pub(crate) fn surah_param(raw: &str) -> Result<u16, ApiError> {
    let id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("invalid surah number: '{}'", raw)))?;
    check_surah(id).map_err(bad_request)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api ============

#[derive(Serialize)]
struct InfoResponse {
    name: &'static str,
    version: &'static str,
    ai_enabled: bool,
    sections: [&'static str; 5],
    counts: CorpusStats,
}

async fn handle_info(State(state): State<AppState>) -> Result<Json<InfoResponse>, ApiError> {
    let counts = crate::quran::corpus_stats(&state.pool).await?;
    Ok(Json(InfoResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        ai_enabled: state.ai.require_all().is_ok(),
        sections: [
            "/api/quran",
            "/api/tafsir",
            "/api/qiraat",
            "/api/asbab",
            "/api/ai",
        ],
        counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surah_numbers_are_checked() {
        assert_eq!(surah_param("114").unwrap(), 114);
        assert_eq!(surah_param("0").unwrap_err().code, "bad_request");
        assert_eq!(surah_param("abc").unwrap_err().code, "bad_request");
    }
}
