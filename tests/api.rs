//! HTTP API tests: the router is driven in-process with `oneshot` against a
//! database built from the fixture bundle and reopened read-only.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use tower::ServiceExt;

use uloom_quran::config::Config;
use uloom_quran::server::{build_router, AppState};
use uloom_quran::{db, import, migrate};

async fn test_app() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.db.path = tmp.path().join("uloom.sqlite");

    migrate::run_migrations(&config).await.unwrap();
    let bundle = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/corpus.json");
    import::run_import(&config, &bundle, false).await.unwrap();

    let pool = db::connect_read_only(&config).await.unwrap();
    let state = AppState::new(config, pool).unwrap();
    (tmp, build_router(state))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// "القيوم"
const Q_QAYYUM: &str = "%D8%A7%D9%84%D9%82%D9%8A%D9%88%D9%85";
// "مالك"
const Q_MALIK: &str = "%D9%85%D8%A7%D9%84%D9%83";
// "تبوك"
const Q_TABUK: &str = "%D8%AA%D8%A8%D9%88%D9%83";

// ============ Service ============

#[tokio::test]
async fn health_and_info() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = get(&app, "/api").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ai_enabled"], false);
    assert_eq!(body["counts"]["verses"], 10);
    assert_eq!(body["counts"]["tafsir_books"], 7);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (_tmp, app) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("origin", "https://reader.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

// ============ Quran ============

#[tokio::test]
async fn surah_listing_and_detail() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/quran/surahs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
    assert_eq!(body[0]["revelation_type"], "meccan");

    let (status, body) = get(&app, "/api/quran/surahs/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name_transliterated"], "Al-Fatihah");
    let verses = body["verses"].as_array().unwrap();
    assert_eq!(verses.len(), 7);
    assert_eq!(verses[3]["verse_key"], "1:4");
}

#[tokio::test]
async fn surah_errors_use_envelope() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/quran/surahs/115").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = get(&app, "/api/quran/surahs/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn verse_lookup() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/quran/verses/2:255").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verse_key"], "2:255");
    assert_eq!(body["juz"], 3);

    let (status, body) = get(&app, "/api/quran/verses/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());

    let (status, _) = get(&app, "/api/quran/verses/2:1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn keyword_search() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, &format!("/api/quran/search?q={}", Q_QAYYUM)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["verse_key"], "2:255");
    assert_eq!(body["results"][0]["surah_name_ar"], "البقرة");

    let (status, body) = get(&app, "/api/quran/search?q=a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = get(&app, "/api/quran/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============ Tafsir ============

#[tokio::test]
async fn tafsir_books_with_counts() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/tafsir/books").await;
    assert_eq!(status, StatusCode::OK);
    let books = body.as_array().unwrap();
    assert_eq!(books.len(), 7);
    let tabari = books.iter().find(|b| b["slug"] == "tabari").unwrap();
    assert_eq!(tabari["entry_count"], 2);
}

#[tokio::test]
async fn tafsir_for_verse_lists_only_available_sources() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/tafsir/verse/2:255").await;
    assert_eq!(status, StatusCode::OK);
    let slugs: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["source"]["slug"].as_str().unwrap())
        .collect();
    assert_eq!(slugs, vec!["tabari", "qurtubi", "ibn_kathir"]);
}

#[tokio::test]
async fn tafsir_compare_layouts() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/tafsir/compare/2:255?sources=tabari,baghawi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["layout"], "stacked");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["available"], true);
    assert_eq!(items[1]["source"]["slug"], "baghawi");
    assert_eq!(items[1]["available"], false);
    assert!(items[1]["entry"].is_null());

    let (status, body) = get(&app, "/api/tafsir/compare/2:255?layout=side_by_side").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["columns"].as_array().unwrap().len(), 7);

    let (status, body) = get(&app, "/api/tafsir/compare/2:255?layout=table").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["header"].as_array().unwrap().len(), 4);
    assert_eq!(body["rows"].as_array().unwrap().len(), 7);

    let (status, _) = get(&app, "/api/tafsir/compare/2:255?layout=grid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/api/tafsir/compare/2:255?sources=unknown").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tafsir_whole_surah_in_one_source() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/tafsir/surah/1/source/tabari").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["verse_key"], "1:4");
}

// ============ Qiraat ============

#[tokio::test]
async fn readers_and_transmitters() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/readers").await;
    assert_eq!(status, StatusCode::OK);
    let readers = body.as_array().unwrap();
    assert_eq!(readers.len(), 10);
    assert_eq!(readers[0]["transmitters"].as_array().unwrap().len(), 2);

    let (_, body) = get(&app, "/api/qiraat/transmitters").await;
    assert_eq!(body.as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn rule_resolution() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(
        &app,
        "/api/qiraat/rules/resolve?category=between_surahs&reader=nafi&transmitter=warsh",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defined"], true);
    assert_eq!(body["level"], "transmitter");
    assert_eq!(body["rule"]["value"], "three_options");

    let (status, body) =
        get(&app, "/api/qiraat/rules/resolve?category=madd_munfasil&reader=nafi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["defined"], false);
    assert!(body["rule"].is_null());

    let (status, body) = get(&app, "/api/qiraat/rules/resolve?category=between_surahs").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = get(
        &app,
        "/api/qiraat/rules/resolve?category=between_surahs&reader=asim&transmitter=warsh",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn all_rules_for_a_reader() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/rules/reader/hamza").await;
    assert_eq!(status, StatusCode::OK);
    let answers = body.as_array().unwrap();
    assert_eq!(answers.len(), 10);
    let between = answers
        .iter()
        .find(|a| a["category"] == "between_surahs")
        .unwrap();
    assert_eq!(between["rule"]["value"], "wasl_only");

    let (_, body) = get(&app, "/api/qiraat/rules/categories").await;
    assert_eq!(body.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn verse_variants() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/variants/verse/1:4").await;
    assert_eq!(status, StatusCode::OK);
    let variants = body["variants"].as_array().unwrap();
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0]["readings"].as_array().unwrap().len(), 4);

    let (status, body) = get(&app, "/api/qiraat/variants/surah/2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn riwayat_comparison_and_differences() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/verse/1:4/compare").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_variant"], true);
    assert_eq!(body["unique_reading_count"], 2);

    let (status, body) = get(&app, "/api/qiraat/verse/1:1/compare").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_variant"], false);

    let (status, body) = get(&app, "/api/qiraat/riwaya/warsh/surah/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verses"].as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "/api/qiraat/riwaya/nope/surah/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/api/qiraat/surah/1/differences?type=silah").await;
    assert_eq!(status, StatusCode::OK);
    let diffs = body.as_array().unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0]["verse_key"], "1:7");
}

#[tokio::test]
async fn qiraat_search_by_word_and_type() {
    let (_tmp, app) = test_app().await;

    let uri = format!("/api/qiraat/search?word={}", Q_MALIK);
    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["variant_count"], 1);
    assert_eq!(body["variants"][0]["verse_key"], "1:4");
    assert_eq!(body["difference_count"], 1);

    let (status, body) = get(&app, "/api/qiraat/search?type=silah").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "silah");
    assert_eq!(body["differences"][0]["verse_key"], "1:7");

    let (status, body) = get(&app, "/api/qiraat/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = get(&app, "/api/qiraat/search?type=farsh&surah=115").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn two_riwayat_compared_side_by_side() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/compare/hafs/qaloon").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first"]["code"], "hafs");
    assert_eq!(body["total_differences"], 1);
    assert_eq!(body["differences"][0]["verse_key"], "1:4");
    assert_eq!(body["differences"][0]["surah_name_ar"], "الفاتحة");

    let (status, body) = get(&app, "/api/qiraat/compare/hafs/warsh?surah=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_differences"], 0);

    let (status, _) = get(&app, "/api/qiraat/compare/warsh/warsh").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&app, "/api/qiraat/compare/hafs/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn reciters_with_verse_audio() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/qiraat/audio/reciters?riwaya=warsh&verse=2:255").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], false);
    let reciters = body["reciters"].as_array().unwrap();
    assert_eq!(reciters.len(), 1);
    assert!(reciters[0]["audio_url"]
        .as_str()
        .unwrap()
        .ends_with("/002255.mp3"));
}

// ============ Asbab ============

#[tokio::test]
async fn asbab_lookups() {
    let (_tmp, app) = test_app().await;

    let (status, body) = get(&app, "/api/asbab/verse/2:255").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["records"][0]["authenticity"], "sahih");

    let (status, body) = get(&app, "/api/asbab/surah/9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_records"], 1);

    let (status, body) = get(&app, &format!("/api/asbab/search?q={}", Q_TABUK)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["verse_key"], "9:1");

    let (status, body) = get(&app, "/api/asbab/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_records"], 3);
    assert_eq!(body["surahs_covered"], 3);
}

// ============ AI (unconfigured) ============

#[tokio::test]
async fn ai_routes_report_unavailable_without_configuration() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/api/ai/ask",
        serde_json::json!({"question": "ما معنى آية الكرسي؟"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "ai_unavailable");

    let (status, body) = get(&app, "/api/ai/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn ai_input_is_validated_before_configuration() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(&app, "/api/ai/ask", serde_json::json!({"question": "ما"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

// ============ Malformed input ============

#[tokio::test]
async fn malformed_query_strings_use_envelope() {
    let (_tmp, app) = test_app().await;

    let uri = format!("/api/quran/search?q={}&limit=many", Q_QAYYUM);
    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let uri = format!("/api/asbab/search?q={}&source_id=first", Q_TABUK);
    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn malformed_json_bodies_use_envelope() {
    let (_tmp, app) = test_app().await;

    let (status, body) = post_json(
        &app,
        "/api/ai/explain-verse",
        serde_json::json!({"surah_id": 70000, "ayah_id": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ai/ask")
                .header("content-type", "application/json")
                .body(Body::from("{\"question\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}
