//! Surah and verse lookup, keyword search and corpus statistics.
//!
//! Used by both the CLI (`uloom verse`, `uloom search`, `uloom stats`) and
//! the `/api/quran` routes.

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::error::{LookupError, LookupResult};
use crate::models::{Surah, Verse, VerseKey};

const VERSE_COLUMNS: &str =
    "id, surah_id, ayah_number, verse_key, text_uthmani, text_simple, page, juz";

pub async fn list_surahs(pool: &SqlitePool) -> LookupResult<Vec<Surah>> {
    let surahs = sqlx::query_as::<_, Surah>(
        "SELECT id, name_ar, name_en, name_transliterated, revelation_type, revelation_order, ayah_count FROM surahs ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(surahs)
}

pub async fn get_surah_header(pool: &SqlitePool, id: u16) -> LookupResult<Surah> {
    sqlx::query_as::<_, Surah>(
        "SELECT id, name_ar, name_en, name_transliterated, revelation_type, revelation_order, ayah_count FROM surahs WHERE id = ?",
    )
    .bind(id as i64)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| LookupError::not_found(format!("surah not found: {}", id)))
}

#[derive(Debug, Clone, Serialize)]
pub struct SurahWithVerses {
    #[serde(flatten)]
    pub surah: Surah,
    pub verses: Vec<Verse>,
}

pub async fn get_surah(pool: &SqlitePool, id: u16) -> LookupResult<SurahWithVerses> {
    let surah = get_surah_header(pool, id).await?;
    let verses = surah_verses(pool, id).await?;
    Ok(SurahWithVerses { surah, verses })
}

pub async fn surah_verses(pool: &SqlitePool, id: u16) -> LookupResult<Vec<Verse>> {
    let verses = sqlx::query_as::<_, Verse>(&format!(
        "SELECT {} FROM verses WHERE surah_id = ? ORDER BY ayah_number",
        VERSE_COLUMNS
    ))
    .bind(id as i64)
    .fetch_all(pool)
    .await?;
    Ok(verses)
}

/// Exact lookup through the unique `verse_key` index.
pub async fn find_verse(pool: &SqlitePool, key: VerseKey) -> LookupResult<Option<Verse>> {
    let verse = sqlx::query_as::<_, Verse>(&format!(
        "SELECT {} FROM verses WHERE verse_key = ?",
        VERSE_COLUMNS
    ))
    .bind(key.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(verse)
}

/// Like [`find_verse`], but a missing verse is a `NotFound` error.
pub async fn get_verse(pool: &SqlitePool, key: VerseKey) -> LookupResult<Verse> {
    find_verse(pool, key)
        .await?
        .ok_or_else(|| LookupError::not_found(format!("verse not found: {}", key)))
}

/// A verse with the Arabic name of its surah, as used in search results and
/// AI context blocks.
#[derive(Debug, Clone, Serialize)]
pub struct VerseText {
    pub verse_key: String,
    pub surah_id: i64,
    pub ayah_number: i64,
    pub surah_name_ar: String,
    pub text_uthmani: String,
}

/// Fetch display text for a set of verse keys. Unknown keys are absent from
/// the returned map.
pub async fn verse_texts(
    pool: &SqlitePool,
    keys: &[String],
) -> LookupResult<HashMap<String, VerseText>> {
    let mut out = HashMap::with_capacity(keys.len());
    if keys.is_empty() {
        return Ok(out);
    }

    let placeholders = vec!["?"; keys.len()].join(", ");
    let sql = format!(
        r#"
        SELECT v.verse_key, v.surah_id, v.ayah_number, v.text_uthmani, s.name_ar
        FROM verses v JOIN surahs s ON s.id = v.surah_id
        WHERE v.verse_key IN ({})
        "#,
        placeholders
    );
    let mut query = sqlx::query(&sql);
    for key in keys {
        query = query.bind(key);
    }

    for row in query.fetch_all(pool).await? {
        let text = VerseText {
            verse_key: row.get("verse_key"),
            surah_id: row.get("surah_id"),
            ayah_number: row.get("ayah_number"),
            surah_name_ar: row.get("name_ar"),
            text_uthmani: row.get("text_uthmani"),
        };
        out.insert(text.verse_key.clone(), text);
    }
    Ok(out)
}

// ============ Keyword search ============

/// Trim a search query and enforce the minimum length (in characters).
pub fn validate_query(query: &str, min_chars: usize) -> LookupResult<String> {
    let q = query.trim();
    if q.chars().count() < min_chars {
        return Err(LookupError::bad_request(format!(
            "query must be at least {} characters",
            min_chars
        )));
    }
    Ok(q.to_string())
}

/// Apply the default when absent and clamp into `1..=max`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// `%query%` for a `LIKE ... ESCAPE '\'` clause, with the wildcards in
/// `query` matched literally.
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub count: usize,
    pub results: Vec<VerseText>,
}

/// Substring search over the Uthmani and simplified texts, in mushaf order.
///
/// `query` must already be validated with [`validate_query`].
pub async fn search_verses(pool: &SqlitePool, query: &str, limit: i64) -> LookupResult<SearchResults> {
    let pattern = like_pattern(query);
    let rows = sqlx::query(
        r#"
        SELECT v.verse_key, v.surah_id, v.ayah_number, v.text_uthmani, s.name_ar
        FROM verses v JOIN surahs s ON s.id = v.surah_id
        WHERE v.text_uthmani LIKE ? ESCAPE '\' OR v.text_simple LIKE ? ESCAPE '\'
        ORDER BY v.surah_id, v.ayah_number
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let results: Vec<VerseText> = rows
        .iter()
        .map(|row| VerseText {
            verse_key: row.get("verse_key"),
            surah_id: row.get("surah_id"),
            ayah_number: row.get("ayah_number"),
            surah_name_ar: row.get("name_ar"),
            text_uthmani: row.get("text_uthmani"),
        })
        .collect();

    Ok(SearchResults {
        query: query.to_string(),
        count: results.len(),
        results,
    })
}

// ============ Statistics ============

#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub surahs: i64,
    pub verses: i64,
    pub tafsir_books: i64,
    pub tafsir_entries: i64,
    pub qurra: i64,
    pub ruwat: i64,
    pub qiraat_rules: i64,
    pub qiraat_variants: i64,
    pub qiraat_readings: i64,
    pub riwayat: i64,
    pub riwaya_texts: i64,
    pub riwaya_differences: i64,
    pub asbab_records: i64,
    pub last_import: Option<String>,
}

pub async fn corpus_stats(pool: &SqlitePool) -> LookupResult<CorpusStats> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM surahs) AS surahs,
            (SELECT COUNT(*) FROM verses) AS verses,
            (SELECT COUNT(*) FROM tafsir_books) AS tafsir_books,
            (SELECT COUNT(*) FROM tafsir_entries) AS tafsir_entries,
            (SELECT COUNT(*) FROM qurra) AS qurra,
            (SELECT COUNT(*) FROM ruwat) AS ruwat,
            (SELECT COUNT(*) FROM qiraat_rules) AS qiraat_rules,
            (SELECT COUNT(*) FROM qiraat_variants) AS qiraat_variants,
            (SELECT COUNT(*) FROM qiraat_readings) AS qiraat_readings,
            (SELECT COUNT(*) FROM riwayat) AS riwayat,
            (SELECT COUNT(*) FROM riwaya_texts) AS riwaya_texts,
            (SELECT COUNT(*) FROM riwaya_differences) AS riwaya_differences,
            (SELECT COUNT(*) FROM asbab_nuzul) AS asbab_records,
            (SELECT MAX(imported_at) FROM imports) AS last_import
        "#,
    )
    .fetch_one(pool)
    .await?;

    let last_import: Option<i64> = row.get("last_import");

    Ok(CorpusStats {
        surahs: row.get("surahs"),
        verses: row.get("verses"),
        tafsir_books: row.get("tafsir_books"),
        tafsir_entries: row.get("tafsir_entries"),
        qurra: row.get("qurra"),
        ruwat: row.get("ruwat"),
        qiraat_rules: row.get("qiraat_rules"),
        qiraat_variants: row.get("qiraat_variants"),
        qiraat_readings: row.get("qiraat_readings"),
        riwayat: row.get("riwayat"),
        riwaya_texts: row.get("riwaya_texts"),
        riwaya_differences: row.get("riwaya_differences"),
        asbab_records: row.get("asbab_records"),
        last_import: last_import.map(format_ts_iso),
    })
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
