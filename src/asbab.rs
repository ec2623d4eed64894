//! Asbab al-nuzul: reports of the circumstances in which verses were revealed.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::error::LookupResult;
use crate::models::VerseKey;
use crate::quran;

#[derive(Debug, Clone, Serialize)]
pub struct AsbabSource {
    pub id: i64,
    pub name_ar: String,
    pub name_en: Option<String>,
    pub author_ar: Option<String>,
    pub author_en: Option<String>,
    pub death_year_ah: Option<i64>,
    pub record_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: i64,
    pub name_ar: String,
    pub author_ar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AsbabRecord {
    pub id: i64,
    pub verse_key: String,
    pub text_ar: String,
    pub isnad: Option<String>,
    pub authenticity: Option<String>,
    pub revelation_period: Option<String>,
    pub source: Option<SourceRef>,
}

const RECORD_SELECT: &str = r#"
    SELECT a.id, v.verse_key, v.ayah_number, a.text_ar, a.isnad, a.authenticity,
           a.revelation_period, a.source_id, s.name_ar AS source_name_ar,
           s.author_ar AS source_author_ar
    FROM asbab_nuzul a
    JOIN verses v ON v.id = a.verse_id
    LEFT JOIN asbab_sources s ON s.id = a.source_id
"#;

fn record_from_row(row: &SqliteRow) -> AsbabRecord {
    let source_id: Option<i64> = row.get("source_id");
    let source_name: Option<String> = row.get("source_name_ar");
    AsbabRecord {
        id: row.get("id"),
        verse_key: row.get("verse_key"),
        text_ar: row.get("text_ar"),
        isnad: row.get("isnad"),
        authenticity: row.get("authenticity"),
        revelation_period: row.get("revelation_period"),
        source: source_id.zip(source_name).map(|(id, name_ar)| SourceRef {
            id,
            name_ar,
            author_ar: row.get("source_author_ar"),
        }),
    }
}

pub async fn list_sources(pool: &SqlitePool) -> LookupResult<Vec<AsbabSource>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name_ar, s.name_en, s.author_ar, s.author_en, s.death_year_ah,
               COUNT(a.id) AS record_count
        FROM asbab_sources s LEFT JOIN asbab_nuzul a ON a.source_id = s.id
        GROUP BY s.id
        ORDER BY s.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AsbabSource {
            id: row.get("id"),
            name_ar: row.get("name_ar"),
            name_en: row.get("name_en"),
            author_ar: row.get("author_ar"),
            author_en: row.get("author_en"),
            death_year_ah: row.get("death_year_ah"),
            record_count: row.get("record_count"),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct VerseAsbab {
    pub verse_key: String,
    pub text_uthmani: String,
    pub records: Vec<AsbabRecord>,
}

/// Records for one verse. A verse with no reports yields an empty list.
pub async fn for_verse(pool: &SqlitePool, key: VerseKey) -> LookupResult<VerseAsbab> {
    let verse = quran::get_verse(pool, key).await?;
    let rows = sqlx::query(&format!("{} WHERE a.verse_id = ? ORDER BY a.id", RECORD_SELECT))
        .bind(verse.id)
        .fetch_all(pool)
        .await?;

    Ok(VerseAsbab {
        verse_key: verse.verse_key,
        text_uthmani: verse.text_uthmani,
        records: rows.iter().map(record_from_row).collect(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AyahAsbab {
    pub verse_key: String,
    pub ayah_number: i64,
    pub records: Vec<AsbabRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurahAsbab {
    pub surah_id: i64,
    pub name_ar: String,
    pub total_records: usize,
    pub verses: Vec<AyahAsbab>,
}

/// Records for a surah, grouped by verse in ayah order.
pub async fn for_surah(pool: &SqlitePool, surah: u16) -> LookupResult<SurahAsbab> {
    let header = quran::get_surah_header(pool, surah).await?;
    let rows = sqlx::query(&format!(
        "{} WHERE v.surah_id = ? ORDER BY v.ayah_number, a.id",
        RECORD_SELECT
    ))
    .bind(surah as i64)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<i64, AyahAsbab> = BTreeMap::new();
    for row in &rows {
        let ayah: i64 = row.get("ayah_number");
        let record = record_from_row(row);
        grouped
            .entry(ayah)
            .or_insert_with(|| AyahAsbab {
                verse_key: record.verse_key.clone(),
                ayah_number: ayah,
                records: Vec::new(),
            })
            .records
            .push(record);
    }

    Ok(SurahAsbab {
        surah_id: header.id,
        name_ar: header.name_ar,
        total_records: rows.len(),
        verses: grouped.into_values().collect(),
    })
}

/// Substring search over the report text. `query` must already be validated.
pub async fn search(
    pool: &SqlitePool,
    query: &str,
    source_id: Option<i64>,
    limit: i64,
) -> LookupResult<Vec<AsbabRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE a.text_ar LIKE ?1 ESCAPE '\\' AND (?2 IS NULL OR a.source_id = ?2) ORDER BY v.surah_id, v.ayah_number, a.id LIMIT ?3",
        RECORD_SELECT
    ))
    .bind(crate::quran::like_pattern(query))
    .bind(source_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceCount {
    pub source_id: Option<i64>,
    pub name_ar: Option<String>,
    pub records: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AsbabStats {
    pub total_records: i64,
    pub verses_covered: i64,
    pub surahs_covered: i64,
    pub by_source: Vec<SourceCount>,
    pub by_authenticity: BTreeMap<String, i64>,
}

pub async fn stats(pool: &SqlitePool) -> LookupResult<AsbabStats> {
    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(DISTINCT a.verse_id) AS verses,
               COUNT(DISTINCT v.surah_id) AS surahs
        FROM asbab_nuzul a JOIN verses v ON v.id = a.verse_id
        "#,
    )
    .fetch_one(pool)
    .await?;

    let by_source = sqlx::query(
        r#"
        SELECT a.source_id, s.name_ar, COUNT(*) AS n
        FROM asbab_nuzul a LEFT JOIN asbab_sources s ON s.id = a.source_id
        GROUP BY a.source_id
        ORDER BY n DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_authenticity = sqlx::query(
        "SELECT IFNULL(authenticity, 'unknown') AS k, COUNT(*) AS n FROM asbab_nuzul GROUP BY k",
    )
    .fetch_all(pool)
    .await?;

    Ok(AsbabStats {
        total_records: totals.get("total"),
        verses_covered: totals.get("verses"),
        surahs_covered: totals.get("surahs"),
        by_source: by_source
            .iter()
            .map(|row| SourceCount {
                source_id: row.get("source_id"),
                name_ar: row.get("name_ar"),
                records: row.get("n"),
            })
            .collect(),
        by_authenticity: by_authenticity
            .iter()
            .map(|row| (row.get::<String, _>("k"), row.get::<i64, _>("n")))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let pool = crate::migrate::test_pool().await;
        let bundle: crate::import::Bundle =
            serde_json::from_str(include_str!("../tests/fixtures/corpus.json")).unwrap();
        crate::import::import_bundle(&pool, &bundle, "h", "corpus.json")
            .await
            .unwrap();

        assert!(search(&pool, "%%", None, 50).await.unwrap().is_empty());
        let hits = search(&pool, "تبوك", None, 50).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn seeded_sources_start_empty() {
        let pool = crate::migrate::test_pool().await;
        let sources = list_sources(&pool).await.unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|s| s.record_count == 0));

        let stats = stats(&pool).await.unwrap();
        assert_eq!(stats.total_records, 0);
        assert!(stats.by_source.is_empty());
    }
}
