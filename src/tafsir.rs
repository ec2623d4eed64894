//! Tafsir sources and side-by-side comparison.
//!
//! Each tafsir source is an independent work; entries are never merged.
//! A comparison for one verse lists the requested sources in their fixed
//! `priority_rank` order. A requested source with no commentary on the
//! verse is kept as an explicit absent item, so the caller can tell
//! "this tafsir is silent here" apart from "this tafsir was not asked for".

use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{LookupError, LookupResult};
use crate::models::{Verse, VerseKey};
use crate::quran;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TafsirSource {
    pub id: i64,
    pub slug: String,
    pub name_ar: String,
    pub name_en: String,
    pub author_ar: String,
    pub author_en: String,
    pub death_year_ah: Option<i64>,
    pub methodology: Option<String>,
    pub priority_rank: i64,
}

const SOURCE_COLUMNS: &str =
    "id, slug, name_ar, name_en, author_ar, author_en, death_year_ah, methodology, priority_rank";

#[derive(Debug, Clone, Serialize)]
pub struct TafsirSourceSummary {
    #[serde(flatten)]
    pub source: TafsirSource,
    pub entry_count: i64,
}

/// All sources in priority order, with how many verses each covers.
pub async fn list_sources(pool: &SqlitePool) -> LookupResult<Vec<TafsirSourceSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT b.id, b.slug, b.name_ar, b.name_en, b.author_ar, b.author_en,
               b.death_year_ah, b.methodology, b.priority_rank,
               COUNT(e.id) AS entry_count
        FROM tafsir_books b
        LEFT JOIN tafsir_entries e ON e.tafsir_id = b.id
        GROUP BY b.id
        ORDER BY b.priority_rank
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| TafsirSourceSummary {
            source: TafsirSource {
                id: row.get("id"),
                slug: row.get("slug"),
                name_ar: row.get("name_ar"),
                name_en: row.get("name_en"),
                author_ar: row.get("author_ar"),
                author_en: row.get("author_en"),
                death_year_ah: row.get("death_year_ah"),
                methodology: row.get("methodology"),
                priority_rank: row.get("priority_rank"),
            },
            entry_count: row.get("entry_count"),
        })
        .collect())
}

async fn all_sources(pool: &SqlitePool) -> LookupResult<Vec<TafsirSource>> {
    let sources = sqlx::query_as::<_, TafsirSource>(&format!(
        "SELECT {} FROM tafsir_books ORDER BY priority_rank",
        SOURCE_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(sources)
}

/// Map requested identifiers (slug or numeric id) onto known sources.
///
/// The result is in priority order with duplicates collapsed. An empty
/// request selects every source. Any unknown identifier is an error.
pub fn select_sources(
    known: &[TafsirSource],
    requested: &[String],
) -> LookupResult<Vec<TafsirSource>> {
    let requested: Vec<&str> = requested
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if requested.is_empty() {
        let mut all = known.to_vec();
        all.sort_by_key(|s| s.priority_rank);
        return Ok(all);
    }

    let mut selected: Vec<TafsirSource> = Vec::with_capacity(requested.len());
    for wanted in requested {
        let found = known
            .iter()
            .find(|s| s.slug.eq_ignore_ascii_case(wanted) || s.id.to_string() == wanted)
            .ok_or_else(|| LookupError::bad_request(format!("unknown tafsir source: '{}'", wanted)))?;
        if !selected.iter().any(|s| s.id == found.id) {
            selected.push(found.clone());
        }
    }
    selected.sort_by_key(|s| s.priority_rank);
    Ok(selected)
}

/// Split a comma-separated `?sources=` value.
pub fn split_source_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

// ============ Comparison ============

#[derive(Debug, Clone, Serialize)]
pub struct TafsirEntry {
    pub id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonItem {
    pub verse_key: String,
    pub verse_text: String,
    pub source: TafsirSource,
    pub available: bool,
    pub entry: Option<TafsirEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub verse_key: String,
    pub verse_text: String,
    pub items: Vec<ComparisonItem>,
}

/// Pair each selected source with its entry for `verse`, if any.
///
/// `sources` must already be in priority order. `entries` maps tafsir id to
/// entry and may contain sources that were not selected.
pub fn assemble(
    verse: &Verse,
    sources: Vec<TafsirSource>,
    entries: &HashMap<i64, TafsirEntry>,
) -> Comparison {
    let items = sources
        .into_iter()
        .map(|source| {
            let entry = entries.get(&source.id).cloned();
            ComparisonItem {
                verse_key: verse.verse_key.clone(),
                verse_text: verse.text_uthmani.clone(),
                available: entry.is_some(),
                source,
                entry,
            }
        })
        .collect();

    Comparison {
        verse_key: verse.verse_key.clone(),
        verse_text: verse.text_uthmani.clone(),
        items,
    }
}

async fn entries_by_source(pool: &SqlitePool, verse_id: i64) -> LookupResult<HashMap<i64, TafsirEntry>> {
    let rows = sqlx::query("SELECT id, tafsir_id, text FROM tafsir_entries WHERE verse_id = ?")
        .bind(verse_id)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get::<i64, _>("tafsir_id"),
                TafsirEntry {
                    id: row.get("id"),
                    text: row.get("text"),
                },
            )
        })
        .collect())
}

/// Compare the requested tafsir sources on one verse.
pub async fn compare(
    pool: &SqlitePool,
    key: VerseKey,
    requested: &[String],
) -> LookupResult<Comparison> {
    let known = all_sources(pool).await?;
    let sources = select_sources(&known, requested)?;
    let verse = quran::get_verse(pool, key).await?;
    let entries = entries_by_source(pool, verse.id).await?;
    Ok(assemble(&verse, sources, &entries))
}

/// Only the sources that actually comment on the verse.
pub async fn entries_for_verse(
    pool: &SqlitePool,
    key: VerseKey,
    requested: &[String],
) -> LookupResult<Comparison> {
    let mut comparison = compare(pool, key, requested).await?;
    comparison.items.retain(|item| item.available);
    Ok(comparison)
}

// ============ Layouts ============

/// How a comparison is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Stacked,
    SideBySide,
    Table,
}

impl FromStr for Layout {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "stacked" => Ok(Layout::Stacked),
            "side_by_side" => Ok(Layout::SideBySide),
            "table" => Ok(Layout::Table),
            other => Err(LookupError::bad_request(format!(
                "unknown layout: '{}' (expected stacked, side_by_side or table)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub source: String,
    pub title: String,
    pub author: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ComparisonView {
    Stacked {
        items: Vec<ComparisonItem>,
    },
    SideBySide {
        columns: Vec<Column>,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedComparison {
    pub verse_key: String,
    pub verse_text: String,
    #[serde(flatten)]
    pub view: ComparisonView,
}

pub fn render(comparison: Comparison, layout: Layout) -> RenderedComparison {
    let view = match layout {
        Layout::Stacked => ComparisonView::Stacked {
            items: comparison.items,
        },
        Layout::SideBySide => ComparisonView::SideBySide {
            columns: comparison
                .items
                .into_iter()
                .map(|item| Column {
                    source: item.source.slug,
                    title: item.source.name_ar,
                    author: item.source.author_ar,
                    text: item.entry.map(|e| e.text),
                })
                .collect(),
        },
        Layout::Table => ComparisonView::Table {
            header: vec![
                "source".to_string(),
                "author".to_string(),
                "death_year_ah".to_string(),
                "text".to_string(),
            ],
            rows: comparison
                .items
                .into_iter()
                .map(|item| {
                    vec![
                        Some(item.source.name_ar),
                        Some(item.source.author_ar),
                        item.source.death_year_ah.map(|y| y.to_string()),
                        item.entry.map(|e| e.text),
                    ]
                })
                .collect(),
        },
    };

    RenderedComparison {
        verse_key: comparison.verse_key,
        verse_text: comparison.verse_text,
        view,
    }
}

// ============ Whole surah ============

#[derive(Debug, Clone, Serialize)]
pub struct SurahTafsirEntry {
    pub verse_key: String,
    pub ayah_number: i64,
    pub verse_text: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurahTafsir {
    pub surah_id: i64,
    pub source: TafsirSource,
    pub entries: Vec<SurahTafsirEntry>,
}

/// Every entry of one source for one surah, in ayah order.
pub async fn surah_in_source(
    pool: &SqlitePool,
    surah: u16,
    source: &str,
) -> LookupResult<SurahTafsir> {
    let known = all_sources(pool).await?;
    let source = select_sources(&known, &[source.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| LookupError::bad_request("a tafsir source is required"))?;
    quran::get_surah_header(pool, surah).await?;

    let rows = sqlx::query(
        r#"
        SELECT v.verse_key, v.ayah_number, v.text_uthmani, e.text
        FROM tafsir_entries e JOIN verses v ON v.id = e.verse_id
        WHERE v.surah_id = ? AND e.tafsir_id = ?
        ORDER BY v.ayah_number
        "#,
    )
    .bind(surah as i64)
    .bind(source.id)
    .fetch_all(pool)
    .await?;

    Ok(SurahTafsir {
        surah_id: surah as i64,
        source,
        entries: rows
            .iter()
            .map(|row| SurahTafsirEntry {
                verse_key: row.get("verse_key"),
                ayah_number: row.get("ayah_number"),
                verse_text: row.get("text_uthmani"),
                text: row.get("text"),
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i64, slug: &str, rank: i64) -> TafsirSource {
        TafsirSource {
            id,
            slug: slug.to_string(),
            name_ar: format!("{}-ar", slug),
            name_en: slug.to_string(),
            author_ar: format!("{}-author", slug),
            author_en: slug.to_string(),
            death_year_ah: Some(300 + id),
            methodology: None,
            priority_rank: rank,
        }
    }

    fn known() -> Vec<TafsirSource> {
        vec![
            source(2, "ibn_kathir", 4),
            source(1, "tabari", 1),
            source(3, "baghawi", 2),
        ]
    }

    fn verse() -> Verse {
        Verse {
            id: 262,
            surah_id: 2,
            ayah_number: 255,
            verse_key: "2:255".to_string(),
            text_uthmani: "ٱللَّهُ لَآ إِلَـٰهَ إِلَّا هُوَ".to_string(),
            text_simple: None,
            page: None,
            juz: None,
        }
    }

    #[test]
    fn selection_follows_priority_not_request_order() {
        let picked = select_sources(&known(), &["ibn_kathir".into(), "tabari".into()]).unwrap();
        let slugs: Vec<&str> = picked.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tabari", "ibn_kathir"]);
    }

    #[test]
    fn selection_accepts_ids_and_collapses_duplicates() {
        let picked = select_sources(&known(), &["1".into(), "tabari".into(), "3".into()]).unwrap();
        let slugs: Vec<&str> = picked.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tabari", "baghawi"]);
    }

    #[test]
    fn empty_selection_means_all_sources() {
        let picked = select_sources(&known(), &[]).unwrap();
        assert_eq!(picked.len(), 3);
        assert_eq!(picked[0].slug, "tabari");
    }

    #[test]
    fn unknown_source_is_a_client_error() {
        let err = select_sources(&known(), &["zamakhshari".into()]).unwrap_err();
        assert!(matches!(err, LookupError::BadRequest(_)));
    }

    #[test]
    fn absent_entries_are_kept_explicitly() {
        let sources = select_sources(&known(), &["baghawi".into(), "tabari".into()]).unwrap();
        let mut entries = HashMap::new();
        entries.insert(
            1,
            TafsirEntry {
                id: 10,
                text: "قال أبو جعفر".to_string(),
            },
        );

        let cmp = assemble(&verse(), sources, &entries);
        assert_eq!(cmp.items.len(), 2);
        assert_eq!(cmp.items[0].source.slug, "tabari");
        assert!(cmp.items[0].available);
        assert_eq!(cmp.items[1].source.slug, "baghawi");
        assert!(!cmp.items[1].available);
        assert!(cmp.items[1].entry.is_none());
        for item in &cmp.items {
            assert_eq!(item.verse_key, "2:255");
            assert_eq!(item.verse_text, verse().text_uthmani);
        }
    }

    #[test]
    fn layouts_render_as_tagged_variants() {
        let sources = select_sources(&known(), &["tabari".into(), "baghawi".into()]).unwrap();
        let mut entries = HashMap::new();
        entries.insert(
            1,
            TafsirEntry {
                id: 10,
                text: "tabari text".to_string(),
            },
        );
        let cmp = assemble(&verse(), sources, &entries);

        let table = serde_json::to_value(render(cmp.clone(), Layout::Table)).unwrap();
        assert_eq!(table["layout"], "table");
        assert_eq!(table["verse_key"], "2:255");
        assert_eq!(table["rows"].as_array().unwrap().len(), 2);
        assert_eq!(table["rows"][0][3], "tabari text");
        assert!(table["rows"][1][3].is_null());

        let side = serde_json::to_value(render(cmp.clone(), Layout::SideBySide)).unwrap();
        assert_eq!(side["layout"], "side_by_side");
        assert_eq!(side["columns"][1]["source"], "baghawi");

        let stacked = serde_json::to_value(render(cmp, Layout::Stacked)).unwrap();
        assert_eq!(stacked["layout"], "stacked");
        assert_eq!(stacked["items"][1]["available"], false);
    }

    #[test]
    fn layout_parsing() {
        assert_eq!("".parse::<Layout>().unwrap(), Layout::Stacked);
        assert_eq!("Side_By_Side".parse::<Layout>().unwrap(), Layout::SideBySide);
        assert!("grid".parse::<Layout>().is_err());
    }

    #[test]
    fn source_list_splitting() {
        assert_eq!(
            split_source_list(Some("tabari, ibn_kathir,,")),
            vec!["tabari".to_string(), "ibn_kathir".to_string()]
        );
        assert!(split_source_list(None).is_empty());
    }
}
