//! Readers, transmitters, word-level variants and the printed riwayat.
//!
//! Two views of the qiraat are stored:
//!
//! - **Variants**: a word of a verse with one reading row per reader (and
//!   optionally per transmitter).
//! - **Riwayat**: the full verse text as printed in each of the eight
//!   riwayat, plus documented differences with one reading per riwaya.
//!
//! Both views can be searched by word or type, and any two riwayat can be
//! compared ayah by ayah.
//!
//! Audio reciter metadata is also served from here; when the table cannot
//! be read the bundled [`DEFAULT_RECITERS`] are returned instead.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashSet};

use crate::error::{LookupError, LookupResult};
use crate::models::{Reader, Transmitter, VerseKey};
use crate::quran;

// ============ Readers ============

#[derive(Debug, Clone, Serialize)]
pub struct TransmitterInfo {
    pub id: i64,
    pub slug: String,
    pub name_ar: String,
    pub name_en: String,
    pub reader: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReaderInfo {
    pub id: i64,
    pub slug: String,
    pub name_ar: String,
    pub name_en: String,
    pub death_year_ah: Option<i64>,
    pub city: Option<String>,
    pub rank: i64,
    pub transmitters: Vec<TransmitterInfo>,
}

pub async fn list_transmitters(pool: &SqlitePool) -> LookupResult<Vec<TransmitterInfo>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.slug, r.name_ar, r.name_en, r.is_primary, q.slug AS reader
        FROM ruwat r JOIN qurra q ON q.id = r.qari_id
        ORDER BY q.rank, r.is_primary DESC, r.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| TransmitterInfo {
            id: row.get("id"),
            slug: row.get("slug"),
            name_ar: row.get("name_ar"),
            name_en: row.get("name_en"),
            reader: row.get("reader"),
            is_primary: row.get("is_primary"),
        })
        .collect())
}

/// The ten readers in rank order, each with its transmitters.
pub async fn list_readers(pool: &SqlitePool) -> LookupResult<Vec<ReaderInfo>> {
    let rows = sqlx::query(
        "SELECT id, slug, name_ar, name_en, death_year_ah, city, rank FROM qurra ORDER BY rank",
    )
    .fetch_all(pool)
    .await?;
    let transmitters = list_transmitters(pool).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let slug: String = row.get("slug");
            ReaderInfo {
                id: row.get("id"),
                transmitters: transmitters
                    .iter()
                    .filter(|t| t.reader == slug)
                    .cloned()
                    .collect(),
                slug,
                name_ar: row.get("name_ar"),
                name_en: row.get("name_en"),
                death_year_ah: row.get("death_year_ah"),
                city: row.get("city"),
                rank: row.get("rank"),
            }
        })
        .collect())
}

// ============ Variants ============

#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub id: i64,
    pub reader: String,
    pub reader_name_ar: String,
    pub transmitter: Option<String>,
    pub transmitter_name_ar: Option<String>,
    pub reading_text: String,
    pub phonetic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub id: i64,
    pub word_position: Option<i64>,
    pub word_text: String,
    pub variant_type: String,
    pub description: Option<String>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerseVariants {
    pub verse_key: String,
    pub text_uthmani: String,
    pub variants: Vec<Variant>,
}

/// Variants with their readings, for every verse matching `verse_filter`.
async fn load_variants(
    pool: &SqlitePool,
    verse_filter: &str,
    bind: i64,
) -> LookupResult<Vec<(String, String, Variant)>> {
    let variant_rows = sqlx::query(&format!(
        r#"
        SELECT qv.id, qv.word_position, qv.word_text, qv.variant_type, qv.description,
               v.verse_key, v.text_uthmani
        FROM qiraat_variants qv JOIN verses v ON v.id = qv.verse_id
        WHERE {}
        ORDER BY v.surah_id, v.ayah_number, qv.word_position, qv.id
        "#,
        verse_filter
    ))
    .bind(bind)
    .fetch_all(pool)
    .await?;

    let reading_rows = sqlx::query(&format!(
        r#"
        SELECT qr.id, qr.variant_id, qr.reading_text, qr.phonetic,
               q.slug AS reader, q.name_ar AS reader_name_ar, q.rank,
               r.slug AS transmitter, r.name_ar AS transmitter_name_ar
        FROM qiraat_readings qr
        JOIN qiraat_variants qv ON qv.id = qr.variant_id
        JOIN verses v ON v.id = qv.verse_id
        JOIN qurra q ON q.id = qr.qari_id
        LEFT JOIN ruwat r ON r.id = qr.rawi_id
        WHERE {}
        ORDER BY q.rank, r.id, qr.id
        "#,
        verse_filter
    ))
    .bind(bind)
    .fetch_all(pool)
    .await?;

    let mut readings: BTreeMap<i64, Vec<Reading>> = BTreeMap::new();
    for row in &reading_rows {
        readings
            .entry(row.get("variant_id"))
            .or_default()
            .push(Reading {
                id: row.get("id"),
                reader: row.get("reader"),
                reader_name_ar: row.get("reader_name_ar"),
                transmitter: row.get("transmitter"),
                transmitter_name_ar: row.get("transmitter_name_ar"),
                reading_text: row.get("reading_text"),
                phonetic: row.get("phonetic"),
            });
    }

    Ok(variant_rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("id");
            (
                row.get("verse_key"),
                row.get("text_uthmani"),
                Variant {
                    id,
                    word_position: row.get("word_position"),
                    word_text: row.get("word_text"),
                    variant_type: row.get("variant_type"),
                    description: row.get("description"),
                    readings: readings.remove(&id).unwrap_or_default(),
                },
            )
        })
        .collect())
}

pub async fn variants_for_verse(pool: &SqlitePool, key: VerseKey) -> LookupResult<VerseVariants> {
    let verse = quran::get_verse(pool, key).await?;
    let variants = load_variants(pool, "v.id = ?", verse.id)
        .await?
        .into_iter()
        .map(|(_, _, variant)| variant)
        .collect();
    Ok(VerseVariants {
        verse_key: verse.verse_key,
        text_uthmani: verse.text_uthmani,
        variants,
    })
}

/// Variants of a surah grouped by verse; verses without variants are omitted.
pub async fn variants_for_surah(pool: &SqlitePool, surah: u16) -> LookupResult<Vec<VerseVariants>> {
    quran::get_surah_header(pool, surah).await?;
    let flat = load_variants(pool, "v.surah_id = ?", surah as i64).await?;
    Ok(group_by_verse(flat))
}

/// Fold consecutive variants of the same verse together.
fn group_by_verse(flat: Vec<(String, String, Variant)>) -> Vec<VerseVariants> {
    let mut grouped: Vec<VerseVariants> = Vec::new();
    for (verse_key, text, variant) in flat {
        match grouped.last_mut() {
            Some(last) if last.verse_key == verse_key => last.variants.push(variant),
            _ => grouped.push(VerseVariants {
                verse_key,
                text_uthmani: text,
                variants: vec![variant],
            }),
        }
    }
    grouped
}

// ============ Riwayat ============

#[derive(Debug, Clone, Serialize)]
pub struct Riwaya {
    pub id: i64,
    pub code: String,
    pub name_ar: String,
    pub name_en: String,
    pub reader: String,
    pub transmitter: String,
}

pub async fn list_riwayat(pool: &SqlitePool) -> LookupResult<Vec<Riwaya>> {
    let rows = sqlx::query("SELECT id, code, name_ar, name_en, qari_id, rawi_id FROM riwayat ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Riwaya {
            id: row.get("id"),
            code: row.get("code"),
            name_ar: row.get("name_ar"),
            name_en: row.get("name_en"),
            reader: Reader::from_id(row.get("qari_id"))
                .map(|r| r.slug().to_string())
                .unwrap_or_default(),
            transmitter: Transmitter::from_id(row.get("rawi_id"))
                .map(|t| t.slug().to_string())
                .unwrap_or_default(),
        })
        .collect())
}

async fn find_riwaya(pool: &SqlitePool, code: &str) -> LookupResult<Riwaya> {
    list_riwayat(pool)
        .await?
        .into_iter()
        .find(|r| r.code.eq_ignore_ascii_case(code.trim()))
        .ok_or_else(|| LookupError::not_found(format!("riwaya not found: {}", code)))
}

#[derive(Debug, Clone, Serialize)]
pub struct RiwayaReading {
    pub riwaya: String,
    pub name_ar: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DifferenceReading {
    pub riwaya: String,
    pub reading_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Difference {
    pub id: i64,
    pub verse_key: String,
    pub word_position: Option<i64>,
    pub word_text: Option<String>,
    pub difference_type: String,
    pub description: Option<String>,
    pub readings: Vec<DifferenceReading>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerseRiwayat {
    pub verse_key: String,
    pub text_uthmani: String,
    pub readings: Vec<RiwayaReading>,
    pub differences: Vec<Difference>,
}

async fn riwaya_readings(pool: &SqlitePool, key: VerseKey) -> LookupResult<Vec<RiwayaReading>> {
    let rows = sqlx::query(
        r#"
        SELECT w.code, w.name_ar, t.text
        FROM riwaya_texts t JOIN riwayat w ON w.id = t.riwaya_id
        WHERE t.surah_id = ? AND t.ayah_number = ?
        ORDER BY w.id
        "#,
    )
    .bind(key.surah as i64)
    .bind(key.ayah as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RiwayaReading {
            riwaya: row.get("code"),
            name_ar: row.get("name_ar"),
            text: row.get("text"),
        })
        .collect())
}

/// Differences for a surah, optionally one ayah and/or one difference type.
async fn load_differences(
    pool: &SqlitePool,
    surah: u16,
    ayah: Option<u16>,
    difference_type: Option<&str>,
) -> LookupResult<Vec<Difference>> {
    let rows = sqlx::query(
        r#"
        SELECT id, surah_id, ayah_number, word_position, word_text, difference_type, description
        FROM riwaya_differences
        WHERE surah_id = ?1
          AND (?2 IS NULL OR ayah_number = ?2)
          AND (?3 IS NULL OR difference_type = ?3)
        ORDER BY ayah_number, word_position, id
        "#,
    )
    .bind(surah as i64)
    .bind(ayah.map(|a| a as i64))
    .bind(difference_type)
    .fetch_all(pool)
    .await?;

    let reading_rows = sqlx::query(
        r#"
        SELECT dr.difference_id, w.code, dr.reading_text
        FROM riwaya_difference_readings dr
        JOIN riwaya_differences d ON d.id = dr.difference_id
        JOIN riwayat w ON w.id = dr.riwaya_id
        WHERE d.surah_id = ?1 AND (?2 IS NULL OR d.ayah_number = ?2)
        ORDER BY w.id
        "#,
    )
    .bind(surah as i64)
    .bind(ayah.map(|a| a as i64))
    .fetch_all(pool)
    .await?;

    let mut readings = difference_readings(&reading_rows);

    Ok(rows
        .iter()
        .map(|row| difference_from_row(row, &mut readings))
        .collect())
}

fn difference_readings(rows: &[SqliteRow]) -> BTreeMap<i64, Vec<DifferenceReading>> {
    let mut readings: BTreeMap<i64, Vec<DifferenceReading>> = BTreeMap::new();
    for row in rows {
        readings
            .entry(row.get("difference_id"))
            .or_default()
            .push(DifferenceReading {
                riwaya: row.get("code"),
                reading_text: row.get("reading_text"),
            });
    }
    readings
}

fn difference_from_row(
    row: &SqliteRow,
    readings: &mut BTreeMap<i64, Vec<DifferenceReading>>,
) -> Difference {
    let id: i64 = row.get("id");
    let surah_id: i64 = row.get("surah_id");
    let ayah_number: i64 = row.get("ayah_number");
    Difference {
        id,
        verse_key: format!("{}:{}", surah_id, ayah_number),
        word_position: row.get("word_position"),
        word_text: row.get("word_text"),
        difference_type: row.get("difference_type"),
        description: row.get("description"),
        readings: readings.remove(&id).unwrap_or_default(),
    }
}

/// The verse as printed in every riwaya, with its documented differences.
pub async fn verse_riwayat(pool: &SqlitePool, key: VerseKey) -> LookupResult<VerseRiwayat> {
    let verse = quran::get_verse(pool, key).await?;
    let readings = riwaya_readings(pool, key).await?;
    let differences = load_differences(pool, key.surah, Some(key.ayah), None).await?;
    Ok(VerseRiwayat {
        verse_key: verse.verse_key,
        text_uthmani: verse.text_uthmani,
        readings,
        differences,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RiwayatComparison {
    pub verse_key: String,
    pub text_uthmani: String,
    pub has_variant: bool,
    pub unique_reading_count: usize,
    pub readings: Vec<RiwayaReading>,
}

/// Number of distinct texts among `readings`, ignoring surrounding whitespace.
pub fn unique_reading_count(readings: &[RiwayaReading]) -> usize {
    readings
        .iter()
        .map(|r| r.text.trim())
        .collect::<HashSet<_>>()
        .len()
}

pub async fn compare_riwayat(pool: &SqlitePool, key: VerseKey) -> LookupResult<RiwayatComparison> {
    let verse = quran::get_verse(pool, key).await?;
    let readings = riwaya_readings(pool, key).await?;
    let unique = unique_reading_count(&readings);
    Ok(RiwayatComparison {
        verse_key: verse.verse_key,
        text_uthmani: verse.text_uthmani,
        has_variant: unique > 1,
        unique_reading_count: unique,
        readings,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RiwayaAyah {
    pub verse_key: String,
    pub ayah_number: i64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiwayaSurah {
    pub riwaya: Riwaya,
    pub surah_id: i64,
    pub verses: Vec<RiwayaAyah>,
}

pub async fn riwaya_surah(pool: &SqlitePool, code: &str, surah: u16) -> LookupResult<RiwayaSurah> {
    let riwaya = find_riwaya(pool, code).await?;
    quran::get_surah_header(pool, surah).await?;

    let rows = sqlx::query(
        "SELECT ayah_number, text FROM riwaya_texts WHERE riwaya_id = ? AND surah_id = ? ORDER BY ayah_number",
    )
    .bind(riwaya.id)
    .bind(surah as i64)
    .fetch_all(pool)
    .await?;

    Ok(RiwayaSurah {
        riwaya,
        surah_id: surah as i64,
        verses: rows
            .iter()
            .map(|row| {
                let ayah: i64 = row.get("ayah_number");
                RiwayaAyah {
                    verse_key: format!("{}:{}", surah, ayah),
                    ayah_number: ayah,
                    text: row.get("text"),
                }
            })
            .collect(),
    })
}

pub async fn surah_differences(
    pool: &SqlitePool,
    surah: u16,
    difference_type: Option<&str>,
) -> LookupResult<Vec<Difference>> {
    quran::get_surah_header(pool, surah).await?;
    let difference_type = difference_type.map(str::trim).filter(|t| !t.is_empty());
    load_differences(pool, surah, None, difference_type).await
}

// ============ Search ============

/// Filters for [`search`]. At least one of `word` and `kind` must be set.
#[derive(Debug, Clone, Default)]
pub struct QiraatSearch {
    /// Substring of the variant word, a reading, or a difference's word.
    pub word: Option<String>,
    /// Variant type (`farsh`, `usul`) or difference type (`silah`, ...).
    pub kind: Option<String>,
    pub surah: Option<u16>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QiraatSearchResults {
    pub word: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub variant_count: usize,
    pub difference_count: usize,
    pub variants: Vec<VerseVariants>,
    pub differences: Vec<Difference>,
}

/// Word-level variants and riwaya differences matching a word and/or a
/// type, in mushaf order. `limit` and `offset` apply to each list.
pub async fn search(pool: &SqlitePool, params: &QiraatSearch) -> LookupResult<QiraatSearchResults> {
    let word = params
        .word
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty());
    let kind = params
        .kind
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    if word.is_none() && kind.is_none() {
        return Err(LookupError::bad_request(
            "at least one of word or type is required",
        ));
    }
    let pattern = word.map(quran::like_pattern);
    let surah = params.surah.map(|s| s as i64);

    let variant_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT qv.id
        FROM qiraat_variants qv JOIN verses v ON v.id = qv.verse_id
        WHERE (?1 IS NULL
               OR qv.word_text LIKE ?1 ESCAPE '\'
               OR EXISTS (SELECT 1 FROM qiraat_readings qr
                          WHERE qr.variant_id = qv.id AND qr.reading_text LIKE ?1 ESCAPE '\'))
          AND (?2 IS NULL OR qv.variant_type = ?2)
          AND (?3 IS NULL OR v.surah_id = ?3)
        ORDER BY v.surah_id, v.ayah_number, qv.word_position, qv.id
        LIMIT ?4 OFFSET ?5
        "#,
    )
    .bind(pattern.as_deref())
    .bind(kind)
    .bind(surah)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(pool)
    .await?;

    let mut flat = Vec::with_capacity(variant_ids.len());
    for id in variant_ids {
        flat.extend(load_variants(pool, "qv.id = ?", id).await?);
    }
    let variants = group_by_verse(flat);

    const DIFFERENCE_MATCH: &str = r#"
        (?1 IS NULL
         OR d.word_text LIKE ?1 ESCAPE '\'
         OR EXISTS (SELECT 1 FROM riwaya_difference_readings x
                    WHERE x.difference_id = d.id AND x.reading_text LIKE ?1 ESCAPE '\'))
        AND (?2 IS NULL OR d.difference_type = ?2)
        AND (?3 IS NULL OR d.surah_id = ?3)
    "#;
    let rows = sqlx::query(&format!(
        r#"
        SELECT d.id, d.surah_id, d.ayah_number, d.word_position, d.word_text,
               d.difference_type, d.description
        FROM riwaya_differences d
        WHERE {}
        ORDER BY d.surah_id, d.ayah_number, d.word_position, d.id
        LIMIT ?4 OFFSET ?5
        "#,
        DIFFERENCE_MATCH
    ))
    .bind(pattern.as_deref())
    .bind(kind)
    .bind(surah)
    .bind(params.limit)
    .bind(params.offset)
    .fetch_all(pool)
    .await?;

    let reading_rows = sqlx::query(&format!(
        r#"
        SELECT dr.difference_id, w.code, dr.reading_text
        FROM riwaya_difference_readings dr
        JOIN riwaya_differences d ON d.id = dr.difference_id
        JOIN riwayat w ON w.id = dr.riwaya_id
        WHERE {}
        ORDER BY w.id
        "#,
        DIFFERENCE_MATCH
    ))
    .bind(pattern.as_deref())
    .bind(kind)
    .bind(surah)
    .fetch_all(pool)
    .await?;
    let mut readings = difference_readings(&reading_rows);
    let differences: Vec<Difference> = rows
        .iter()
        .map(|row| difference_from_row(row, &mut readings))
        .collect();

    Ok(QiraatSearchResults {
        word: word.map(str::to_string),
        kind: kind.map(str::to_string),
        variant_count: variants.iter().map(|v| v.variants.len()).sum(),
        difference_count: differences.len(),
        variants,
        differences,
    })
}

// ============ Two riwayat side by side ============

#[derive(Debug, Clone, Serialize)]
pub struct PairedAyah {
    pub verse_key: String,
    pub surah_id: i64,
    pub ayah_number: i64,
    pub surah_name_ar: String,
    pub first_text: String,
    pub second_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiwayaPairComparison {
    pub first: Riwaya,
    pub second: Riwaya,
    pub surah_id: Option<u16>,
    pub total_differences: usize,
    pub differences: Vec<PairedAyah>,
}

/// Ayat whose printed text differs between two riwayat. Ayat missing from
/// either riwaya are not compared.
pub async fn compare_two_riwayat(
    pool: &SqlitePool,
    first: &str,
    second: &str,
    surah: Option<u16>,
    limit: i64,
    offset: i64,
) -> LookupResult<RiwayaPairComparison> {
    if first.trim().eq_ignore_ascii_case(second.trim()) {
        return Err(LookupError::bad_request(
            "two different riwayat are required for a comparison",
        ));
    }
    let first = find_riwaya(pool, first).await?;
    let second = find_riwaya(pool, second).await?;
    if let Some(id) = surah {
        quran::get_surah_header(pool, id).await?;
    }

    let rows = sqlx::query(
        r#"
        SELECT a.surah_id, a.ayah_number, s.name_ar, a.text AS first_text, b.text AS second_text
        FROM riwaya_texts a
        JOIN riwaya_texts b ON b.surah_id = a.surah_id AND b.ayah_number = a.ayah_number
        JOIN surahs s ON s.id = a.surah_id
        WHERE a.riwaya_id = ?1 AND b.riwaya_id = ?2
          AND TRIM(a.text) != TRIM(b.text)
          AND (?3 IS NULL OR a.surah_id = ?3)
        ORDER BY a.surah_id, a.ayah_number
        LIMIT ?4 OFFSET ?5
        "#,
    )
    .bind(first.id)
    .bind(second.id)
    .bind(surah.map(|s| s as i64))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let differences: Vec<PairedAyah> = rows
        .iter()
        .map(|row| {
            let surah_id: i64 = row.get("surah_id");
            let ayah_number: i64 = row.get("ayah_number");
            PairedAyah {
                verse_key: format!("{}:{}", surah_id, ayah_number),
                surah_id,
                ayah_number,
                surah_name_ar: row.get("name_ar"),
                first_text: row.get("first_text"),
                second_text: row.get("second_text"),
            }
        })
        .collect();

    Ok(RiwayaPairComparison {
        first,
        second,
        surah_id: surah,
        total_differences: differences.len(),
        differences,
    })
}

// ============ Statistics ============

#[derive(Debug, Clone, Serialize)]
pub struct ReaderCount {
    pub reader: String,
    pub name_ar: String,
    pub readings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QiraatStats {
    pub variants: i64,
    pub readings: i64,
    pub verses_with_variants: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_reader: Vec<ReaderCount>,
    pub riwayat: i64,
    pub riwaya_texts: i64,
    pub differences: i64,
    pub differences_by_type: BTreeMap<String, i64>,
}

pub async fn stats(pool: &SqlitePool) -> LookupResult<QiraatStats> {
    let totals = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM qiraat_variants) AS variants,
            (SELECT COUNT(*) FROM qiraat_readings) AS readings,
            (SELECT COUNT(DISTINCT verse_id) FROM qiraat_variants) AS verses_with_variants,
            (SELECT COUNT(*) FROM riwayat) AS riwayat,
            (SELECT COUNT(*) FROM riwaya_texts) AS riwaya_texts,
            (SELECT COUNT(*) FROM riwaya_differences) AS differences
        "#,
    )
    .fetch_one(pool)
    .await?;

    let by_type = count_by(pool, "SELECT variant_type AS k, COUNT(*) AS n FROM qiraat_variants GROUP BY variant_type").await?;
    let differences_by_type = count_by(
        pool,
        "SELECT difference_type AS k, COUNT(*) AS n FROM riwaya_differences GROUP BY difference_type",
    )
    .await?;

    let reader_rows = sqlx::query(
        r#"
        SELECT q.slug, q.name_ar, COUNT(qr.id) AS readings
        FROM qurra q LEFT JOIN qiraat_readings qr ON qr.qari_id = q.id
        GROUP BY q.id
        ORDER BY q.rank
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(QiraatStats {
        variants: totals.get("variants"),
        readings: totals.get("readings"),
        verses_with_variants: totals.get("verses_with_variants"),
        by_type,
        by_reader: reader_rows
            .iter()
            .map(|row| ReaderCount {
                reader: row.get("slug"),
                name_ar: row.get("name_ar"),
                readings: row.get("readings"),
            })
            .collect(),
        riwayat: totals.get("riwayat"),
        riwaya_texts: totals.get("riwaya_texts"),
        differences: totals.get("differences"),
        differences_by_type,
    })
}

async fn count_by(pool: &SqlitePool, sql: &str) -> LookupResult<BTreeMap<String, i64>> {
    let rows = sqlx::query(sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<String, _>("k"), row.get::<i64, _>("n")))
        .collect())
}

// ============ Audio reciters ============

pub struct DefaultReciter {
    pub slug: &'static str,
    pub riwaya_code: &'static str,
    pub name_ar: &'static str,
    pub name_en: &'static str,
    pub base_url: &'static str,
    pub path: &'static str,
}

const EVERYAYAH: &str = "https://everyayah.com/data";

/// Reciters served when the reciter table is empty or unreadable.
pub const DEFAULT_RECITERS: &[DefaultReciter] = &[
    DefaultReciter { slug: "abdul_basit", riwaya_code: "hafs", name_ar: "عبد الباسط عبد الصمد", name_en: "Abdul Basit (Murattal)", base_url: EVERYAYAH, path: "Abdul_Basit_Murattal_64kbps" },
    DefaultReciter { slug: "mishary", riwaya_code: "hafs", name_ar: "مشاري راشد العفاسي", name_en: "Mishary Alafasy", base_url: EVERYAYAH, path: "Alafasy_64kbps" },
    DefaultReciter { slug: "husary", riwaya_code: "hafs", name_ar: "محمود خليل الحصري", name_en: "Mahmoud Khalil Al-Husary", base_url: EVERYAYAH, path: "Husary_64kbps" },
    DefaultReciter { slug: "minshawi", riwaya_code: "hafs", name_ar: "محمد صديق المنشاوي", name_en: "Minshawi (Murattal)", base_url: EVERYAYAH, path: "Minshawy_Murattal_128kbps" },
    DefaultReciter { slug: "sudais", riwaya_code: "hafs", name_ar: "عبد الرحمن السديس", name_en: "Abdurrahmaan As-Sudais", base_url: EVERYAYAH, path: "Abdurrahmaan_As-Sudais_64kbps" },
    DefaultReciter { slug: "warsh_dosary", riwaya_code: "warsh", name_ar: "إبراهيم الدوسري (ورش)", name_en: "Ibrahim Al-Dosary (Warsh)", base_url: EVERYAYAH, path: "warsh/warsh_ibrahim_aldosary_128kbps" },
];

#[derive(Debug, Clone, Serialize)]
pub struct Reciter {
    pub slug: String,
    pub riwaya: String,
    pub name_ar: String,
    pub name_en: String,
    pub base_url: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl From<&DefaultReciter> for Reciter {
    fn from(d: &DefaultReciter) -> Self {
        Reciter {
            slug: d.slug.to_string(),
            riwaya: d.riwaya_code.to_string(),
            name_ar: d.name_ar.to_string(),
            name_en: d.name_en.to_string(),
            base_url: d.base_url.to_string(),
            path: d.path.to_string(),
            audio_url: None,
        }
    }
}

/// Per-verse mp3 URL, e.g. `.../Alafasy_64kbps/002255.mp3`.
pub fn verse_audio_url(base_url: &str, path: &str, key: VerseKey) -> String {
    format!(
        "{}/{}/{:03}{:03}.mp3",
        base_url.trim_end_matches('/'),
        path.trim_matches('/'),
        key.surah,
        key.ayah
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ReciterList {
    /// True when the bundled list was served instead of stored metadata.
    pub fallback: bool,
    pub reciters: Vec<Reciter>,
}

async fn stored_reciters(pool: &SqlitePool) -> Result<Vec<Reciter>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT slug, riwaya_code, name_ar, name_en, base_url, path FROM audio_reciters WHERE has_verse_audio = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Reciter {
            slug: row.get("slug"),
            riwaya: row.get("riwaya_code"),
            name_ar: row.get("name_ar"),
            name_en: row.get("name_en"),
            base_url: row.get("base_url"),
            path: row.get("path"),
            audio_url: None,
        })
        .collect())
}

/// Reciters, optionally restricted to one riwaya and with per-verse URLs.
///
/// This is the one lookup that degrades instead of failing: a query error
/// or an empty table yields the bundled list with `fallback: true`.
pub async fn list_reciters(
    pool: &SqlitePool,
    riwaya: Option<&str>,
    verse: Option<VerseKey>,
) -> ReciterList {
    let (fallback, mut reciters) = match stored_reciters(pool).await {
        Ok(list) if !list.is_empty() => (false, list),
        Ok(_) => {
            tracing::warn!("audio_reciters is empty, serving bundled reciters");
            (true, DEFAULT_RECITERS.iter().map(Reciter::from).collect())
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read audio_reciters, serving bundled reciters");
            (true, DEFAULT_RECITERS.iter().map(Reciter::from).collect())
        }
    };

    if let Some(code) = riwaya.map(str::trim).filter(|c| !c.is_empty()) {
        reciters.retain(|r| r.riwaya.eq_ignore_ascii_case(code));
    }
    if let Some(key) = verse {
        for r in &mut reciters {
            r.audio_url = Some(verse_audio_url(&r.base_url, &r.path, key));
        }
    }

    ReciterList { fallback, reciters }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(riwaya: &str, text: &str) -> RiwayaReading {
        RiwayaReading {
            riwaya: riwaya.to_string(),
            name_ar: riwaya.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn unique_readings_ignore_whitespace() {
        let readings = vec![
            reading("hafs", "مَٰلِكِ يَوْمِ ٱلدِّينِ"),
            reading("warsh", "مَلِكِ يَوْمِ ٱلدِّينِ"),
            reading("qaloon", "مَلِكِ يَوْمِ ٱلدِّينِ "),
        ];
        assert_eq!(unique_reading_count(&readings), 2);
        assert_eq!(unique_reading_count(&readings[1..]), 1);
        assert_eq!(unique_reading_count(&[]), 0);
    }

    #[test]
    fn audio_urls_are_zero_padded() {
        let key: VerseKey = "2:255".parse().unwrap();
        assert_eq!(
            verse_audio_url("https://everyayah.com/data/", "Alafasy_64kbps", key),
            "https://everyayah.com/data/Alafasy_64kbps/002255.mp3"
        );
        let key: VerseKey = "1:1".parse().unwrap();
        assert_eq!(
            verse_audio_url(EVERYAYAH, "warsh/warsh_ibrahim_aldosary_128kbps", key),
            "https://everyayah.com/data/warsh/warsh_ibrahim_aldosary_128kbps/001001.mp3"
        );
    }

    #[tokio::test]
    async fn seeded_reciters_are_served_from_the_table() {
        let pool = crate::migrate::test_pool().await;
        let list = list_reciters(&pool, Some("warsh"), None).await;
        assert!(!list.fallback);
        assert_eq!(list.reciters.len(), 1);
        assert_eq!(list.reciters[0].slug, "warsh_dosary");
    }

    #[tokio::test]
    async fn unreadable_reciter_table_falls_back_to_bundled_list() {
        let pool = crate::migrate::test_pool().await;
        sqlx::query("DROP TABLE audio_reciters")
            .execute(&pool)
            .await
            .unwrap();

        let key: VerseKey = "1:1".parse().unwrap();
        let list = list_reciters(&pool, None, Some(key)).await;
        assert!(list.fallback);
        assert_eq!(list.reciters.len(), DEFAULT_RECITERS.len());
        assert!(list.reciters.iter().all(|r| r.audio_url.is_some()));
    }

    async fn fixture_pool() -> SqlitePool {
        let pool = crate::migrate::test_pool().await;
        let bundle: crate::import::Bundle =
            serde_json::from_str(include_str!("../tests/fixtures/corpus.json")).unwrap();
        crate::import::import_bundle(&pool, &bundle, "h", "corpus.json")
            .await
            .unwrap();
        pool
    }

    fn by_word(word: &str) -> QiraatSearch {
        QiraatSearch {
            word: Some(word.to_string()),
            limit: 50,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn search_finds_variants_and_differences_by_word() {
        let pool = fixture_pool().await;
        let found = search(&pool, &by_word("مالك")).await.unwrap();
        assert_eq!(found.variant_count, 1);
        assert_eq!(found.variants[0].verse_key, "1:4");
        assert_eq!(found.variants[0].variants[0].readings.len(), 4);
        assert_eq!(found.difference_count, 1);
        assert_eq!(found.differences[0].readings.len(), 3);

        // Matches a reading text, not only the headword.
        let found = search(&pool, &by_word("عَلَيْهِمُو")).await.unwrap();
        assert_eq!(found.variant_count, 0);
        assert_eq!(found.differences[0].verse_key, "1:7");
    }

    #[tokio::test]
    async fn search_by_type_and_surah() {
        let pool = fixture_pool().await;
        let params = QiraatSearch {
            kind: Some("silah".to_string()),
            limit: 50,
            ..Default::default()
        };
        let found = search(&pool, &params).await.unwrap();
        assert_eq!(found.difference_count, 1);
        assert_eq!(found.variant_count, 0);

        let params = QiraatSearch {
            surah: Some(2),
            ..by_word("مالك")
        };
        let found = search(&pool, &params).await.unwrap();
        assert_eq!(found.variant_count + found.difference_count, 0);

        let err = search(&pool, &QiraatSearch { limit: 10, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::BadRequest(_)));
    }

    #[tokio::test]
    async fn two_riwayat_differ_only_where_texts_differ() {
        let pool = fixture_pool().await;
        let cmp = compare_two_riwayat(&pool, "hafs", "WARSH", None, 100, 0)
            .await
            .unwrap();
        assert_eq!(cmp.first.code, "hafs");
        assert_eq!(cmp.second.code, "warsh");
        // 1:1 is identical in both; 1:4 differs.
        assert_eq!(cmp.total_differences, 1);
        assert_eq!(cmp.differences[0].verse_key, "1:4");
        assert_eq!(cmp.differences[0].second_text, "مَلِكِ يَوْمِ ٱلدِّينِ");

        let same = compare_two_riwayat(&pool, "hafs", "hafs", None, 100, 0).await;
        assert!(matches!(same, Err(LookupError::BadRequest(_))));
        let unknown = compare_two_riwayat(&pool, "hafs", "nope", None, 100, 0).await;
        assert!(matches!(unknown, Err(LookupError::NotFound(_))));
    }

    #[tokio::test]
    async fn readers_come_with_two_transmitters_each() {
        let pool = crate::migrate::test_pool().await;
        let readers = list_readers(&pool).await.unwrap();
        assert_eq!(readers.len(), 10);
        assert_eq!(readers[0].slug, "nafi");
        assert!(readers.iter().all(|r| r.transmitters.len() == 2));
        assert_eq!(readers[4].transmitters[0].slug, "shuba");
    }
}
