//! Corpus import from a JSON bundle.
//!
//! A bundle carries any subset of the corpus tables (surahs, verses,
//! tafsir entries, variants, riwayat texts and differences, asbab records,
//! extra rules). The whole bundle is written in one transaction: a
//! malformed record or constraint violation anywhere rolls everything
//! back. Each bundle's SHA-256 is recorded in `imports`, and a bundle that
//! was already imported is skipped unless `--force` is given.
//!
//! Keyed tables (surahs, verses, tafsir entries, riwaya texts, rules) are
//! upserted. Variants, differences and asbab records have no natural key,
//! so they carry the hash of the bundle that wrote them; re-importing a
//! bundle first removes the rows it wrote last time.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{parse_reader_pair, Reader, Transmitter, VerseKey};
use crate::rules::RuleCategory;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Bundle {
    pub surahs: Vec<SurahRecord>,
    pub verses: Vec<VerseRecord>,
    pub tafsir: Vec<TafsirRecord>,
    pub variants: Vec<VariantRecord>,
    pub riwaya_texts: Vec<RiwayaTextRecord>,
    pub differences: Vec<DifferenceRecord>,
    pub asbab: Vec<AsbabRecord>,
    pub rules: Vec<RuleRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SurahRecord {
    pub id: i64,
    pub name_ar: String,
    pub name_en: String,
    pub name_transliterated: String,
    pub revelation_type: String,
    pub revelation_order: Option<i64>,
    pub ayah_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerseRecord {
    pub surah: u16,
    pub ayah: u16,
    pub text_uthmani: String,
    pub text_simple: Option<String>,
    pub page: Option<i64>,
    pub juz: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TafsirRecord {
    /// Source slug, e.g. `tabari`.
    pub source: String,
    pub verse_key: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct VariantRecord {
    pub verse_key: String,
    pub word_position: Option<i64>,
    pub word_text: String,
    pub variant_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub readings: Vec<ReadingRecord>,
}

#[derive(Debug, Deserialize)]
pub struct ReadingRecord {
    pub reader: String,
    pub transmitter: Option<String>,
    pub reading_text: String,
    pub phonetic: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RiwayaTextRecord {
    pub riwaya: String,
    pub verse_key: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DifferenceRecord {
    pub verse_key: String,
    pub word_position: Option<i64>,
    pub word_text: Option<String>,
    pub difference_type: String,
    pub description: Option<String>,
    /// Riwaya code to reading text.
    #[serde(default)]
    pub readings: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct AsbabRecord {
    pub verse_key: String,
    pub source_id: Option<i64>,
    pub text_ar: String,
    pub isnad: Option<String>,
    pub authenticity: Option<String>,
    pub revelation_period: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleRecord {
    pub category: String,
    pub reader: Option<String>,
    pub transmitter: Option<String>,
    pub value: String,
    #[serde(default)]
    pub methods: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub surahs: u64,
    pub verses: u64,
    pub tafsir_entries: u64,
    pub variants: u64,
    pub readings: u64,
    pub riwaya_texts: u64,
    pub differences: u64,
    pub asbab: u64,
    pub rules: u64,
}

impl ImportSummary {
    pub fn total(&self) -> u64 {
        self.surahs
            + self.verses
            + self.tafsir_entries
            + self.variants
            + self.readings
            + self.riwaya_texts
            + self.differences
            + self.asbab
            + self.rules
    }
}

pub fn bundle_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// CLI entry point for `uloom import`.
pub async fn run_import(config: &Config, path: &Path, force: bool) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
    let hash = bundle_hash(&bytes);
    let bundle: Bundle = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse bundle: {}", path.display()))?;

    let pool = db::connect(config).await?;

    if !force && already_imported(&pool, &hash).await? {
        println!("import {} (skipped)", path.display());
        println!("  bundle already imported ({})", &hash[..12]);
        pool.close().await;
        return Ok(());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let result = import_bundle(&pool, &bundle, &hash, &file_name).await;
    pool.close().await;
    let summary = result?;

    println!("import {}", path.display());
    println!("  surahs:         {}", summary.surahs);
    println!("  verses:         {}", summary.verses);
    println!("  tafsir entries: {}", summary.tafsir_entries);
    println!("  variants:       {} ({} readings)", summary.variants, summary.readings);
    println!("  riwaya texts:   {}", summary.riwaya_texts);
    println!("  differences:    {}", summary.differences);
    println!("  asbab records:  {}", summary.asbab);
    println!("  rules:          {}", summary.rules);
    println!("ok");

    Ok(())
}

async fn already_imported(pool: &SqlitePool, hash: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM imports WHERE bundle_hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Write a bundle in a single transaction.
pub async fn import_bundle(
    pool: &SqlitePool,
    bundle: &Bundle,
    hash: &str,
    file_name: &str,
) -> Result<ImportSummary> {
    let mut tx = pool.begin().await?;
    let mut summary = ImportSummary::default();
    let mut verse_ids = VerseIds::default();

    let replaced = clear_bundle_rows(&mut tx, hash).await?;
    if replaced > 0 {
        tracing::info!(rows = replaced, file = file_name, "replacing rows from previous import");
    }

    for (i, s) in bundle.surahs.iter().enumerate() {
        insert_surah(&mut tx, s)
            .await
            .with_context(|| format!("surahs[{}] (id {})", i, s.id))?;
        summary.surahs += 1;
    }

    for (i, v) in bundle.verses.iter().enumerate() {
        insert_verse(&mut tx, v)
            .await
            .with_context(|| format!("verses[{}] ({}:{})", i, v.surah, v.ayah))?;
        summary.verses += 1;
    }

    let tafsir_ids = lookup_ids(&mut tx, "SELECT slug, id FROM tafsir_books").await?;
    for (i, t) in bundle.tafsir.iter().enumerate() {
        let ctx = || format!("tafsir[{}] ({} {})", i, t.source, t.verse_key);
        let tafsir_id = *tafsir_ids
            .get(t.source.trim())
            .ok_or_else(|| anyhow!("unknown tafsir source '{}'", t.source))
            .with_context(ctx)?;
        let verse_id = verse_ids.get(&mut tx, &t.verse_key).await.with_context(ctx)?;
        sqlx::query(
            r#"
            INSERT INTO tafsir_entries (tafsir_id, verse_id, text)
            VALUES (?, ?, ?)
            ON CONFLICT(tafsir_id, verse_id) DO UPDATE SET text = excluded.text
            "#,
        )
        .bind(tafsir_id)
        .bind(verse_id)
        .bind(&t.text)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?;
        summary.tafsir_entries += 1;
    }

    for (i, v) in bundle.variants.iter().enumerate() {
        let ctx = || format!("variants[{}] ({})", i, v.verse_key);
        let verse_id = verse_ids.get(&mut tx, &v.verse_key).await.with_context(ctx)?;
        let variant_id = sqlx::query(
            "INSERT INTO qiraat_variants (verse_id, word_position, word_text, variant_type, description, bundle_hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(verse_id)
        .bind(v.word_position)
        .bind(&v.word_text)
        .bind(v.variant_type.trim())
        .bind(&v.description)
        .bind(hash)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?
        .last_insert_rowid();
        summary.variants += 1;

        for r in &v.readings {
            let (reader, transmitter) =
                parse_reader_pair(&r.reader, r.transmitter.as_deref()).with_context(ctx)?;
            sqlx::query(
                "INSERT INTO qiraat_readings (variant_id, qari_id, rawi_id, reading_text, phonetic) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(variant_id)
            .bind(reader.id())
            .bind(transmitter.map(|t| t.id()))
            .bind(&r.reading_text)
            .bind(&r.phonetic)
            .execute(&mut *tx)
            .await
            .with_context(ctx)?;
            summary.readings += 1;
        }
    }

    let riwaya_ids = lookup_ids(&mut tx, "SELECT code, id FROM riwayat").await?;
    for (i, r) in bundle.riwaya_texts.iter().enumerate() {
        let ctx = || format!("riwaya_texts[{}] ({} {})", i, r.riwaya, r.verse_key);
        let riwaya_id = *riwaya_ids
            .get(r.riwaya.trim())
            .ok_or_else(|| anyhow!("unknown riwaya '{}'", r.riwaya))
            .with_context(ctx)?;
        let key: VerseKey = r.verse_key.parse().with_context(ctx)?;
        sqlx::query(
            r#"
            INSERT INTO riwaya_texts (riwaya_id, surah_id, ayah_number, text)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(riwaya_id, surah_id, ayah_number) DO UPDATE SET text = excluded.text
            "#,
        )
        .bind(riwaya_id)
        .bind(key.surah as i64)
        .bind(key.ayah as i64)
        .bind(&r.text)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?;
        summary.riwaya_texts += 1;
    }

    for (i, d) in bundle.differences.iter().enumerate() {
        let ctx = || format!("differences[{}] ({})", i, d.verse_key);
        let key: VerseKey = d.verse_key.parse().with_context(ctx)?;
        let difference_id = sqlx::query(
            "INSERT INTO riwaya_differences (surah_id, ayah_number, word_position, word_text, difference_type, description, bundle_hash) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.surah as i64)
        .bind(key.ayah as i64)
        .bind(d.word_position)
        .bind(&d.word_text)
        .bind(d.difference_type.trim())
        .bind(&d.description)
        .bind(hash)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?
        .last_insert_rowid();

        for (code, text) in &d.readings {
            let riwaya_id = *riwaya_ids
                .get(code.trim())
                .ok_or_else(|| anyhow!("unknown riwaya '{}'", code))
                .with_context(ctx)?;
            sqlx::query(
                "INSERT INTO riwaya_difference_readings (difference_id, riwaya_id, reading_text) VALUES (?, ?, ?)",
            )
            .bind(difference_id)
            .bind(riwaya_id)
            .bind(text)
            .execute(&mut *tx)
            .await
            .with_context(ctx)?;
        }
        summary.differences += 1;
    }

    for (i, a) in bundle.asbab.iter().enumerate() {
        let ctx = || format!("asbab[{}] ({})", i, a.verse_key);
        let verse_id = verse_ids.get(&mut tx, &a.verse_key).await.with_context(ctx)?;
        sqlx::query(
            "INSERT INTO asbab_nuzul (verse_id, source_id, text_ar, isnad, authenticity, revelation_period, bundle_hash) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(verse_id)
        .bind(a.source_id)
        .bind(&a.text_ar)
        .bind(&a.isnad)
        .bind(&a.authenticity)
        .bind(&a.revelation_period)
        .bind(hash)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?;
        summary.asbab += 1;
    }

    for (i, r) in bundle.rules.iter().enumerate() {
        let ctx = || format!("rules[{}] ({})", i, r.category);
        let (category, reader, transmitter) = parse_rule_scope(r).with_context(ctx)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO qiraat_rules (category, qari_id, rawi_id, value, methods_json, description)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(category.as_str())
        .bind(reader.map(|r| r.id()))
        .bind(transmitter.map(|t| t.id()))
        .bind(&r.value)
        .bind(serde_json::to_string(&r.methods)?)
        .bind(&r.description)
        .execute(&mut *tx)
        .await
        .with_context(ctx)?;
        summary.rules += 1;
    }

    sqlx::query(
        r#"
        INSERT INTO imports (bundle_hash, file_name, imported_at, row_count)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(bundle_hash) DO UPDATE SET
            file_name = excluded.file_name,
            imported_at = excluded.imported_at,
            row_count = excluded.row_count
        "#,
    )
    .bind(hash)
    .bind(file_name)
    .bind(chrono::Utc::now().timestamp())
    .bind(summary.total() as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(rows = summary.total(), file = file_name, "bundle imported");
    Ok(summary)
}

/// Delete the unkeyed rows a previous import of this bundle wrote,
/// children first.
async fn clear_bundle_rows(tx: &mut Transaction<'_, Sqlite>, hash: &str) -> Result<u64> {
    const STATEMENTS: &[&str] = &[
        "DELETE FROM qiraat_readings WHERE variant_id IN (SELECT id FROM qiraat_variants WHERE bundle_hash = ?)",
        "DELETE FROM qiraat_variants WHERE bundle_hash = ?",
        "DELETE FROM riwaya_difference_readings WHERE difference_id IN (SELECT id FROM riwaya_differences WHERE bundle_hash = ?)",
        "DELETE FROM riwaya_differences WHERE bundle_hash = ?",
        "DELETE FROM asbab_nuzul WHERE bundle_hash = ?",
    ];
    let mut removed = 0;
    for sql in STATEMENTS {
        removed += sqlx::query(sql)
            .bind(hash)
            .execute(&mut **tx)
            .await?
            .rows_affected();
    }
    Ok(removed)
}

async fn insert_surah(tx: &mut Transaction<'_, Sqlite>, s: &SurahRecord) -> Result<()> {
    crate::models::check_surah(s.id).map_err(|e| anyhow!(e))?;
    let revelation_type = s.revelation_type.trim().to_ascii_lowercase();
    if revelation_type != "meccan" && revelation_type != "medinan" {
        bail!("revelation_type must be meccan or medinan, got '{}'", s.revelation_type);
    }
    sqlx::query(
        r#"
        INSERT INTO surahs (id, name_ar, name_en, name_transliterated, revelation_type, revelation_order, ayah_count)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name_ar = excluded.name_ar,
            name_en = excluded.name_en,
            name_transliterated = excluded.name_transliterated,
            revelation_type = excluded.revelation_type,
            revelation_order = excluded.revelation_order,
            ayah_count = excluded.ayah_count
        "#,
    )
    .bind(s.id)
    .bind(&s.name_ar)
    .bind(&s.name_en)
    .bind(&s.name_transliterated)
    .bind(revelation_type)
    .bind(s.revelation_order)
    .bind(s.ayah_count)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_verse(tx: &mut Transaction<'_, Sqlite>, v: &VerseRecord) -> Result<()> {
    let key = VerseKey::new(v.surah, v.ayah)?;
    if v.text_uthmani.trim().is_empty() {
        bail!("text_uthmani must not be empty");
    }
    sqlx::query(
        r#"
        INSERT INTO verses (surah_id, ayah_number, verse_key, text_uthmani, text_simple, page, juz)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(verse_key) DO UPDATE SET
            text_uthmani = excluded.text_uthmani,
            text_simple = excluded.text_simple,
            page = excluded.page,
            juz = excluded.juz
        "#,
    )
    .bind(key.surah as i64)
    .bind(key.ayah as i64)
    .bind(key.to_string())
    .bind(&v.text_uthmani)
    .bind(&v.text_simple)
    .bind(v.page)
    .bind(v.juz)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn lookup_ids(tx: &mut Transaction<'_, Sqlite>, sql: &str) -> Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(&mut **tx).await?;
    Ok(rows.into_iter().collect())
}

/// Memoised `verse_key` to `verses.id` lookups inside the import transaction.
#[derive(Default)]
struct VerseIds {
    cache: HashMap<String, i64>,
}

impl VerseIds {
    async fn get(&mut self, tx: &mut Transaction<'_, Sqlite>, raw_key: &str) -> Result<i64> {
        let key: VerseKey = raw_key.parse()?;
        let key = key.to_string();
        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM verses WHERE verse_key = ?")
            .bind(&key)
            .fetch_optional(&mut **tx)
            .await?;
        let id = id.ok_or_else(|| anyhow!("verse {} is not in the database", key))?;
        self.cache.insert(key, id);
        Ok(id)
    }
}

/// A rule row may name a transmitter without its reader; the reader is then
/// inferred. Naming both requires them to match.
fn parse_rule_scope(
    r: &RuleRecord,
) -> Result<(RuleCategory, Option<Reader>, Option<Transmitter>)> {
    let category: RuleCategory = r.category.parse()?;
    match (r.reader.as_deref(), r.transmitter.as_deref()) {
        (None, None) => Ok((category, None, None)),
        (Some(reader), transmitter) => {
            let (reader, transmitter) = parse_reader_pair(reader, transmitter)?;
            Ok((category, Some(reader), transmitter))
        }
        (None, Some(transmitter)) => {
            let t: Transmitter = transmitter.parse()?;
            Ok((category, Some(t.reader()), Some(t)))
        }
    }
}
