//! Schema creation and reference-data seeding.
//!
//! Every statement is `IF NOT EXISTS` and the seed uses upserts, so
//! `uloom init` can be run any number of times against the same file.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::seed;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate(&pool).await?;
    seed::seed_reference_data(&pool).await?;
    pool.close().await;
    Ok(())
}

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS surahs (
        id INTEGER PRIMARY KEY CHECK (id BETWEEN 1 AND 114),
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        name_transliterated TEXT NOT NULL,
        revelation_type TEXT NOT NULL CHECK (revelation_type IN ('meccan', 'medinan')),
        revelation_order INTEGER,
        ayah_count INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS verses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        surah_id INTEGER NOT NULL,
        ayah_number INTEGER NOT NULL CHECK (ayah_number >= 1),
        verse_key TEXT NOT NULL UNIQUE,
        text_uthmani TEXT NOT NULL,
        text_simple TEXT,
        page INTEGER,
        juz INTEGER,
        UNIQUE(surah_id, ayah_number),
        FOREIGN KEY (surah_id) REFERENCES surahs(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qurra (
        id INTEGER PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        death_year_ah INTEGER,
        city TEXT,
        rank INTEGER NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ruwat (
        id INTEGER PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        qari_id INTEGER NOT NULL,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        is_primary INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (qari_id) REFERENCES qurra(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qiraat_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category TEXT NOT NULL,
        qari_id INTEGER,
        rawi_id INTEGER,
        value TEXT NOT NULL,
        methods_json TEXT NOT NULL DEFAULT '[]',
        description TEXT,
        CHECK (rawi_id IS NULL OR qari_id IS NOT NULL),
        FOREIGN KEY (qari_id) REFERENCES qurra(id),
        FOREIGN KEY (rawi_id) REFERENCES ruwat(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qiraat_variants (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        verse_id INTEGER NOT NULL,
        word_position INTEGER,
        word_text TEXT NOT NULL,
        variant_type TEXT NOT NULL CHECK (variant_type IN ('farsh', 'usul')),
        description TEXT,
        bundle_hash TEXT,
        FOREIGN KEY (verse_id) REFERENCES verses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS qiraat_readings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        variant_id INTEGER NOT NULL,
        qari_id INTEGER NOT NULL,
        rawi_id INTEGER,
        reading_text TEXT NOT NULL,
        phonetic TEXT,
        FOREIGN KEY (variant_id) REFERENCES qiraat_variants(id),
        FOREIGN KEY (qari_id) REFERENCES qurra(id),
        FOREIGN KEY (rawi_id) REFERENCES ruwat(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS riwayat (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        qari_id INTEGER NOT NULL,
        rawi_id INTEGER NOT NULL,
        FOREIGN KEY (qari_id) REFERENCES qurra(id),
        FOREIGN KEY (rawi_id) REFERENCES ruwat(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS riwaya_texts (
        riwaya_id INTEGER NOT NULL,
        surah_id INTEGER NOT NULL,
        ayah_number INTEGER NOT NULL,
        text TEXT NOT NULL,
        PRIMARY KEY (riwaya_id, surah_id, ayah_number),
        FOREIGN KEY (riwaya_id) REFERENCES riwayat(id),
        FOREIGN KEY (surah_id) REFERENCES surahs(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS riwaya_differences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        surah_id INTEGER NOT NULL,
        ayah_number INTEGER NOT NULL,
        word_position INTEGER,
        word_text TEXT,
        difference_type TEXT NOT NULL,
        description TEXT,
        bundle_hash TEXT,
        FOREIGN KEY (surah_id) REFERENCES surahs(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS riwaya_difference_readings (
        difference_id INTEGER NOT NULL,
        riwaya_id INTEGER NOT NULL,
        reading_text TEXT NOT NULL,
        PRIMARY KEY (difference_id, riwaya_id),
        FOREIGN KEY (difference_id) REFERENCES riwaya_differences(id),
        FOREIGN KEY (riwaya_id) REFERENCES riwayat(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tafsir_books (
        id INTEGER PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        author_ar TEXT NOT NULL,
        author_en TEXT NOT NULL,
        death_year_ah INTEGER,
        methodology TEXT,
        priority_rank INTEGER NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tafsir_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tafsir_id INTEGER NOT NULL,
        verse_id INTEGER NOT NULL,
        text TEXT NOT NULL,
        UNIQUE(tafsir_id, verse_id),
        FOREIGN KEY (tafsir_id) REFERENCES tafsir_books(id),
        FOREIGN KEY (verse_id) REFERENCES verses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS asbab_sources (
        id INTEGER PRIMARY KEY,
        name_ar TEXT NOT NULL,
        name_en TEXT,
        author_ar TEXT,
        author_en TEXT,
        death_year_ah INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS asbab_nuzul (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        verse_id INTEGER NOT NULL,
        source_id INTEGER,
        text_ar TEXT NOT NULL,
        isnad TEXT,
        authenticity TEXT,
        revelation_period TEXT,
        bundle_hash TEXT,
        FOREIGN KEY (verse_id) REFERENCES verses(id),
        FOREIGN KEY (source_id) REFERENCES asbab_sources(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audio_reciters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        riwaya_code TEXT NOT NULL,
        name_ar TEXT NOT NULL,
        name_en TEXT NOT NULL,
        base_url TEXT NOT NULL,
        path TEXT NOT NULL,
        has_verse_audio INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS imports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bundle_hash TEXT NOT NULL UNIQUE,
        file_name TEXT NOT NULL,
        imported_at INTEGER NOT NULL,
        row_count INTEGER NOT NULL
    )
    "#,
];

const INDEXES: &[&str] = &[
    // One rule row per (category, reader, transmitter) with NULL folded to 0.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_rules_scope ON qiraat_rules(category, IFNULL(qari_id, 0), IFNULL(rawi_id, 0))",
    "CREATE INDEX IF NOT EXISTS idx_verses_surah ON verses(surah_id, ayah_number)",
    "CREATE INDEX IF NOT EXISTS idx_ruwat_qari ON ruwat(qari_id)",
    "CREATE INDEX IF NOT EXISTS idx_variants_verse ON qiraat_variants(verse_id)",
    "CREATE INDEX IF NOT EXISTS idx_readings_variant ON qiraat_readings(variant_id)",
    "CREATE INDEX IF NOT EXISTS idx_differences_ayah ON riwaya_differences(surah_id, ayah_number)",
    "CREATE INDEX IF NOT EXISTS idx_tafsir_entries_verse ON tafsir_entries(verse_id)",
    "CREATE INDEX IF NOT EXISTS idx_asbab_verse ON asbab_nuzul(verse_id)",
    // Rows without a natural key are owned by the bundle that wrote them.
    "CREATE INDEX IF NOT EXISTS idx_variants_bundle ON qiraat_variants(bundle_hash)",
    "CREATE INDEX IF NOT EXISTS idx_differences_bundle ON riwaya_differences(bundle_hash)",
    "CREATE INDEX IF NOT EXISTS idx_asbab_bundle ON asbab_nuzul(bundle_hash)",
];

const TRIGGERS: &[&str] = &[
    r#"
    CREATE TRIGGER IF NOT EXISTS trg_rules_rawi_reader
    BEFORE INSERT ON qiraat_rules
    WHEN NEW.rawi_id IS NOT NULL
        AND NEW.qari_id IS NOT (SELECT qari_id FROM ruwat WHERE id = NEW.rawi_id)
    BEGIN
        SELECT RAISE(ABORT, 'rule transmitter does not belong to the rule reader');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS trg_readings_rawi_reader
    BEFORE INSERT ON qiraat_readings
    WHEN NEW.rawi_id IS NOT NULL
        AND NEW.qari_id IS NOT (SELECT qari_id FROM ruwat WHERE id = NEW.rawi_id)
    BEGIN
        SELECT RAISE(ABORT, 'reading transmitter does not belong to the reading reader');
    END
    "#,
];

/// Create all tables, indexes and triggers on an open pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for ddl in TABLES.iter().chain(INDEXES).chain(TRIGGERS) {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(
        tables = TABLES.len(),
        indexes = INDEXES.len(),
        "schema ready"
    );
    Ok(())
}

/// In-memory database with schema and reference data, for unit tests.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    seed::seed_reference_data(&pool).await.unwrap();
    pool
}
