//! Terminal output for the lookup commands (`verse`, `search`, `resolve`,
//! `compare`, `stats`).
//!
//! Each `run_*` opens the database read-only, runs the same lookup the
//! HTTP API uses, and prints a plain-text rendering to stdout.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::models::VerseKey;
use crate::quran;
use crate::rules::{self, Resolution};
use crate::tafsir;

pub async fn run_verse(config: &Config, key: &str) -> Result<()> {
    let key: VerseKey = key.parse()?;
    let pool = db::connect_read_only(config).await?;
    let verse = quran::get_verse(&pool, key).await;
    pool.close().await;
    let verse = verse?;

    println!("{}", verse.verse_key);
    println!("  {}", verse.text_uthmani);
    if let Some(simple) = &verse.text_simple {
        println!("  {}", simple);
    }
    match (verse.page, verse.juz) {
        (Some(page), Some(juz)) => println!("  page {}, juz {}", page, juz),
        (Some(page), None) => println!("  page {}", page),
        (None, Some(juz)) => println!("  juz {}", juz),
        (None, None) => {}
    }
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, limit: Option<i64>) -> Result<()> {
    let q = quran::validate_query(query, config.search.min_query_chars)?;
    let limit = quran::clamp_limit(limit, config.search.default_limit, config.search.max_limit);

    let pool = db::connect_read_only(config).await?;
    let results = quran::search_verses(&pool, &q, limit).await;
    pool.close().await;
    let results = results?;

    if results.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for v in &results.results {
        println!("{:<8} {}  {}", v.verse_key, v.surah_name_ar, v.text_uthmani);
    }
    println!();
    println!("{} result(s)", results.count);
    Ok(())
}

pub async fn run_resolve(
    config: &Config,
    category: &str,
    reader: &str,
    transmitter: Option<&str>,
) -> Result<()> {
    let (category, reader, transmitter) = rules::parse_request(category, reader, transmitter)?;

    let pool = db::connect_read_only(config).await?;
    let resolution = rules::resolve(&pool, category, reader, transmitter).await;
    pool.close().await;

    let who = match transmitter {
        Some(t) => format!("{} / {}", reader.slug(), t.slug()),
        None => reader.slug().to_string(),
    };

    match resolution? {
        Resolution::Found { rule, level } => {
            println!("{} for {}: {}", category, who, rule.value);
            println!("  level:   {:?}", level);
            if !rule.methods.is_empty() {
                println!("  methods: {}", rule.methods.join(", "));
            }
            if let Some(description) = &rule.description {
                println!("  {}", description);
            }
        }
        Resolution::NotDefined => {
            println!("{} for {}: not defined", category, who);
        }
    }
    Ok(())
}

pub async fn run_compare(config: &Config, key: &str, sources: Option<&str>) -> Result<()> {
    let key: VerseKey = key.parse()?;
    let requested = tafsir::split_source_list(sources);

    let pool = db::connect_read_only(config).await?;
    let comparison = tafsir::compare(&pool, key, &requested).await;
    pool.close().await;
    let comparison = comparison?;

    println!("{}  {}", comparison.verse_key, comparison.verse_text);
    for item in &comparison.items {
        println!();
        println!(
            "[{}] {} ({})",
            item.source.slug, item.source.name_ar, item.source.author_ar
        );
        match &item.entry {
            Some(entry) => println!("{}", entry.text),
            None => println!("(no entry)"),
        }
    }
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_read_only(config).await?;
    let stats = quran::corpus_stats(&pool).await;
    pool.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Corpus stats");
    println!("============");
    println!();
    println!("  Database:        {}", config.db.path.display());
    println!("  Size:            {} bytes", db_size);
    println!();
    println!("  Surahs:          {}", stats.surahs);
    println!("  Verses:          {}", stats.verses);
    println!(
        "  Tafsir:          {} entries in {} books",
        stats.tafsir_entries, stats.tafsir_books
    );
    println!("  Readers:         {} ({} transmitters)", stats.qurra, stats.ruwat);
    println!("  Rules:           {}", stats.qiraat_rules);
    println!(
        "  Variants:        {} ({} readings)",
        stats.qiraat_variants, stats.qiraat_readings
    );
    println!(
        "  Riwayat:         {} ({} texts, {} differences)",
        stats.riwayat, stats.riwaya_texts, stats.riwaya_differences
    );
    println!("  Asbab records:   {}", stats.asbab_records);
    println!(
        "  Last import:     {}",
        stats.last_import.as_deref().unwrap_or("never")
    );
    Ok(())
}
