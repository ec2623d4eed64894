use anyhow::{bail, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

/// Writable pool used by `init` and `import`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Read-only pool used by the HTTP server and the lookup commands.
///
/// The corpus never changes at request time, so the file is opened
/// `mode=ro&immutable=1` and a missing database is an error rather than
/// an empty file.
pub async fn connect_read_only(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if !db_path.exists() {
        bail!(
            "Database not found: {}\nRun `uloom init` and `uloom import <bundle>` first.",
            db_path.display()
        );
    }

    let url = format!("sqlite://{}?mode=ro&immutable=1", db_path.display());
    let options = SqliteConnectOptions::from_str(&url)?.read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("Failed to open database in read-only mode")?;

    Ok(pool)
}
