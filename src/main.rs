//! # Uloom CLI (`uloom`)
//!
//! ## Usage
//!
//! ```bash
//! uloom --config ./config/uloom.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `uloom init` | Create the schema and seed reference data |
//! | `uloom import <bundle.json>` | Import a corpus bundle in one transaction |
//! | `uloom serve` | Start the HTTP API |
//! | `uloom verse <key>` | Print one verse |
//! | `uloom search "<query>"` | Keyword search over verse text |
//! | `uloom resolve <category> <reader>` | Resolve a recitation rule |
//! | `uloom compare <key>` | Print tafsir entries for a verse side by side |
//! | `uloom stats` | Corpus statistics |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use uloom_quran::{commands, config, import, migrate, server};

#[derive(Parser)]
#[command(
    name = "uloom",
    about = "Quran, tafsir and qiraat reference service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file means built-in defaults. Environment variables
    /// (`ULOOM_DB_PATH`, `PORT`, `AI_BASE_URL`, ...) override the file.
    #[arg(long, global = true, default_value = "./config/uloom.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and seed reference data.
    ///
    /// Safe to run repeatedly.
    Init,

    /// Import a JSON corpus bundle.
    ///
    /// The bundle is written in a single transaction; any invalid record
    /// aborts the whole import. A bundle already imported is skipped.
    Import {
        /// Path to the bundle file.
        bundle: PathBuf,

        /// Import even if this exact bundle was imported before.
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP API server.
    Serve,

    /// Print one verse by key (`surah:ayah`).
    Verse { key: String },

    /// Keyword search over the Uthmani and simplified verse texts.
    Search {
        query: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Resolve a recitation rule for a reader and optional transmitter.
    Resolve {
        /// Rule category, e.g. `between_surahs` or `madd_munfasil`.
        category: String,

        /// Reader slug or id, e.g. `nafi`.
        reader: String,

        /// Transmitter slug or id, e.g. `warsh`.
        #[arg(long)]
        transmitter: Option<String>,
    },

    /// Compare tafsir entries on one verse.
    Compare {
        key: String,

        /// Comma-separated source slugs (default: all, in priority order).
        #[arg(long)]
        sources: Option<String>,
    },

    /// Show corpus statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { bundle, force } => {
            import::run_import(&cfg, &bundle, force).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Verse { key } => {
            commands::run_verse(&cfg, &key).await?;
        }
        Commands::Search { query, limit } => {
            commands::run_search(&cfg, &query, limit).await?;
        }
        Commands::Resolve {
            category,
            reader,
            transmitter,
        } => {
            commands::run_resolve(&cfg, &category, &reader, transmitter.as_deref()).await?;
        }
        Commands::Compare { key, sources } => {
            commands::run_compare(&cfg, &key, sources.as_deref()).await?;
        }
        Commands::Stats => {
            commands::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
