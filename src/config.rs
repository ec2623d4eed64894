//! TOML configuration with environment overrides.
//!
//! Every section has defaults, so an absent file yields a usable
//! configuration pointing at `./data/uloom.sqlite` with the AI layer
//! disabled. After the file is parsed, the deployment environment can
//! override the handful of values that usually differ per host:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ULOOM_DB_PATH` | `db.path` |
//! | `PORT` | port part of `server.bind` |
//! | `AI_BASE_URL` | `ai.base_url` |
//! | `AI_API_KEY` | `ai.api_key` |
//! | `AI_CHAT_MODEL` | `ai.chat_model` |
//! | `AI_EMBEDDING_MODEL` | `ai.embedding_model` |
//! | `QDRANT_URL` | `qdrant.url` |
//! | `QDRANT_API_KEY` | `qdrant.api_key` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/uloom.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Keyword search limits for verse and asbab text search.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: i64,
    pub max_limit: i64,
    pub min_query_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 100,
            min_query_chars: 2,
        }
    }
}

/// OpenAI-compatible embedding and chat endpoint.
///
/// The AI layer is enabled only when `base_url` is set.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dims: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dims: 1536,
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.base_url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QdrantConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub default_limit: usize,
    pub score_threshold: f32,
    pub collections: CollectionsConfig,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 30,
            default_limit: 10,
            score_threshold: 0.7,
            collections: CollectionsConfig::default(),
        }
    }
}

impl QdrantConfig {
    pub fn is_enabled(&self) -> bool {
        self.url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollectionsConfig {
    pub verses: String,
    pub tafsir: String,
    pub qiraat: String,
    pub asbab: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            verses: "quran_verses".to_string(),
            tafsir: "tafsir_texts".to_string(),
            qiraat: "qiraat_differences".to_string(),
            asbab: "asbab_nuzul".to_string(),
        }
    }
}

/// Retrieval sizes and context budget for question answering.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RagConfig {
    pub top_k_verses: usize,
    pub top_k_tafsir: usize,
    pub top_k_qiraat: usize,
    /// Maximum characters of retrieved context sent to the chat model.
    pub max_context_length: usize,
    pub include_disclaimer: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k_verses: 5,
            top_k_tafsir: 3,
            top_k_qiraat: 5,
            max_context_length: 8000,
            include_disclaimer: true,
        }
    }
}

/// Load configuration from `path`, then apply environment overrides.
///
/// A missing file is not an error: defaults are used. A file that exists
/// but does not parse is.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Apply overrides from a variable lookup (normally the process environment).
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = get("ULOOM_DB_PATH") {
        config.db.path = PathBuf::from(path);
    }
    if let Some(port) = get("PORT") {
        let host = config
            .server
            .bind
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.bind = format!("{}:{}", host, port.trim());
    }
    if let Some(url) = get("AI_BASE_URL") {
        config.ai.base_url = Some(url);
    }
    if let Some(key) = get("AI_API_KEY") {
        config.ai.api_key = Some(key);
    }
    if let Some(model) = get("AI_CHAT_MODEL") {
        config.ai.chat_model = model;
    }
    if let Some(model) = get("AI_EMBEDDING_MODEL") {
        config.ai.embedding_model = model;
    }
    if let Some(url) = get("QDRANT_URL") {
        config.qdrant.url = Some(url);
    }
    if let Some(key) = get("QDRANT_API_KEY") {
        config.qdrant.api_key = Some(key);
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.rag.max_context_length == 0 {
        bail!("rag.max_context_length must be > 0");
    }
    if !(0.0..=2.0).contains(&config.ai.temperature) {
        bail!(
            "ai.temperature must be in [0.0, 2.0], got {}",
            config.ai.temperature
        );
    }
    if config.search.default_limit < 1 || config.search.max_limit < 1 {
        bail!("search limits must be >= 1");
    }
    if config.search.default_limit > config.search.max_limit {
        bail!("search.default_limit must not exceed search.max_limit");
    }
    if config.qdrant.default_limit == 0 {
        bail!("qdrant.default_limit must be >= 1");
    }
    if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
        bail!("server.bind is not a socket address: {}", config.server.bind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config(Path::new("/nonexistent/uloom.toml")).unwrap();
        assert_eq!(cfg.search.default_limit, 50);
        assert_eq!(cfg.rag.top_k_verses, 5);
        assert_eq!(cfg.rag.top_k_tafsir, 3);
        assert_eq!(cfg.qdrant.collections.verses, "quran_verses");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [db]
            path = "/tmp/q.sqlite"

            [rag]
            top_k_verses = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("/tmp/q.sqlite"));
        assert_eq!(cfg.rag.top_k_verses, 8);
        assert_eq!(cfg.rag.max_context_length, 8000);
        assert!(!cfg.ai.is_enabled());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("ULOOM_DB_PATH", "/srv/uloom.sqlite"),
                ("PORT", "9090"),
                ("AI_BASE_URL", "http://llm.local/v1"),
                ("AI_CHAT_MODEL", "qwen2.5"),
                ("QDRANT_URL", "http://qdrant:6333"),
            ]),
        );
        assert_eq!(cfg.db.path, PathBuf::from("/srv/uloom.sqlite"));
        assert_eq!(cfg.server.bind, "127.0.0.1:9090");
        assert!(cfg.ai.is_enabled());
        assert_eq!(cfg.ai.chat_model, "qwen2.5");
        assert_eq!(cfg.ai.embedding_model, "text-embedding-3-small");
        assert!(cfg.qdrant.is_enabled());
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg, env(&[("AI_BASE_URL", "  ")]));
        assert!(!cfg.ai.is_enabled());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.rag.max_context_length = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.ai.temperature = 3.5;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.search.default_limit = 500;
        assert!(validate(&cfg).is_err());

        assert!(validate(&Config::default()).is_ok());
    }
}
