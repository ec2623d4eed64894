//! Retrieval-augmented answering over an external OpenAI-compatible API and
//! a Qdrant vector store.
//!
//! Nothing here computes embeddings or nearest neighbours locally: text is
//! sent to the provider's `/embeddings` endpoint, the vector is searched in
//! Qdrant, and the hits are turned into prompt context and citations.
//!
//! # Clients
//!
//! | Client | Endpoint |
//! |--------|----------|
//! | [`EmbeddingClient`] | `POST {ai.base_url}/embeddings` |
//! | [`ChatClient`] | `POST {ai.base_url}/chat/completions` (plain and SSE) |
//! | [`VectorStore`] | `POST {qdrant.url}/collections/{name}/points/search` |
//!
//! All three are built once by [`AiServices::from_config`] and shared
//! through the server state. A client whose section is not configured is
//! absent, and every operation that needs it fails with
//! [`AiError::NotConfigured`]. Vendor calls are made once; there is no
//! retry loop.

pub mod chat;
pub mod embedding;
pub mod rag;
pub mod vector;

pub use chat::{ChatClient, ChatMessage, Completion, StreamOutcome, Usage};
pub use embedding::EmbeddingClient;
pub use vector::{FieldMatch, ScoredPoint, VectorStore};

use std::time::Duration;

use crate::config::{CollectionsConfig, Config, RagConfig};
use crate::error::LookupError;

/// Longest vendor error body kept in an [`AiError::Upstream`].
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

pub type AiResult<T> = Result<T, AiError>;

/// Turn a non-success vendor response into [`AiError::Upstream`].
pub(crate) async fn upstream_error(service: &'static str, response: reqwest::Response) -> AiError {
    let status = response.status().as_u16();
    let mut body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    if body.chars().count() > MAX_ERROR_BODY {
        body = body.chars().take(MAX_ERROR_BODY).collect();
    }
    tracing::warn!(service, status, "vendor error: {}", body);
    AiError::Upstream {
        service,
        status,
        body,
    }
}

pub(crate) fn http_client() -> AiResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// The AI clients plus the retrieval settings they are used with.
pub struct AiServices {
    embeddings: Option<EmbeddingClient>,
    chat: Option<ChatClient>,
    vectors: Option<VectorStore>,
    pub rag: RagConfig,
    pub collections: CollectionsConfig,
    pub qdrant_url: Option<String>,
    pub default_limit: usize,
}

impl AiServices {
    pub fn from_config(config: &Config) -> AiResult<Self> {
        let (embeddings, chat) = if config.ai.is_enabled() {
            (
                Some(EmbeddingClient::new(&config.ai)?),
                Some(ChatClient::new(&config.ai)?),
            )
        } else {
            (None, None)
        };

        let vectors = if config.qdrant.is_enabled() {
            Some(VectorStore::new(&config.qdrant)?)
        } else {
            None
        };

        tracing::info!(
            chat = chat.is_some(),
            vectors = vectors.is_some(),
            "ai services configured"
        );

        Ok(Self {
            embeddings,
            chat,
            vectors,
            rag: config.rag.clone(),
            collections: config.qdrant.collections.clone(),
            qdrant_url: config.qdrant.url.clone(),
            default_limit: config.qdrant.default_limit,
        })
    }

    pub fn embeddings(&self) -> AiResult<&EmbeddingClient> {
        self.embeddings
            .as_ref()
            .ok_or(AiError::NotConfigured("AI provider"))
    }

    pub fn chat(&self) -> AiResult<&ChatClient> {
        self.chat.as_ref().ok_or(AiError::NotConfigured("AI provider"))
    }

    pub fn vectors(&self) -> AiResult<&VectorStore> {
        self.vectors
            .as_ref()
            .ok_or(AiError::NotConfigured("vector store"))
    }

    /// Fails unless every client needed for question answering exists.
    pub fn require_all(&self) -> AiResult<()> {
        self.embeddings()?;
        self.chat()?;
        self.vectors()?;
        Ok(())
    }
}
