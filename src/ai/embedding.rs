//! Text embeddings through an OpenAI-compatible `/embeddings` endpoint.

use serde_json::Value;
use std::time::Duration;

use super::{http_client, upstream_error, AiError, AiResult};
use crate::config::AiConfig;

/// Inputs longer than this many characters are cut before embedding.
pub const MAX_INPUT_CHARS: usize = 8000;

/// Collapse runs of whitespace and cut to [`MAX_INPUT_CHARS`].
///
/// Empty or whitespace-only text is rejected.
pub fn prepare_text(text: &str) -> AiResult<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(AiError::InvalidInput(
            "text to embed must not be empty".to_string(),
        ));
    }
    if collapsed.chars().count() > MAX_INPUT_CHARS {
        return Ok(collapsed.chars().take(MAX_INPUT_CHARS).collect());
    }
    Ok(collapsed)
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(config: &AiConfig) -> AiResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or(AiError::NotConfigured("AI provider"))?;

        Ok(Self {
            http: http_client()?,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: config.embedding_model.clone(),
            dims: config.embedding_dims,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed one text.
    pub async fn embed(&self, text: &str) -> AiResult<Vec<f32>> {
        let input = prepare_text(text)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": [input],
        });

        let mut request = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .timeout(self.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("embeddings", response).await);
        }

        let json: Value = response.json().await?;
        let mut vectors = parse_embedding_response(&json)?;
        let vector = vectors
            .pop()
            .ok_or_else(|| AiError::Decode("embedding response has no data".to_string()))?;

        if vector.len() != self.dims {
            tracing::debug!(
                expected = self.dims,
                got = vector.len(),
                "embedding dimension differs from config"
            );
        }
        Ok(vector)
    }
}

/// Extract `data[].embedding` in `index` order.
fn parse_embedding_response(json: &Value) -> AiResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| AiError::Decode("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| AiError::Decode("missing embedding".to_string()))?;

        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| AiError::Decode("non-numeric embedding value".to_string()))
            })
            .collect::<AiResult<Vec<f32>>>()?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(position as u64);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(
            prepare_text("  الحمد \n\t لله  ").unwrap(),
            "الحمد لله"
        );
        assert!(matches!(prepare_text(" \n "), Err(AiError::InvalidInput(_))));
    }

    #[test]
    fn long_input_is_cut_by_characters() {
        let long = "ب".repeat(MAX_INPUT_CHARS + 10);
        assert_eq!(prepare_text(&long).unwrap().chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn response_is_ordered_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_embedding_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn malformed_response_is_a_decode_error() {
        let json = serde_json::json!({"object": "list"});
        assert!(matches!(
            parse_embedding_response(&json),
            Err(AiError::Decode(_))
        ));
    }
}
