//! Qdrant REST client: similarity search and collection metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::{http_client, upstream_error, AiError, AiResult};
use crate::config::QdrantConfig;

/// An exact-match condition on a payload field.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub key: &'static str,
    pub value: Value,
}

impl FieldMatch {
    pub fn new(key: &'static str, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ScoredPoint {
    /// A string payload field, or `""` when absent.
    pub fn text(&self, key: &str) -> &str {
        self.payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn verse_key(&self) -> Option<&str> {
        self.payload
            .get("verse_key")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub points_count: Option<u64>,
    #[serde(default)]
    pub vectors_count: Option<u64>,
}

impl CollectionInfo {
    pub fn vectors(&self) -> u64 {
        self.vectors_count.or(self.points_count).unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionList {
    #[serde(default)]
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

/// Request body for `points/search`.
pub fn search_body(
    vector: &[f32],
    limit: usize,
    score_threshold: Option<f32>,
    filter: &[FieldMatch],
) -> Value {
    let mut body = serde_json::json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(threshold) = score_threshold {
        body["score_threshold"] = serde_json::json!(threshold);
    }
    if !filter.is_empty() {
        let must: Vec<Value> = filter
            .iter()
            .map(|m| serde_json::json!({ "key": m.key, "match": { "value": m.value } }))
            .collect();
        body["filter"] = serde_json::json!({ "must": must });
    }
    body
}

pub struct VectorStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    score_threshold: Option<f32>,
}

impl VectorStore {
    pub fn new(config: &QdrantConfig) -> AiResult<Self> {
        let base_url = config
            .url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or(AiError::NotConfigured("vector store"))?;

        Ok(Self {
            http: http_client()?,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
            score_threshold: Some(config.score_threshold).filter(|t| *t > 0.0),
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(self.http.get(format!("{}{}", self.base_url, path)))
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: &[FieldMatch],
    ) -> AiResult<Vec<ScoredPoint>> {
        let body = search_body(vector, limit, self.score_threshold, filter);
        let response = self
            .with_key(self.http.post(format!(
                "{}/collections/{}/points/search",
                self.base_url, collection
            )))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("qdrant", response).await);
        }

        let parsed: Envelope<Vec<ScoredPoint>> = response
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;
        tracing::debug!(collection, hits = parsed.result.len(), "vector search");
        Ok(parsed.result)
    }

    pub async fn list_collections(&self) -> AiResult<Vec<String>> {
        let response = self.get("/collections").send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("qdrant", response).await);
        }
        let parsed: Envelope<CollectionList> = response
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;
        Ok(parsed.result.collections.into_iter().map(|c| c.name).collect())
    }

    pub async fn collection_info(&self, name: &str) -> AiResult<CollectionInfo> {
        let response = self.get(&format!("/collections/{}", name)).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("qdrant", response).await);
        }
        let parsed: Envelope<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;
        Ok(parsed.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_without_filter() {
        let body = search_body(&[0.1, 0.2], 5, None, &[]);
        assert_eq!(body["limit"], 5);
        assert_eq!(body["with_payload"], true);
        assert!(body.get("filter").is_none());
        assert!(body.get("score_threshold").is_none());
    }

    #[test]
    fn filter_becomes_must_clauses() {
        let body = search_body(
            &[0.0],
            3,
            Some(0.5),
            &[FieldMatch::new("surah_id", 2), FieldMatch::new("verse_key", "2:255")],
        );
        assert_eq!(body["score_threshold"], 0.5);
        let must = body["filter"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[0]["key"], "surah_id");
        assert_eq!(must[0]["match"]["value"], 2);
        assert_eq!(must[1]["match"]["value"], "2:255");
    }

    #[test]
    fn payload_accessors_tolerate_missing_fields() {
        let point: ScoredPoint =
            serde_json::from_value(serde_json::json!({"id": 7, "score": 0.9})).unwrap();
        assert_eq!(point.text("text_ar"), "");
        assert_eq!(point.verse_key(), None);
    }
}
