//! Chat completions, plain and streamed.
//!
//! Streaming reads the vendor's SSE body chunk by chunk, splits it into
//! lines and forwards each `data:` delta to an `mpsc` channel as soon as it
//! arrives. A closed channel means the consumer went away; the upstream
//! response is dropped at that point and [`StreamOutcome::Cancelled`] is
//! returned.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{http_client, upstream_error, AiError, AiResult};
use crate::config::AiConfig;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished,
    Cancelled,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

/// One parsed line of a chat SSE body.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

/// Parse one line of the vendor's SSE body.
///
/// Blank lines, comments, other SSE fields and chunks without text are
/// [`StreamLine::Skip`]. `data: [DONE]` ends the stream.
pub fn parse_stream_line(line: &str) -> AiResult<StreamLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(StreamLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| AiError::Decode(format!("bad stream chunk: {}", e)))?;
    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
    {
        Some(text) if !text.is_empty() => Ok(StreamLine::Delta(text)),
        _ => Ok(StreamLine::Skip),
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl ChatClient {
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
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        request
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> AiResult<Completion> {
        tracing::debug!(model = %self.model, messages = messages.len(), "chat completion");

        let response = self
            .request(messages, false)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(upstream_error("chat", response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Decode(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::Decode("chat response has no content".to_string()))?;

        Ok(Completion {
            content,
            usage: parsed.usage.unwrap_or_default(),
        })
    }

    /// Stream a completion, sending `wrap(delta)` for every text delta.
    ///
    /// The overall request timeout does not apply here; a long answer may
    /// take longer than a single completion call.
    pub async fn stream<T, F>(
        &self,
        messages: &[ChatMessage],
        sender: &mpsc::Sender<T>,
        wrap: F,
    ) -> AiResult<StreamOutcome>
    where
        F: Fn(String) -> T,
    {
        tracing::debug!(model = %self.model, messages = messages.len(), "chat stream");

        let mut response = self.request(messages, true).send().await?;
        if !response.status().is_success() {
            return Err(upstream_error("chat", response).await);
        }

        // Bytes, not text: a chunk may end inside a multi-byte character.
        let mut buffer: Vec<u8> = Vec::new();
        let mut deltas = 0usize;

        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);

                match parse_stream_line(&line)? {
                    StreamLine::Delta(text) => {
                        deltas += 1;
                        if sender.send(wrap(text)).await.is_err() {
                            tracing::debug!(deltas, "stream consumer went away");
                            return Ok(StreamOutcome::Cancelled);
                        }
                    }
                    StreamLine::Done => {
                        tracing::debug!(deltas, "chat stream complete");
                        return Ok(StreamOutcome::Finished);
                    }
                    StreamLine::Skip => {}
                }
            }
        }

        // Body ended without a [DONE] marker; flush a trailing line.
        if let StreamLine::Delta(text) = parse_stream_line(&String::from_utf8_lossy(&buffer))? {
            if sender.send(wrap(text)).await.is_err() {
                return Ok(StreamOutcome::Cancelled);
            }
        }
        tracing::debug!(deltas, "chat stream ended without done marker");
        Ok(StreamOutcome::Finished)
    }
}
