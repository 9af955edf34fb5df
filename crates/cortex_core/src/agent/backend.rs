//! Text-generation backends.
//!
//! [`CompletionBackend`] is the transport seam: the tiers only ever see raw
//! response JSON through it, so tests can stand in a scripted backend.
//! [`MistralBackend`] is the production implementation over HTTPS.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::AgentRole;
use crate::error::{CortexError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Structured agent endpoint. Returns the raw response body.
    async fn invoke_agent(&self, agent_id: &str, input: &str, role: AgentRole) -> Result<Value>;

    /// Chat completion endpoint. Returns the raw response body.
    async fn chat_completion(&self, request: &ChatRequest) -> Result<Value>;
}

#[derive(Clone)]
pub struct MistralBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl MistralBackend {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CortexError::Config("MISTRAL_API_KEY is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CortexError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(MistralBackend {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn agent_url(&self, agent_id: &str) -> String {
        format!("{}/agents/{}/invoke", self.base_url, encode_path_segment(agent_id))
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T, what: &str) -> Result<Value> {
        debug!(url = url, "POST {what}");
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CortexError::Network(format!("{what} error: {status} {text}")));
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl CompletionBackend for MistralBackend {
    async fn invoke_agent(&self, agent_id: &str, input: &str, role: AgentRole) -> Result<Value> {
        let payload = json!({ "input": input, "role": role.as_str() });
        self.post_json(&self.agent_url(agent_id), &payload, "agent invoke")
            .await
    }

    async fn chat_completion(&self, request: &ChatRequest) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        self.post_json(&url, request, "chat completion").await
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
