//! Provider adapters and normalized request/response types.
//!
//! The [`ProviderAdapter`] trait abstracts over external completion and
//! generation services, translating between the normalized
//! [`CompletionRequest`]/[`CompletionResponse`] types and each service's
//! HTTP API.
//!
//! ```text
//! ExecutionEngine ──► CompletionRequest ──► ProviderAdapter::complete() ──► CompletionResponse
//!                                               │
//!                                  ┌────────────┼────────────┐
//!                             TextAdapter   ImageAdapter   MockAdapter
//! ```

pub mod image;
pub mod mock;
pub mod router;
pub mod text;

pub use image::ImageAdapter;
pub use mock::MockAdapter;
pub use router::{ProviderRouter, RouterConfig};
pub use text::TextAdapter;

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The class of service a model belongs to. Determines which adapter
/// shape handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    TextCompletion,
    ImageGeneration,
}

impl Capability {
    /// Stable name for logs and result envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::TextCompletion => "text",
            Capability::ImageGeneration => "image",
        }
    }
}

/// Generation parameters shared across adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Temperature (0.0 = deterministic).
    pub temperature: f64,
    /// Maximum tokens to generate (text family).
    pub max_tokens: u32,
    /// Provider-specific extras merged into the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            extra: None,
        }
    }
}

impl GenerationParams {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }
}

/// A single message in a chat-style conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A normalized request -- provider-agnostic.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier (e.g. `"gpt-4o"`, `"sdxl"`).
    pub model: String,

    /// The resolved prompt text.
    pub prompt: String,

    /// Optional system prompt (text family).
    pub system_prompt: Option<String>,

    /// Prior conversation history. Empty for single-shot calls.
    pub messages: Vec<ChatMessage>,

    /// Generation parameters.
    pub params: GenerationParams,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            messages: Vec::new(),
            params: GenerationParams::default(),
        }
    }
}

/// A normalized response.
///
/// Text adapters put prose in `output`; image adapters put a JSON
/// descriptor list (serialized) there, so every adapter produces the same
/// envelope shape.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated content.
    pub output: String,

    /// Model that actually served the request.
    pub model: String,

    /// Provider-specific metadata (token counts, timing). Raw JSON --
    /// each provider returns different fields.
    pub metadata: Option<Value>,
}

/// Abstraction over external completion/generation services.
///
/// Object-safe; designed to be held as `Arc<dyn ProviderAdapter>` and
/// shared across concurrent executions.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Execute one request. One call is one attempt -- retry lives in the
    /// execution engine, not the adapter.
    async fn complete(&self, client: &Client, request: &CompletionRequest)
        -> Result<CompletionResponse>;

    /// Which capability family this adapter serves.
    fn capability(&self) -> Capability;

    /// Human-readable name for logging and result envelopes.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value as integer seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<std::time::Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(std::time::Duration::from_secs)
}

/// POST a JSON body and parse the JSON response, mapping non-success
/// statuses to [`PipelineError::Http`] with any `Retry-After` hint.
pub(crate) async fn post_json(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<(Value, u16)> {
    let mut builder = client.post(url).json(body);
    if let Some(key) = api_key {
        builder = builder.bearer_auth(key);
    }

    let resp = builder.send().await?;

    let status = resp.status().as_u16();

    if !resp.status().is_success() {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = resp.text().await.unwrap_or_default();
        return Err(PipelineError::Http {
            status,
            body: text,
            retry_after,
        });
    }

    let json_resp: Value = resp.json().await?;
    Ok((json_resp, status))
}
