//! Text-completion adapter for chat-completions style HTTP APIs.
//!
//! [`TextAdapter`] translates normalized [`CompletionRequest`]s into a
//! `/v1/chat/completions` call with bearer-key authentication and
//! normalizes the response back into a [`CompletionResponse`].

use super::{
    post_json, Capability, ChatMessage, CompletionRequest, CompletionResponse, ProviderAdapter,
    Role,
};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Adapter for OpenAI-compatible chat completion services.
#[derive(Debug, Clone)]
pub struct TextAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl TextAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            api_key: None,
        }
    }

    /// Set the API key, sent as `Authorization: Bearer {key}`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Build the chat-completions request body.
    fn build_body(request: &CompletionRequest) -> Value {
        let mut messages = Vec::new();

        if let Some(ref sys) = request.system_prompt {
            if !sys.is_empty() {
                messages.push(json!({"role": "system", "content": sys}));
            }
        }

        for msg in &request.messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": msg.content}));
        }

        // When history is present the prompt is already its last user turn.
        if request.messages.is_empty() {
            messages.push(json!({"role": "user", "content": request.prompt}));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
        });

        if let Some(ref extra) = request.params.extra {
            if let (Some(base), Some(custom)) = (body.as_object_mut(), extra.as_object()) {
                for (k, v) in custom {
                    base.insert(k.clone(), v.clone());
                }
            }
        }

        body
    }

    /// Pull usage counters out of the provider response.
    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        if let Some(usage) = json_resp.get("usage") {
            meta.insert("usage".into(), usage.clone());
        }
        if let Some(model) = json_resp.get("model") {
            meta.insert("model".into(), model.clone());
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl ProviderAdapter for TextAdapter {
    async fn complete(
        &self,
        client: &Client,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(request);
        let (json_resp, _status) = post_json(client, &url, self.api_key.as_deref(), &body).await?;

        let output = json_resp
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                PipelineError::Other("provider response contained no message content".into())
            })?;

        let model = json_resp
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(&request.model)
            .to_string();

        Ok(CompletionResponse {
            output,
            model,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn capability(&self) -> Capability {
        Capability::TextCompletion
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Strip known API path suffixes so backends can append their own paths.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    for suffix in &["/v1/chat/completions", "/v1/chat", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
