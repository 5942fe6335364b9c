//! Image-generation adapter.
//!
//! [`ImageAdapter`] posts to a `/v1/images/generations` style endpoint and
//! normalizes the response into a serialized descriptor list, so image
//! results travel through the same [`CompletionResponse`] envelope as
//! text.

use super::{post_json, Capability, CompletionRequest, CompletionResponse, ProviderAdapter};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Adapter for image generation services.
#[derive(Debug, Clone)]
pub struct ImageAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl ImageAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Set the API key, sent as `Authorization: Bearer {key}`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn build_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
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

    /// Normalize the provider's image list into descriptor objects.
    fn descriptors(json_resp: &Value) -> Option<Vec<Value>> {
        let data = json_resp.get("data")?.as_array()?;
        let list = data
            .iter()
            .map(|item| {
                json!({
                    "url": item.get("url").cloned().unwrap_or(Value::Null),
                    "b64": item.get("b64_json").cloned().unwrap_or(Value::Null),
                    "revised_prompt": item.get("revised_prompt").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        Some(list)
    }
}

#[async_trait]
impl ProviderAdapter for ImageAdapter {
    async fn complete(
        &self,
        client: &Client,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let url = format!("{}/v1/images/generations", self.base_url);
        let body = Self::build_body(request);
        let (json_resp, _status) = post_json(client, &url, self.api_key.as_deref(), &body).await?;

        let descriptors = Self::descriptors(&json_resp).ok_or_else(|| {
            PipelineError::Other("provider response contained no image data".into())
        })?;

        Ok(CompletionResponse {
            output: serde_json::to_string(&descriptors)?,
            model: request.model.clone(),
            metadata: json_resp.get("created").map(|c| json!({"created": c})),
        })
    }

    fn capability(&self) -> Capability {
        Capability::ImageGeneration
    }

    fn name(&self) -> &'static str {
        "image"
    }
}
