//! Mock adapter for deterministic, network-free execution.
//!
//! [`MockAdapter`] fabricates a structurally valid [`CompletionResponse`]
//! for its capability family without any network call. Callers cannot
//! distinguish mock from real execution except via the adapter name
//! (`"mock"`) surfaced in result envelopes.

use super::{Capability, CompletionRequest, CompletionResponse, ProviderAdapter};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A deterministic stub adapter, one per capability family.
///
/// Text requests get prose echoing the prompt head; image requests get a
/// single-descriptor JSON list. Optional scripted responses are returned
/// in order, cycling when exhausted.
#[derive(Debug)]
pub struct MockAdapter {
    capability: Capability,
    scripted: Vec<String>,
    index: AtomicUsize,
}

impl MockAdapter {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            scripted: Vec::new(),
            index: AtomicUsize::new(0),
        }
    }

    /// Return these responses in order instead of fabricating output.
    /// Cycles from the beginning when exhausted.
    pub fn with_responses(mut self, responses: Vec<String>) -> Self {
        self.scripted = responses;
        self
    }

    fn fabricate(&self, request: &CompletionRequest) -> String {
        if !self.scripted.is_empty() {
            let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.scripted.len();
            return self.scripted[idx].clone();
        }

        match self.capability {
            Capability::TextCompletion => {
                let head: String = request.prompt.chars().take(80).collect();
                format!(
                    "[mock:{}] Generated response for: {}",
                    request.model, head
                )
            }
            Capability::ImageGeneration => json!([{
                "url": format!("https://mock.invalid/{}.png", request.model),
                "b64": null,
                "revised_prompt": request.prompt,
            }])
            .to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    async fn complete(
        &self,
        _client: &Client,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            output: self.fabricate(request),
            model: request.model.clone(),
            metadata: Some(json!({"mock": true})),
        })
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_text_embeds_prompt() {
        let mock = MockAdapter::new(Capability::TextCompletion);
        let client = Client::new();
        let request = CompletionRequest::new("gpt-4o", "Write a scene outline");
        let resp = mock.complete(&client, &request).await.unwrap();
        assert!(resp.output.contains("Write a scene outline"));
        assert!(resp.output.contains("mock:gpt-4o"));
        assert_eq!(resp.model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_mock_image_returns_descriptor_list() {
        let mock = MockAdapter::new(Capability::ImageGeneration);
        let client = Client::new();
        let request = CompletionRequest::new("sdxl", "A lighthouse at dusk");
        let resp = mock.complete(&client, &request).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&resp.output).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["revised_prompt"], "A lighthouse at dusk");
    }

    #[tokio::test]
    async fn test_mock_scripted_responses_cycle() {
        let mock = MockAdapter::new(Capability::TextCompletion)
            .with_responses(vec!["first".into(), "second".into()]);
        let client = Client::new();
        let request = CompletionRequest::new("m", "p");
        let r1 = mock.complete(&client, &request).await.unwrap();
        let r2 = mock.complete(&client, &request).await.unwrap();
        let r3 = mock.complete(&client, &request).await.unwrap();
        assert_eq!(r1.output, "first");
        assert_eq!(r2.output, "second");
        assert_eq!(r3.output, "first");
    }

    #[tokio::test]
    async fn test_mock_is_deterministic_for_same_prompt() {
        let mock = MockAdapter::new(Capability::TextCompletion);
        let client = Client::new();
        let request = CompletionRequest::new("m", "same prompt");
        let a = mock.complete(&client, &request).await.unwrap();
        let b = mock.complete(&client, &request).await.unwrap();
        assert_eq!(a.output, b.output);
    }

    #[test]
    fn test_mock_name() {
        assert_eq!(MockAdapter::new(Capability::TextCompletion).name(), "mock");
    }
}
