//! The execution engine: interpolate, route, call, retry, report.
//!
//! [`ExecutionEngine::execute`] is the single entry point for running one
//! template against one model. It NEVER returns `Err` -- every outcome,
//! including interpolation failures and exhausted retries, is folded into
//! an [`ExecutionResult`] envelope so callers and stored pipeline state
//! share one shape.

use crate::backoff::BackoffConfig;
use crate::error::PipelineError;
use crate::interpolator::{interpolate, validate_template};
use crate::provider::{Capability, CompletionRequest, GenerationParams, ProviderRouter};
use crate::resilience::{is_retryable_error, FailureKind};
use crate::template::{PromptTemplate, VariableContext};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Typed metrics for one execution. Provider-specific oddities go in
/// `extra` instead of loosening the named fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Wall-clock latency of the winning (or last) attempt.
    pub latency_ms: u64,

    /// Retries consumed. 0 when the first attempt succeeded.
    pub retry_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,

    /// Estimated cost in USD, when the provider reports enough to compute it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    /// Anything provider-specific that has no named field.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

/// Immutable record of one execution, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Generated output. Empty on error.
    pub output: String,

    pub status: ExecutionStatus,

    /// Human-readable failure description. `None` on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Total wall-clock time including retries and backoff waits.
    pub execution_time_ms: u64,

    /// Adapter that served the request, or `"none"` / `"mock"`.
    pub provider_used: String,

    /// Model the request was routed for.
    pub model: String,

    pub metrics: ExecutionMetrics,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    fn error(model: &str, provider: &str, message: String, elapsed: Duration) -> Self {
        Self {
            output: String::new(),
            status: ExecutionStatus::Error,
            error_message: Some(message),
            execution_time_ms: elapsed.as_millis() as u64,
            provider_used: provider.to_string(),
            model: model.to_string(),
            metrics: ExecutionMetrics::default(),
        }
    }
}

/// Knobs for one execution. `retry_attempts` counts TOTAL attempts, so
/// the default of 3 means one initial call plus up to two retries.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub retry_attempts: u32,
    pub backoff: BackoffConfig,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    pub params: GenerationParams,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            backoff: BackoffConfig::standard(),
            timeout: Duration::from_secs(60),
            params: GenerationParams::default(),
        }
    }
}

/// Snapshot of engine/router health for status endpoints and CLIs.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub mock_mode: bool,
    pub text_key_configured: bool,
    pub image_key_configured: bool,
    pub available_models: Vec<String>,
}

/// Outcome of one provider-family probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub family: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs templates against routed providers with sequential retries.
pub struct ExecutionEngine {
    router: Arc<ProviderRouter>,
    client: Client,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(router: Arc<ProviderRouter>, config: ExecutionConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self {
            router,
            client,
            config,
        }
    }

    /// Engine over a mock-mode router, for tests and offline development.
    pub fn mocked() -> Self {
        Self::new(Arc::new(ProviderRouter::mocked()), ExecutionConfig::default())
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Execute one template against one model.
    ///
    /// Interpolation failures and routing misses short-circuit without a
    /// provider call. Provider failures are retried sequentially with
    /// backoff, up to `retry_attempts` total attempts; a terminal failure
    /// kind (quota, auth, content filter) stops retrying early. On
    /// exhaustion the last failure's message is reported verbatim.
    pub async fn execute(
        &self,
        template: &PromptTemplate,
        ctx: &VariableContext,
        model: &str,
        config: Option<&ExecutionConfig>,
    ) -> ExecutionResult {
        let config = config.unwrap_or(&self.config);
        let started = Instant::now();

        let interpolation = interpolate(&template.content, ctx);
        if !interpolation.is_ok() {
            let message = format!(
                "Template interpolation failed: {}",
                interpolation.errors.join("; ")
            );
            warn!(template = %template.name, %model, "{message}");
            return ExecutionResult::error(model, "none", message, started.elapsed());
        }

        let Some(adapter) = self.router.provider_for(model) else {
            let message = format!("No provider available for model: {model}");
            return ExecutionResult::error(model, "none", message, started.elapsed());
        };

        let mut request = CompletionRequest::new(model, interpolation.resolved_prompt);
        request.params = config.params.clone();

        let mut last_message = String::new();
        let mut retries: u32 = 0;
        let mut retry_after: Option<Duration> = None;

        for attempt in 0..config.retry_attempts {
            if attempt > 0 {
                // A provider Retry-After hint overrides the computed delay.
                let delay = match retry_after.take() {
                    Some(hint) if config.backoff.respect_retry_after => {
                        hint.min(config.backoff.max_delay)
                    }
                    _ => config.backoff.delay_for_attempt(attempt - 1),
                };
                debug!(%model, attempt, ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
                retries += 1;
            }

            let attempt_started = Instant::now();
            match adapter.complete(&self.client, &request).await {
                Ok(response) => {
                    let latency = attempt_started.elapsed();
                    info!(
                        %model,
                        provider = adapter.name(),
                        latency_ms = latency.as_millis() as u64,
                        retries,
                        "execution succeeded"
                    );
                    let mut metrics = metrics_from_metadata(response.metadata.as_ref());
                    metrics.latency_ms = latency.as_millis() as u64;
                    metrics.retry_count = retries;
                    return ExecutionResult {
                        output: response.output,
                        status: ExecutionStatus::Success,
                        error_message: None,
                        execution_time_ms: started.elapsed().as_millis() as u64,
                        provider_used: adapter.name().to_string(),
                        model: model.to_string(),
                        metrics,
                    };
                }
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    if let PipelineError::Http {
                        retry_after: Some(hint),
                        ..
                    } = &e
                    {
                        retry_after = Some(*hint);
                    }
                    last_message = e.to_string();
                    warn!(
                        %model,
                        provider = adapter.name(),
                        attempt = attempt + 1,
                        kind = ?kind,
                        error = %last_message,
                        "attempt failed"
                    );
                    if !is_retryable_error(&e) {
                        break;
                    }
                    if !status_is_retryable(&e, config) {
                        break;
                    }
                }
            }
        }

        let mut result = ExecutionResult::error(
            model,
            adapter.name(),
            last_message,
            started.elapsed(),
        );
        result.metrics.retry_count = retries;
        result
    }

    /// Router/credential snapshot.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            mock_mode: self.router.is_mock_mode(),
            text_key_configured: self.router.config().text_configured(),
            image_key_configured: self.router.config().image_configured(),
            available_models: self.router.available_models(),
        }
    }

    /// Check a template's tokens against its variable definitions without
    /// executing anything.
    pub fn validate_template(&self, template: &PromptTemplate) -> Vec<String> {
        validate_template(&template.content, &template.variables)
    }

    /// One lightweight probe per configured capability family.
    pub async fn test_providers(&self) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::new();
        for (family, model) in [
            (Capability::TextCompletion, "gpt-4o-mini"),
            (Capability::ImageGeneration, "dall-e-3"),
        ] {
            let Some(adapter) = self.router.provider_for(model) else {
                outcomes.push(ProbeOutcome {
                    family: family.as_str().to_string(),
                    ok: false,
                    error: Some("family not configured".to_string()),
                });
                continue;
            };
            let request = CompletionRequest::new(model, "connectivity probe");
            match adapter.complete(&self.client, &request).await {
                Ok(_) => outcomes.push(ProbeOutcome {
                    family: family.as_str().to_string(),
                    ok: true,
                    error: None,
                }),
                Err(e) => outcomes.push(ProbeOutcome {
                    family: family.as_str().to_string(),
                    ok: false,
                    error: Some(e.to_string()),
                }),
            }
        }
        outcomes
    }
}

/// Pull token counts out of provider metadata when present.
fn metrics_from_metadata(metadata: Option<&Value>) -> ExecutionMetrics {
    let mut metrics = ExecutionMetrics::default();
    let Some(meta) = metadata else {
        return metrics;
    };
    let usage = meta.get("usage").unwrap_or(meta);
    metrics.token_count = usage.get("total_tokens").and_then(Value::as_u64);
    metrics.prompt_tokens = usage.get("prompt_tokens").and_then(Value::as_u64);
    metrics.completion_tokens = usage.get("completion_tokens").and_then(Value::as_u64);
    if let Some(obj) = meta.as_object() {
        for (k, v) in obj {
            if k != "usage" {
                metrics.extra.insert(k.clone(), v.clone());
            }
        }
    }
    metrics
}

/// Non-retryable HTTP statuses stop the loop even when the failure kind
/// is nominally retryable.
fn status_is_retryable(error: &PipelineError, config: &ExecutionConfig) -> bool {
    match error {
        PipelineError::Http { status, .. } => {
            config.backoff.retryable_statuses.contains(status)
        }
        _ => true,
    }
}
