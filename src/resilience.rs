//! Failure classification, per-service circuit breakers, and the
//! prioritized fallback chain.
//!
//! [`ResilientChain`] is used when the caller wants automatic escalation
//! across a prioritized list of equivalent services rather than a single
//! fixed model. Each service carries its own [`CircuitBreaker`]; a service
//! whose circuit is open is skipped without an attempt. When every service
//! is exhausted the chain synthesizes a context-aware fallback envelope --
//! it never returns an error to its caller.

use crate::error::PipelineError;
use crate::provider::{ChatMessage, CompletionRequest, GenerationParams, ProviderAdapter};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Classified provider failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    QuotaExceeded,
    AuthInvalid,
    ContentFiltered,
    Timeout,
    Network,
    ModelUnavailable,
    Unknown,
}

impl FailureKind {
    /// Map an error to its failure kind.
    pub fn classify(error: &PipelineError) -> Self {
        match error {
            PipelineError::Http { status, body, .. } => match status {
                429 if body.to_ascii_lowercase().contains("quota") => FailureKind::QuotaExceeded,
                429 => FailureKind::RateLimit,
                401 | 403 => FailureKind::AuthInvalid,
                400 if body.to_ascii_lowercase().contains("content") => {
                    FailureKind::ContentFiltered
                }
                404 | 503 => FailureKind::ModelUnavailable,
                408 | 504 => FailureKind::Timeout,
                500 | 502 => FailureKind::Network,
                _ => FailureKind::Unknown,
            },
            PipelineError::Request(e) if e.is_timeout() => FailureKind::Timeout,
            PipelineError::Request(_) => FailureKind::Network,
            PipelineError::NoProvider { .. } => FailureKind::ModelUnavailable,
            _ => FailureKind::Unknown,
        }
    }

    /// Whether another attempt against the SAME service can help.
    /// Quota, auth, and content-filter failures are terminal for a service.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            FailureKind::QuotaExceeded | FailureKind::AuthInvalid | FailureKind::ContentFiltered
        )
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Refusing calls until the cool-down elapses.
    Open,
    /// One trial call allowed.
    HalfOpen,
}

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit. Default: 5.
    pub failure_threshold: u32,
    /// How long an open circuit refuses calls. Default: 30 seconds.
    pub cool_down: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Per-service failure tracker.
///
/// Expiry is lazy: the open→half-open transition happens when access
/// observes an elapsed cool-down, not on a timer. State updates are
/// atomic per service (one mutex per breaker).
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// An open circuit whose cool-down has elapsed transitions to
    /// half-open and admits exactly one trial call; further calls are
    /// refused until that trial resolves via `record_success` or
    /// `record_failure`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            CircuitState::HalfOpen => {
                // Failed trial: back to open, cool-down clock restarts.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .failure_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// One service in the fallback chain.
pub struct ChainService {
    /// Name for logs and result envelopes.
    pub name: String,
    /// Model identifier sent to the adapter.
    pub model: String,
    /// Lower tries first.
    pub priority: u32,
    /// The adapter binding.
    pub adapter: Arc<dyn ProviderAdapter>,
    /// This service's circuit breaker.
    pub breaker: CircuitBreaker,
}

/// Options for a chain call.
#[derive(Debug, Clone, Default)]
pub struct ChainOptions {
    pub params: GenerationParams,
    /// Optional system prompt applied to every service.
    pub system_prompt: Option<String>,
}

/// The envelope a chain call always returns.
#[derive(Debug, Clone)]
pub struct ChainResponse {
    /// Generated (or synthesized) content.
    pub content: String,
    /// Service that produced the content, or `"fallback"`.
    pub provider: String,
    /// Model used, if a real service answered.
    pub model: Option<String>,
    /// True when every service was exhausted and the response was
    /// synthesized locally.
    pub fallback: bool,
    /// Canned next-step choices, populated on fallback.
    pub choices: Vec<String>,
}

/// A prioritized list of equivalent services with automatic escalation.
pub struct ResilientChain {
    services: Vec<ChainService>,
    client: Client,
}

impl ResilientChain {
    pub fn new(client: Client, mut services: Vec<ChainService>) -> Self {
        services.sort_by_key(|s| s.priority);
        Self { services, client }
    }

    pub fn services(&self) -> &[ChainService] {
        &self.services
    }

    /// Try each service in priority order and return the first success.
    ///
    /// Open-circuit services are skipped. A terminal failure (quota, auth,
    /// content filter) moves to the next service immediately; retryable
    /// failures also escalate -- per-service retry belongs to the
    /// execution engine, the chain's job is breadth, not depth. When no
    /// service answers, a synthesized fallback envelope is returned. This
    /// function never errors.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        context: &str,
        options: &ChainOptions,
    ) -> ChainResponse {
        let prompt = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_else(|| context.to_string());

        for service in &self.services {
            if !service.breaker.allow_request() {
                debug!(service = %service.name, "circuit open, skipping service");
                continue;
            }

            let mut request = CompletionRequest::new(&service.model, &prompt);
            request.messages = messages.to_vec();
            request.system_prompt = options.system_prompt.clone();
            request.params = options.params.clone();

            match service.adapter.complete(&self.client, &request).await {
                Ok(response) => {
                    service.breaker.record_success();
                    return ChainResponse {
                        content: response.output,
                        provider: service.name.clone(),
                        model: Some(response.model),
                        fallback: false,
                        choices: Vec::new(),
                    };
                }
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    service.breaker.record_failure();
                    warn!(
                        service = %service.name,
                        kind = ?kind,
                        error = %e,
                        "service failed, escalating to next"
                    );
                }
            }
        }

        self.fallback_response(context)
    }

    /// Synthesize a well-formed envelope when every service is down.
    fn fallback_response(&self, context: &str) -> ChainResponse {
        let topic: String = context.chars().take(60).collect();
        let content = if topic.trim().is_empty() {
            "All generation services are temporarily unavailable. Your work is saved; \
             you can retry in a moment or continue with one of the options below."
                .to_string()
        } else {
            format!(
                "All generation services are temporarily unavailable while working on \
                 \"{}\". Your work is saved; you can retry in a moment or continue with \
                 one of the options below.",
                topic.trim()
            )
        };

        ChainResponse {
            content,
            provider: "fallback".to_string(),
            model: None,
            fallback: true,
            choices: vec![
                "Retry the last request".to_string(),
                "Save a draft and continue later".to_string(),
                "Switch to manual editing".to_string(),
            ],
        }
    }
}

/// Check an error against a service before deciding to requeue it.
/// Convenience wrapper used by the execution engine's retry gate.
pub fn is_retryable_error(error: &PipelineError) -> bool {
    FailureKind::classify(error).is_retryable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Capability, CompletionResponse, MockAdapter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_first` calls, then succeeds.
    struct FlakyAdapter {
        fail_first: u32,
        calls: AtomicU32,
        status: u16,
    }

    impl FlakyAdapter {
        fn new(fail_first: u32, status: u16) -> Self {
            Self {
                fail_first,
                calls: AtomicU32::new(0),
                status,
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        async fn complete(
            &self,
            _client: &Client,
            request: &CompletionRequest,
        ) -> crate::error::Result<CompletionResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(PipelineError::Http {
                    status: self.status,
                    body: "boom".into(),
                    retry_after: None,
                });
            }
            Ok(CompletionResponse {
                output: "recovered".into(),
                model: request.model.clone(),
                metadata: None,
            })
        }

        fn capability(&self) -> Capability {
            Capability::TextCompletion
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn service(name: &str, priority: u32, adapter: Arc<dyn ProviderAdapter>) -> ChainService {
        ChainService {
            name: name.into(),
            model: "m".into(),
            priority,
            adapter,
            breaker: CircuitBreaker::default(),
        }
    }

    fn user_message(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: crate::provider::Role::User,
            content: content.into(),
        }]
    }

    // ── classification ──

    #[test]
    fn test_classify_rate_limit_vs_quota() {
        let rate = PipelineError::Http {
            status: 429,
            body: "slow down".into(),
            retry_after: None,
        };
        let quota = PipelineError::Http {
            status: 429,
            body: "monthly quota exceeded".into(),
            retry_after: None,
        };
        assert_eq!(FailureKind::classify(&rate), FailureKind::RateLimit);
        assert_eq!(FailureKind::classify(&quota), FailureKind::QuotaExceeded);
    }

    #[test]
    fn test_classify_auth_and_filter_terminal() {
        let auth = PipelineError::Http {
            status: 401,
            body: "invalid key".into(),
            retry_after: None,
        };
        let filtered = PipelineError::Http {
            status: 400,
            body: "content policy violation".into(),
            retry_after: None,
        };
        assert_eq!(FailureKind::classify(&auth), FailureKind::AuthInvalid);
        assert!(!FailureKind::classify(&auth).is_retryable());
        assert_eq!(
            FailureKind::classify(&filtered),
            FailureKind::ContentFiltered
        );
        assert!(!FailureKind::classify(&filtered).is_retryable());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::RateLimit.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Network.is_retryable());
        assert!(FailureKind::ModelUnavailable.is_retryable());
        assert!(FailureKind::Unknown.is_retryable());
        assert!(!FailureKind::QuotaExceeded.is_retryable());
    }

    // ── circuit breaker ──

    #[test]
    fn test_breaker_trips_at_threshold() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
        });
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_breaker_success_resets_counter() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cool_down: Duration::from_secs(60),
        });
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breaker_half_open_single_trial() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cool_down: Duration::from_millis(10),
        });
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());

        std::thread::sleep(Duration::from_millis(15));
        // Cool-down elapsed: exactly one trial admitted.
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_breaker_failed_trial_reopens_and_resets_clock() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cool_down: Duration::from_millis(20),
        });
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert!(breaker.allow_request()); // trial
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        // Clock restarted: immediately after, still refusing.
        assert!(!breaker.allow_request());
    }

    // ── chain ──

    #[tokio::test]
    async fn test_chain_first_service_wins() {
        let chain = ResilientChain::new(
            Client::new(),
            vec![
                service(
                    "primary",
                    0,
                    Arc::new(MockAdapter::new(Capability::TextCompletion)),
                ),
                service(
                    "secondary",
                    1,
                    Arc::new(MockAdapter::new(Capability::TextCompletion)),
                ),
            ],
        );
        let resp = chain
            .generate(&user_message("hello"), "", &ChainOptions::default())
            .await;
        assert!(!resp.fallback);
        assert_eq!(resp.provider, "primary");
    }

    #[tokio::test]
    async fn test_chain_escalates_past_failing_service() {
        let chain = ResilientChain::new(
            Client::new(),
            vec![
                service("broken", 0, Arc::new(FlakyAdapter::new(u32::MAX, 500))),
                service(
                    "healthy",
                    1,
                    Arc::new(MockAdapter::new(Capability::TextCompletion)),
                ),
            ],
        );
        let resp = chain
            .generate(&user_message("hello"), "", &ChainOptions::default())
            .await;
        assert!(!resp.fallback);
        assert_eq!(resp.provider, "healthy");
    }

    #[tokio::test]
    async fn test_chain_fallback_when_all_exhausted() {
        let chain = ResilientChain::new(
            Client::new(),
            vec![service(
                "broken",
                0,
                Arc::new(FlakyAdapter::new(u32::MAX, 500)),
            )],
        );
        let resp = chain
            .generate(
                &user_message("plan the storyboard"),
                "storyboard planning",
                &ChainOptions::default(),
            )
            .await;
        assert!(resp.fallback);
        assert_eq!(resp.provider, "fallback");
        assert!(resp.content.contains("storyboard planning"));
        assert!(!resp.choices.is_empty());
    }

    #[tokio::test]
    async fn test_chain_skips_open_circuit() {
        let broken = service("broken", 0, Arc::new(FlakyAdapter::new(u32::MAX, 500)));
        // Trip the breaker up front.
        for _ in 0..5 {
            broken.breaker.record_failure();
        }
        let healthy = service(
            "healthy",
            1,
            Arc::new(MockAdapter::new(Capability::TextCompletion)),
        );
        let chain = ResilientChain::new(Client::new(), vec![broken, healthy]);

        let resp = chain
            .generate(&user_message("x"), "", &ChainOptions::default())
            .await;
        assert_eq!(resp.provider, "healthy");
        // The broken service was never attempted (breaker still open).
        assert_eq!(chain.services()[0].breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_chain_respects_priority_order() {
        let chain = ResilientChain::new(
            Client::new(),
            vec![
                service(
                    "low-priority",
                    9,
                    Arc::new(MockAdapter::new(Capability::TextCompletion)),
                ),
                service(
                    "high-priority",
                    1,
                    Arc::new(MockAdapter::new(Capability::TextCompletion)),
                ),
            ],
        );
        let resp = chain
            .generate(&user_message("x"), "", &ChainOptions::default())
            .await;
        assert_eq!(resp.provider, "high-priority");
    }
}
