use std::time::Duration;
use thiserror::Error;

/// Errors produced by the execution engine and its collaborators.
///
/// Interpolation problems are deliberately NOT represented here -- the
/// interpolator reports diagnostics inside
/// [`InterpolationResult`](crate::interpolator::InterpolationResult) and
/// never fails. This enum covers routing, transport, provider, and
/// persistence failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider returned a non-success status code.
    ///
    /// The `retry_after` field is populated from the `Retry-After` response
    /// header when present, so the backoff loop can honor it.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// No adapter could be resolved for the requested model.
    #[error("No provider available for model: {model}")]
    NoProvider {
        /// The model identifier that failed to resolve.
        model: String,
    },

    /// A pipeline step failed with a descriptive message.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// The durable state store rejected or lost an operation.
    ///
    /// The orchestrator logs and swallows this variant; a persistence
    /// failure never aborts an otherwise-successful step.
    #[error("Store operation failed: {0}")]
    Store(String),

    /// Invalid configuration detected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
