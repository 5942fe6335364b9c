//! # Prompt Pipeline
//!
//! Prompt execution and multi-step pipeline orchestration for LLM-backed
//! authoring tools.
//!
//! This crate provides the building blocks for running prompt templates
//! against completion and image providers: **interpolation** of
//! `{{name}}` tokens with typed variables, a **router** that maps models
//! to capability families, an **execution engine** with sequential
//! retries that always returns a result envelope, and a **pipeline
//! orchestrator** that walks tag-ordered template groups with resumable,
//! persisted state.
//!
//! ## Core Concepts
//!
//! - **[`PromptTemplate`]** — template text plus typed
//!   [`VariableDefinition`]s; `{{name}}` tokens are resolved by
//!   [`interpolate`](interpolator::interpolate).
//! - **[`ProviderRouter`]** — maps model names to capability families
//!   and hands out the right [`ProviderAdapter`]; mock mode swaps the
//!   whole adapter table for stubs.
//! - **[`ExecutionEngine`]** — interpolate, route, call, retry. Every
//!   outcome is an [`ExecutionResult`]; the engine never returns `Err`.
//! - **[`ResilientChain`]** — prioritized fallback across equivalent
//!   services, each behind its own [`CircuitBreaker`].
//! - **[`PipelineOrchestrator`]** — builds runs from `"<prefix>-<NNN>"`
//!   tag groups, carries variables between steps, and persists through a
//!   [`StateStore`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use prompt_pipeline::{
//!     ExecutionEngine, PromptTemplate, VariableDefinition, VariableType,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ExecutionEngine::mocked();
//!
//!     let template = PromptTemplate::new("t-1", "greeting", "Hello {{name}}")
//!         .with_variable(VariableDefinition::new("name", VariableType::String, true));
//!     let ctx = template.context().insert("name", json!("John"));
//!
//!     let result = engine.execute(&template, &ctx, "gpt-4o", None).await;
//!     assert!(result.is_success());
//!     println!("{}", result.output);
//! }
//! ```
//!
//! ## Pipelines
//!
//! Templates opt into a pipeline by carrying tags like `story-001`,
//! `story-002`; all templates sharing a prefix form one ordered group.
//!
//! ```no_run
//! use prompt_pipeline::{ExecutionEngine, MemoryStore, PipelineOrchestrator, PromptTemplate};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut orchestrator = PipelineOrchestrator::new(
//!         Arc::new(ExecutionEngine::mocked()),
//!         Arc::new(MemoryStore::new()),
//!     );
//!     orchestrator.register_templates(vec![
//!         PromptTemplate::new("t-1", "outline", "Outline the story").with_tag("story-001"),
//!         PromptTemplate::new("t-2", "draft", "Draft the story").with_tag("story-002"),
//!     ]);
//!
//!     let mut pipeline = orchestrator.start_group("story").await?;
//!     while pipeline.current_step().is_some() {
//!         orchestrator.run_step(&mut pipeline, "gpt-4o").await?;
//!         if !orchestrator.advance(&mut pipeline).await {
//!             break;
//!         }
//!     }
//!     println!("{:?}", pipeline.summary());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod engine;
pub mod error;
pub mod events;
pub mod interpolator;
pub mod pipeline;
pub mod provider;
pub mod resilience;
pub mod store;
pub mod template;

pub use backoff::{BackoffConfig, JitterStrategy};
pub use engine::{
    EngineStatus, ExecutionConfig, ExecutionEngine, ExecutionMetrics, ExecutionResult,
    ExecutionStatus,
};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use interpolator::{interpolate, InterpolationResult};
pub use pipeline::{
    PipelineExecution, PipelineOrchestrator, PipelineProgress, PipelineStatus, PipelineStep,
    PipelineSummary, StepStatus,
};
pub use provider::{
    Capability, ChatMessage, CompletionRequest, CompletionResponse, GenerationParams,
    MockAdapter, ProviderAdapter, ProviderRouter, Role, RouterConfig,
};
pub use resilience::{
    ChainOptions, ChainResponse, ChainService, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    FailureKind, ResilientChain,
};
pub use store::{FileStore, MemoryStore, StateStore};
pub use template::{PromptTemplate, VariableContext, VariableDefinition, VariableType};
