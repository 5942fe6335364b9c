//! Event system for pipeline and step lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe pipeline execution.
//! The orchestrator emits events when a pipeline starts, each step runs,
//! a retry fires, and the pipeline finishes. Users can implement
//! [`EventHandler`] to receive these events for logging, progress
//! tracking, or UI updates.

use std::sync::Arc;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone)]
pub enum Event {
    /// A pipeline run has started.
    PipelineStart {
        /// Pipeline identifier.
        pipeline_id: String,
        /// Tag group the pipeline was built from.
        group_name: String,
        /// Number of steps in the pipeline.
        total_steps: usize,
    },
    /// A step has started executing.
    StepStart {
        /// Pipeline identifier.
        pipeline_id: String,
        /// 1-based step order.
        step: usize,
        /// Template name backing the step.
        template_name: String,
    },
    /// A step has finished executing.
    StepEnd {
        /// Pipeline identifier.
        pipeline_id: String,
        /// 1-based step order.
        step: usize,
        /// Whether the step's execution succeeded.
        ok: bool,
    },
    /// A provider retry fired inside a step's execution.
    ExecutionRetry {
        /// Pipeline identifier, when the retry happened inside a pipeline.
        pipeline_id: String,
        /// The retry attempt number (1-indexed).
        attempt: u32,
        /// Reason for the retry (error description).
        reason: String,
    },
    /// A pipeline run has finished.
    PipelineEnd {
        /// Pipeline identifier.
        pipeline_id: String,
        /// Whether every non-skipped step completed.
        ok: bool,
    },
}

/// Handler for pipeline lifecycle events.
///
/// This is entirely optional -- the orchestrator works without one.
///
/// # Example
///
/// ```
/// use prompt_pipeline::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StepStart { step, template_name, .. } => {
///                 println!("[step {}] {}", step, template_name)
///             }
///             Event::PipelineEnd { pipeline_id, ok } => {
///                 println!("[done] {} ok={}", pipeline_id, ok)
///             }
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when the orchestrator emits an event.
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use prompt_pipeline::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::StepEnd { step, ok, .. } = event {
///         println!("step {} ok={}", step, ok);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}
