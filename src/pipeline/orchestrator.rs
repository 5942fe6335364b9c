//! The pipeline orchestrator: builds runs from tag groups, executes
//! steps through the engine, carries variables forward, and persists
//! after every mutation.
//!
//! Persistence is best-effort. A failed save is logged and swallowed so
//! an in-memory run can always continue; the price is a stale stored
//! copy until the next successful save. Pipeline records assume a single
//! mutating owner; the store does not arbitrate concurrent writers.

use super::carryover::extract_variables;
use super::execution::{PipelineExecution, PipelineStatus};
use super::tags::extract_tag_groups;
use crate::engine::{ExecutionEngine, ExecutionResult};
use crate::error::{PipelineError, Result};
use crate::events::{emit, Event, EventHandler};
use crate::store::StateStore;
use crate::template::PromptTemplate;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed key holding the JSON array of active pipeline ids.
const ACTIVE_KEY: &str = "pipeline:active";

fn record_key(id: &str) -> String {
    format!("pipeline:{id}")
}

/// Drives pipeline runs end to end.
pub struct PipelineOrchestrator {
    engine: Arc<ExecutionEngine>,
    store: Arc<dyn StateStore>,
    /// Registered templates in insertion order. Order matters for
    /// duplicate tag suffixes.
    templates: Vec<PromptTemplate>,
    handler: Option<Arc<dyn EventHandler>>,
}

impl PipelineOrchestrator {
    pub fn new(engine: Arc<ExecutionEngine>, store: Arc<dyn StateStore>) -> Self {
        Self {
            engine,
            store,
            templates: Vec::new(),
            handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Make templates available for grouping and execution. Appended in
    /// call order; a template with an already-registered id replaces it.
    pub fn register_templates(&mut self, templates: Vec<PromptTemplate>) {
        for template in templates {
            if let Some(existing) = self.templates.iter_mut().find(|t| t.id == template.id) {
                *existing = template;
            } else {
                self.templates.push(template);
            }
        }
    }

    /// Tag groups currently derivable from the registered templates.
    pub fn available_groups(&self) -> Vec<String> {
        extract_tag_groups(&self.templates).into_keys().collect()
    }

    fn template_by_id(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Build and persist a new run from a tag group.
    pub async fn start_group(&self, group_name: &str) -> Result<PipelineExecution> {
        let groups = extract_tag_groups(&self.templates);
        let members = groups.get(group_name).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("unknown tag group: {group_name}"))
        })?;

        let mut pipeline = PipelineExecution::from_group(group_name, members);
        pipeline.status = PipelineStatus::Running;
        pipeline.started_at = Some(Utc::now());

        emit(
            &self.handler,
            Event::PipelineStart {
                pipeline_id: pipeline.id.clone(),
                group_name: group_name.to_string(),
                total_steps: pipeline.steps.len(),
            },
        );
        info!(pipeline = %pipeline.id, group = %group_name, steps = pipeline.steps.len(), "pipeline started");

        self.save(&pipeline).await;
        self.add_active(&pipeline.id).await;
        Ok(pipeline)
    }

    /// Execute the cursor step against `model`.
    ///
    /// The step's accumulated inputs feed interpolation; on success, any
    /// carry-over variables mined from the output are merged into the
    /// NEXT step's inputs (explicit inputs win over carried values). The
    /// record is persisted before and after the provider call. Provider
    /// failures land in the returned [`ExecutionResult`], not in `Err`.
    pub async fn run_step(
        &self,
        pipeline: &mut PipelineExecution,
        model: &str,
    ) -> Result<ExecutionResult> {
        let step_index = pipeline.current_step_index;
        let (template_id, step_order, inputs) = {
            let step = pipeline.current_step().ok_or_else(|| {
                PipelineError::InvalidConfig("pipeline has no current step".to_string())
            })?;
            (step.template_id.clone(), step.order, step.inputs.clone())
        };

        let template = self
            .template_by_id(&template_id)
            .ok_or_else(|| PipelineError::StepFailed {
                step: step_order.to_string(),
                message: format!("template not registered: {template_id}"),
            })?
            .clone();

        emit(
            &self.handler,
            Event::StepStart {
                pipeline_id: pipeline.id.clone(),
                step: step_order,
                template_name: template.name.clone(),
            },
        );

        if let Some(step) = pipeline.current_step_mut() {
            step.mark_running();
        }
        self.save(pipeline).await;

        let mut ctx = template.context();
        for (name, value) in &inputs {
            ctx.set(name.clone(), value.clone());
        }

        let result = self.engine.execute(&template, &ctx, model, None).await;

        if result.metrics.retry_count > 0 {
            emit(
                &self.handler,
                Event::ExecutionRetry {
                    pipeline_id: pipeline.id.clone(),
                    attempt: result.metrics.retry_count,
                    reason: result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "transient provider failure".to_string()),
                },
            );
        }

        let carried: HashMap<String, Value> = if result.is_success() {
            extract_variables(&result.output)
        } else {
            HashMap::new()
        };

        if let Some(step) = pipeline.steps.get_mut(step_index) {
            step.record_execution(result.clone());
        }
        if let Some(next) = pipeline.steps.get_mut(step_index + 1) {
            for (name, value) in carried {
                next.inputs.entry(name).or_insert(value);
            }
        }
        pipeline.refresh_status();

        emit(
            &self.handler,
            Event::StepEnd {
                pipeline_id: pipeline.id.clone(),
                step: step_order,
                ok: result.is_success(),
            },
        );
        if matches!(
            pipeline.status,
            PipelineStatus::Completed | PipelineStatus::Failed
        ) {
            emit(
                &self.handler,
                Event::PipelineEnd {
                    pipeline_id: pipeline.id.clone(),
                    ok: pipeline.status == PipelineStatus::Completed,
                },
            );
        }

        self.save(pipeline).await;
        Ok(result)
    }

    /// Mark the cursor step skipped and persist.
    pub async fn skip_step(&self, pipeline: &mut PipelineExecution) -> Result<()> {
        let step = pipeline.current_step_mut().ok_or_else(|| {
            PipelineError::InvalidConfig("pipeline has no current step".to_string())
        })?;
        step.mark_skipped();
        pipeline.refresh_status();
        if pipeline.status == PipelineStatus::Completed {
            emit(
                &self.handler,
                Event::PipelineEnd {
                    pipeline_id: pipeline.id.clone(),
                    ok: true,
                },
            );
        }
        self.save(pipeline).await;
        Ok(())
    }

    /// Move the cursor forward one step if allowed, persisting on success.
    pub async fn advance(&self, pipeline: &mut PipelineExecution) -> bool {
        let moved = pipeline.move_next().is_some();
        if moved {
            self.save(pipeline).await;
        }
        moved
    }

    /// Load a persisted run. Missing OR corrupted records both read as
    /// `Ok(None)`; corruption is logged, never surfaced as an error.
    pub async fn resume(&self, id: &str) -> Result<Option<PipelineExecution>> {
        let Some(raw) = self.store.get(&record_key(id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(pipeline) => Ok(Some(pipeline)),
            Err(e) => {
                warn!(pipeline = %id, error = %e, "stored pipeline record is corrupted, treating as not found");
                Ok(None)
            }
        }
    }

    /// Ids currently in the active index.
    pub async fn active_pipelines(&self) -> Result<Vec<String>> {
        let Some(raw) = self.store.get(ACTIVE_KEY).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Delete a run's record and drop it from the active index.
    pub async fn clear(&self, id: &str) -> Result<()> {
        self.store.delete(&record_key(id)).await?;
        let mut active = self.active_pipelines().await?;
        active.retain(|a| a != id);
        let serialized = serde_json::to_string(&active).map_err(PipelineError::from)?;
        self.store.put(ACTIVE_KEY, &serialized).await?;
        Ok(())
    }

    /// Best-effort save. Failures are logged and swallowed.
    async fn save(&self, pipeline: &PipelineExecution) {
        let serialized = match serde_json::to_string(pipeline) {
            Ok(s) => s,
            Err(e) => {
                warn!(pipeline = %pipeline.id, error = %e, "failed to serialize pipeline state");
                return;
            }
        };
        if let Err(e) = self.store.put(&record_key(&pipeline.id), &serialized).await {
            warn!(pipeline = %pipeline.id, error = %e, "failed to persist pipeline state");
        }
    }

    async fn add_active(&self, id: &str) {
        let mut active = match self.active_pipelines().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "failed to read active pipeline index");
                return;
            }
        };
        if !active.iter().any(|a| a == id) {
            active.push(id.to_string());
        }
        match serde_json::to_string(&active) {
            Ok(serialized) => {
                if let Err(e) = self.store.put(ACTIVE_KEY, &serialized).await {
                    warn!(error = %e, "failed to update active pipeline index");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize active pipeline index"),
        }
    }
}
