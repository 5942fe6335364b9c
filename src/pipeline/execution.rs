//! The pipeline run record: steps, cursor, navigation, progress.

use super::step::{PipelineStep, StepStatus};
use crate::template::PromptTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

/// Derived progress counters. Always recomputed from step statuses,
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineProgress {
    /// 1-based index of the cursor step.
    pub current_step: usize,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub skipped_steps: usize,
    pub failed_steps: usize,
}

/// End-of-run roll-up.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub pipeline_id: String,
    pub group_name: String,
    pub status: PipelineStatus,
    /// completed / total × 100. Skipped steps count against the rate.
    pub success_rate: f64,
    /// Sum of completed steps' execution time only.
    pub total_time_ms: u64,
    pub progress: PipelineProgress,
}

/// One pipeline run over a tag group's templates.
///
/// Step `order` is gapless and 1-based; `current_step_index` is a 0-based
/// cursor into `steps` and only advances past steps that are Completed or
/// Skipped. Mutation is single-owner by contract; the record itself does
/// not lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: String,

    /// Tag-group prefix this run was built from.
    pub group_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// 0-based cursor into `steps`.
    pub current_step_index: usize,

    pub status: PipelineStatus,

    pub steps: Vec<PipelineStep>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl PipelineExecution {
    /// Build a run from an ordered tag group. Step order is assigned
    /// 1..=N from the group's position, not from the raw tag suffixes,
    /// so gaps in tag numbering (`001`, `003`) still yield gapless steps.
    pub fn from_group(group_name: impl Into<String>, templates: &[(u32, PromptTemplate)]) -> Self {
        let steps = templates
            .iter()
            .enumerate()
            .map(|(i, (_, t))| PipelineStep::new(&t.id, &t.name, i + 1))
            .collect();
        Self {
            id: Uuid::new_v4().to_string(),
            group_name: group_name.into(),
            project_id: None,
            current_step_index: 0,
            status: PipelineStatus::Pending,
            steps,
            started_at: None,
            notes: String::new(),
        }
    }

    pub fn current_step(&self) -> Option<&PipelineStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut PipelineStep> {
        self.steps.get_mut(self.current_step_index)
    }

    /// Forward navigation requires the cursor step to be done and a next
    /// step to exist.
    pub fn can_move_next(&self) -> bool {
        self.current_step_index + 1 < self.steps.len()
            && self
                .current_step()
                .is_some_and(|s| s.is_done())
    }

    /// Backward navigation is always allowed while not at the start.
    pub fn can_move_previous(&self) -> bool {
        self.current_step_index > 0
    }

    /// Advance the cursor by exactly one. Returns the new 0-based index.
    pub fn move_next(&mut self) -> Option<usize> {
        if self.can_move_next() {
            self.current_step_index += 1;
            Some(self.current_step_index)
        } else {
            None
        }
    }

    /// Step the cursor back by exactly one. Returns the new 0-based index.
    pub fn move_previous(&mut self) -> Option<usize> {
        if self.can_move_previous() {
            self.current_step_index -= 1;
            Some(self.current_step_index)
        } else {
            None
        }
    }

    /// Recompute progress from step statuses.
    pub fn progress(&self) -> PipelineProgress {
        let mut completed = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for step in &self.steps {
            match step.status {
                StepStatus::Completed => completed += 1,
                StepStatus::Skipped => skipped += 1,
                StepStatus::Failed => failed += 1,
                StepStatus::Pending | StepStatus::Running => {}
            }
        }
        PipelineProgress {
            current_step: self.current_step_index + 1,
            total_steps: self.steps.len(),
            completed_steps: completed,
            skipped_steps: skipped,
            failed_steps: failed,
        }
    }

    /// Refresh the run status from its steps. Completed when every step
    /// is done and at least one completed; failed when any step failed
    /// and none are pending or running.
    pub fn refresh_status(&mut self) {
        let progress = self.progress();
        let done = progress.completed_steps + progress.skipped_steps;
        if progress.total_steps > 0 && done == progress.total_steps {
            self.status = PipelineStatus::Completed;
        } else if progress.failed_steps > 0
            && done + progress.failed_steps == progress.total_steps
        {
            self.status = PipelineStatus::Failed;
        }
    }

    /// Roll up the run for reporting.
    pub fn summary(&self) -> PipelineSummary {
        let progress = self.progress();
        let success_rate = if progress.total_steps == 0 {
            0.0
        } else {
            progress.completed_steps as f64 / progress.total_steps as f64 * 100.0
        };
        let total_time_ms = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| s.execution.as_ref())
            .map(|e| e.execution_time_ms)
            .sum();
        PipelineSummary {
            pipeline_id: self.id.clone(),
            group_name: self.group_name.clone(),
            status: self.status,
            success_rate,
            total_time_ms,
            progress,
        }
    }
}
