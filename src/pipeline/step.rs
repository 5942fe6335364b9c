//! A single step of a pipeline run.

use crate::engine::ExecutionResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One step of a pipeline, bound to a template.
///
/// `execution` holds only the LATEST attempt; re-running a step
/// overwrites it. `inputs` is the variable map the step was (or will be)
/// interpolated with, including carried-over values from earlier steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,

    /// Template backing this step.
    pub template_id: String,
    pub template_name: String,

    /// 1-based position in the pipeline.
    pub order: usize,

    pub status: StepStatus,

    /// Variable name → value used for interpolation.
    #[serde(default)]
    pub inputs: HashMap<String, Value>,

    /// Latest execution outcome, if the step has run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,

    /// Free-form operator notes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineStep {
    pub fn new(template_id: impl Into<String>, template_name: impl Into<String>, order: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.into(),
            template_name: template_name.into(),
            order,
            status: StepStatus::Pending,
            inputs: HashMap::new(),
            execution: None,
            notes: String::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether the pipeline may advance past this step.
    pub fn is_done(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Skipped)
    }

    /// Record the start of an attempt. Re-attempts reset the completion
    /// stamp but keep the step's identity.
    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    /// Record the outcome of an attempt, overwriting any prior one.
    pub fn record_execution(&mut self, result: ExecutionResult) {
        self.status = if result.is_success() {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.execution = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self) {
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutionMetrics, ExecutionStatus};

    fn result(status: ExecutionStatus) -> ExecutionResult {
        ExecutionResult {
            output: "out".into(),
            status,
            error_message: None,
            execution_time_ms: 5,
            provider_used: "mock".into(),
            model: "gpt-4o".into(),
            metrics: ExecutionMetrics::default(),
        }
    }

    #[test]
    fn test_new_step_is_pending() {
        let step = PipelineStep::new("t-1", "outline", 1);
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.execution.is_none());
        assert!(!step.is_done());
    }

    #[test]
    fn test_success_completes_failure_fails() {
        let mut step = PipelineStep::new("t-1", "outline", 1);
        step.mark_running();
        assert!(step.started_at.is_some());

        step.record_execution(result(ExecutionStatus::Success));
        assert_eq!(step.status, StepStatus::Completed);
        assert!(step.is_done());

        step.record_execution(result(ExecutionStatus::Error));
        assert_eq!(step.status, StepStatus::Failed);
        assert!(!step.is_done());
    }

    #[test]
    fn test_reattempt_overwrites_execution() {
        let mut step = PipelineStep::new("t-1", "outline", 1);
        let mut failed = result(ExecutionStatus::Error);
        failed.output = "bad".into();
        step.record_execution(failed);

        step.mark_running();
        assert!(step.completed_at.is_none());
        step.record_execution(result(ExecutionStatus::Success));
        assert_eq!(step.execution.as_ref().unwrap().output, "out");
    }

    #[test]
    fn test_skipped_counts_as_done() {
        let mut step = PipelineStep::new("t-1", "outline", 2);
        step.mark_skipped();
        assert_eq!(step.status, StepStatus::Skipped);
        assert!(step.is_done());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut step = PipelineStep::new("t-1", "outline", 1);
        step.inputs.insert("name".into(), serde_json::json!("John"));
        step.record_execution(result(ExecutionStatus::Success));

        let json = serde_json::to_string(&step).unwrap();
        let back: PipelineStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, step.id);
        assert_eq!(back.status, StepStatus::Completed);
        assert_eq!(back.inputs["name"], serde_json::json!("John"));
        assert!(back.execution.is_some());
    }
}
