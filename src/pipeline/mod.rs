//! Multi-step pipelines built from tag groups.
//!
//! Templates tagged `"<prefix>-<NNN>"` form ordered groups; a
//! [`PipelineExecution`] walks one group step by step, carrying
//! variables mined from each output into the next step's inputs.
//! [`PipelineOrchestrator`] drives the walk and persists the record
//! through a [`StateStore`](crate::store::StateStore) after every
//! mutation.

pub mod carryover;
pub mod execution;
pub mod orchestrator;
pub mod step;
pub mod tags;

pub use carryover::extract_variables;
pub use execution::{PipelineExecution, PipelineProgress, PipelineStatus, PipelineSummary};
pub use orchestrator::PipelineOrchestrator;
pub use step::{PipelineStep, StepStatus};
pub use tags::{extract_tag_groups, parse_tag, PipelineTag};
