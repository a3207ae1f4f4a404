//! Persistent records shared by the orchestrator, dispatcher, coordinator and pipeline.

pub mod capability;
pub mod generation;
pub mod plan;
pub mod requirement;
pub mod task;
pub mod workflow;

pub use capability::AgentType;
pub use generation::{
    Artifact, AuditLogEntry, AuditOutcome, Explanation, ExplanationDraft, GenerationResult,
    PipelineStage, StageFailure, ValidationResults,
};
pub use plan::{ExecutionPlan, Phase};
pub use requirement::{AcceptanceCriterion, Requirement, UserStory};
pub use task::{Task, TaskPriority, TaskStatus};
pub use workflow::{Workflow, WorkflowStatus};

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
