use crate::error::CoreResult;
use crate::model::{AgentType, Artifact, Explanation, ExplanationDraft, Task};
use crate::queue::JobPayload;

use super::collaborators::{DomainContract, FailureModeSpec};

/// Everything an executor may look at for one attempt.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task: Task,
    pub payload: JobPayload,
    pub contract: Option<DomainContract>,
    pub failure_modes: Option<FailureModeSpec>,
}

/// Free-form text generation, typically backed by a remote model.
///
/// Rate limits and transport failures should surface as
/// [`crate::error::CoreError::ExternalService`] so the lane retries them.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str, system: Option<&str>) -> CoreResult<String>;
}

/// Capability-specific half of a pipeline run: explain first, then emit.
#[async_trait::async_trait]
pub trait CapabilityExecutor: Send + Sync {
    fn capability(&self) -> AgentType;

    async fn produce_explanation(&self, request: &ExecutionRequest) -> CoreResult<ExplanationDraft>;

    /// Called only after emission has been authorized for `explanation`.
    async fn generate_artifact(
        &self,
        request: &ExecutionRequest,
        explanation: &Explanation,
    ) -> CoreResult<Artifact>;
}
