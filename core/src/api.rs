//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `forgeflow_core::api` instead of reaching into internal modules.

pub use crate::config::{
    apply_env_overrides, get_forgeflow_data_dir, load_default, load_from_path, AppConfig, CoordinatorConfig,
    FailurePolicy, GeneratorConfig, GeneratorProvider, LaneConfig, LoggingConfig,
    OrchestratorConfig, PersistenceConfig, PipelineConfig, QueueConfig, TransportConfig,
};
pub use crate::context::{AppContext, Services, ServicesFactory, Submission};
pub use crate::coordinator::{AgentCoordinator, CompletionReport, CoordinationPlan, FailureReport};
pub use crate::error::{CliError, CoreError, CoreResult, ErrorCode};
pub use crate::model::{
    AcceptanceCriterion, AgentType, Artifact, AuditLogEntry, AuditOutcome, Explanation,
    ExplanationDraft, GenerationResult, PipelineStage, Requirement, StageFailure, Task,
    TaskPriority, TaskStatus, UserStory, ValidationResults, Workflow, WorkflowStatus,
};
pub use crate::orchestrator::Orchestrator;
pub use crate::pipeline::{
    run_pipeline, AgentExecutionContext, CapabilityExecutor, ContractRegistry, DomainContract,
    ExecutionRequest, FailureMode, FailureModeRegistry, FailureModeSpec,
    InMemoryContractRegistry, InMemoryFailureModeRegistry, TextGenerator,
};
pub use crate::queue::{
    EnqueueOutcome, ExponentialBackoff, JobPayload, JobTransport, LaneStats, LocalTransport,
    QueueDispatcher, RetryConfig, RetryStrategy, RetryStrategyBuilder,
};
pub use crate::state::{EventBus, FlowEvent};
pub use crate::store::{MemoryStore, Store, StoreSnapshot, TaskFilter, TaskPatch, WorkflowPatch};
