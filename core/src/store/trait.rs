use async_trait::async_trait;

use super::patch::{TaskFilter, TaskPatch, WorkflowPatch};
use crate::error::CoreResult;
use crate::model::{AuditLogEntry, GenerationResult, Task, Workflow};

/// Row store for workflows, tasks, generation results and audit logs.
///
/// `update_*` must apply the patch atomically per row and return
/// `CoreError::NotFound` when the id does not exist. Reads return `None` /
/// empty for absent rows instead of failing.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn insert_workflow(&self, workflow: &Workflow) -> CoreResult<()>;
    async fn get_workflow(&self, id: &str) -> CoreResult<Option<Workflow>>;
    async fn update_workflow(&self, id: &str, patch: WorkflowPatch) -> CoreResult<Workflow>;

    async fn insert_task(&self, task: &Task) -> CoreResult<()>;
    async fn get_task(&self, id: &str) -> CoreResult<Option<Task>>;
    async fn update_task(&self, id: &str, patch: TaskPatch) -> CoreResult<Task>;
    async fn list_tasks(&self, filter: &TaskFilter) -> CoreResult<Vec<Task>>;

    async fn insert_generation_result(&self, result: &GenerationResult) -> CoreResult<()>;
    async fn get_generation_result(&self, id: &str) -> CoreResult<Option<GenerationResult>>;
    async fn list_generation_results(&self, task_id: &str) -> CoreResult<Vec<GenerationResult>>;

    async fn append_audit_logs(&self, entries: &[AuditLogEntry]) -> CoreResult<()>;
    async fn list_audit_logs(&self, task_id: &str) -> CoreResult<Vec<AuditLogEntry>>;

    /// Flush buffered writes. Called once on shutdown.
    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}
