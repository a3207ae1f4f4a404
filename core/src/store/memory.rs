use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::patch::{TaskFilter, TaskPatch, WorkflowPatch};
use super::r#trait::Store;
use crate::error::{CoreError, CoreResult};
use crate::model::{AuditLogEntry, GenerationResult, Task, Workflow};

/// Serializable copy of every table, in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub workflows: Vec<Workflow>,
    pub tasks: Vec<Task>,
    pub generation_results: Vec<GenerationResult>,
    pub audit_logs: Vec<AuditLogEntry>,
}

#[derive(Default)]
struct Tables {
    workflows: HashMap<String, Workflow>,
    workflow_order: Vec<String>,
    tasks: HashMap<String, Task>,
    task_order: Vec<String>,
    generation_results: Vec<GenerationResult>,
    audit_logs: Vec<AuditLogEntry>,
}

/// In-process store. Each update holds the table write lock for the whole
/// read-modify-write, which gives single-row atomicity.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut tables = Tables::default();
        for wf in snapshot.workflows {
            tables.workflow_order.push(wf.id.clone());
            tables.workflows.insert(wf.id.clone(), wf);
        }
        for task in snapshot.tasks {
            tables.task_order.push(task.id.clone());
            tables.tasks.insert(task.id.clone(), task);
        }
        tables.generation_results = snapshot.generation_results;
        tables.audit_logs = snapshot.audit_logs;
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await;
        StoreSnapshot {
            workflows: tables
                .workflow_order
                .iter()
                .filter_map(|id| tables.workflows.get(id).cloned())
                .collect(),
            tasks: tables
                .task_order
                .iter()
                .filter_map(|id| tables.tasks.get(id).cloned())
                .collect(),
            generation_results: tables.generation_results.clone(),
            audit_logs: tables.audit_logs.clone(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.workflows.contains_key(&workflow.id) {
            return Err(CoreError::Conflict(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        tables.workflow_order.push(workflow.id.clone());
        tables
            .workflows
            .insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> CoreResult<Option<Workflow>> {
        Ok(self.tables.read().await.workflows.get(id).cloned())
    }

    async fn update_workflow(&self, id: &str, patch: WorkflowPatch) -> CoreResult<Workflow> {
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("workflow", id))?;
        patch.apply(workflow);
        Ok(workflow.clone())
    }

    async fn insert_task(&self, task: &Task) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tasks.contains_key(&task.id) {
            return Err(CoreError::Conflict(format!("task {} already exists", task.id)));
        }
        tables.task_order.push(task.id.clone());
        tables.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &str) -> CoreResult<Option<Task>> {
        Ok(self.tables.read().await.tasks.get(id).cloned())
    }

    async fn update_task(&self, id: &str, patch: TaskPatch) -> CoreResult<Task> {
        let mut tables = self.tables.write().await;
        let task = tables
            .tasks
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("task", id))?;
        patch.apply(task);
        Ok(task.clone())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> CoreResult<Vec<Task>> {
        let tables = self.tables.read().await;
        Ok(tables
            .task_order
            .iter()
            .filter_map(|id| tables.tasks.get(id))
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn insert_generation_result(&self, result: &GenerationResult) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.generation_results.iter().any(|r| r.id == result.id) {
            return Err(CoreError::Conflict(format!(
                "generation result {} already exists",
                result.id
            )));
        }
        tables.generation_results.push(result.clone());
        Ok(())
    }

    async fn get_generation_result(&self, id: &str) -> CoreResult<Option<GenerationResult>> {
        let tables = self.tables.read().await;
        Ok(tables.generation_results.iter().find(|r| r.id == id).cloned())
    }

    async fn list_generation_results(&self, task_id: &str) -> CoreResult<Vec<GenerationResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .generation_results
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn append_audit_logs(&self, entries: &[AuditLogEntry]) -> CoreResult<()> {
        self.tables
            .write()
            .await
            .audit_logs
            .extend(entries.iter().cloned());
        Ok(())
    }

    async fn list_audit_logs(&self, task_id: &str) -> CoreResult<Vec<AuditLogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit_logs
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentType, TaskStatus};

    #[tokio::test]
    async fn update_missing_task_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_task("nope", TaskPatch::status(TaskStatus::Assigned))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "task", .. }));
        assert!(store.get_task("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_tasks_filters_and_keeps_insertion_order() {
        let store = MemoryStore::new();
        let a = Task::new("wf-1", AgentType::Backend, "a");
        let b = Task::new("wf-1", AgentType::Frontend, "b");
        let c = Task::new("wf-2", AgentType::Backend, "c");
        for t in [&a, &b, &c] {
            store.insert_task(t).await.unwrap();
        }

        let wf1 = store.list_tasks(&TaskFilter::workflow("wf-1")).await.unwrap();
        assert_eq!(
            wf1.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let backend = store
            .list_tasks(&TaskFilter::pending_for(AgentType::Backend))
            .await
            .unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_round_trips_tables() {
        let store = MemoryStore::new();
        store
            .insert_task(&Task::new("wf", AgentType::Test, "t"))
            .await
            .unwrap();
        let restored = MemoryStore::from_snapshot(store.snapshot().await);
        assert_eq!(
            restored.list_tasks(&TaskFilter::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let t = Task::new("wf", AgentType::Test, "t");
        store.insert_task(&t).await.unwrap();
        assert!(matches!(
            store.insert_task(&t).await,
            Err(CoreError::Conflict(_))
        ));
    }
}
