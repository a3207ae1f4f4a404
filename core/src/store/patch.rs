use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{AgentType, ExecutionPlan, Task, TaskStatus, Workflow, WorkflowStatus};

/// Partial workflow update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPatch {
    pub status: Option<WorkflowStatus>,
    pub plan: Option<ExecutionPlan>,
    pub task_ids: Option<Vec<String>>,
    pub error: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
}

impl WorkflowPatch {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, workflow: &mut Workflow) {
        if let Some(status) = self.status {
            workflow.status = status;
        }
        if let Some(plan) = self.plan {
            workflow.plan = plan;
        }
        if let Some(task_ids) = self.task_ids {
            workflow.task_ids = task_ids;
        }
        if let Some(error) = self.error {
            workflow.error = error;
        }
        if let Some(completed_at) = self.completed_at {
            workflow.completed_at = completed_at;
        }
        workflow.updated_at = Utc::now();
    }
}

/// Partial task update. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub retry_count: Option<u32>,
    pub error: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(retry_count) = self.retry_count {
            task.retry_count = retry_count;
        }
        if let Some(error) = self.error {
            task.error = error;
        }
        if let Some(started_at) = self.started_at {
            task.started_at = started_at;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(metadata) = self.metadata {
            task.metadata = metadata;
        }
    }
}

/// Filter for [`Store::list_tasks`](super::Store::list_tasks). Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub workflow_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub agent_type: Option<AgentType>,
}

impl TaskFilter {
    pub fn workflow(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: Some(workflow_id.into()),
            ..Default::default()
        }
    }

    pub fn pending_for(agent_type: AgentType) -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            agent_type: Some(agent_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.workflow_id
            .as_deref()
            .map_or(true, |w| task.workflow_id == w)
            && self.status.map_or(true, |s| task.status == s)
            && self.agent_type.map_or(true, |a| task.agent_type == a)
    }
}
