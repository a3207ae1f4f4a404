use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::{OrchestratorConfig, PersistenceConfig};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    AgentType, Requirement, Task, TaskStatus, Workflow, WorkflowStatus,
};
use crate::state::{EventBus, FlowEvent, TaskTransition, WorkflowTransition};
use crate::store::{Store, TaskFilter, TaskPatch, WorkflowPatch};
use crate::util::with_timeout;

use super::planner;

/// Owns workflow and task lifecycle: planning, status writes and retry accounting.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    cfg: OrchestratorConfig,
    store_timeout: Duration,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        cfg: OrchestratorConfig,
        persistence: &PersistenceConfig,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            cfg,
            store_timeout: Duration::from_millis(persistence.timeout_ms),
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    /// Validates `requirement`, plans it and persists the workflow with its phase-one tasks.
    ///
    /// The returned workflow is in `planning`; dispatch starts with [`Self::begin_execution`].
    pub async fn start_workflow(
        &self,
        requirement: Requirement,
        created_by: &str,
    ) -> CoreResult<Workflow> {
        requirement.validate()?;

        let now = Utc::now();
        let mut workflow = Workflow {
            id: crate::model::new_id(),
            status: WorkflowStatus::Created,
            title: requirement.title.clone(),
            description: requirement.description.clone(),
            requirement,
            plan: Default::default(),
            task_ids: Vec::new(),
            created_by: created_by.to_string(),
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.timed("insert_workflow", self.store.insert_workflow(&workflow))
            .await?;
        tracing::info!(
            target: "forgeflow.orchestrator",
            stage = "create",
            workflow_id = %workflow.id,
            stories = workflow.requirement.user_stories.len(),
            "workflow created"
        );

        workflow = self
            .set_workflow_status(&workflow, WorkflowStatus::Validating, WorkflowPatch::default())
            .await?;

        let mut plan = planner::build_plan(&workflow.requirement);
        planner::validate_plan(&plan)?;
        let tasks = planner::derive_phase_one_tasks(
            &workflow.id,
            &workflow.requirement,
            self.cfg.primary_capability,
            self.cfg.chunk_size,
            self.cfg.max_retries,
        );
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        if let Some(first) = plan.phase_mut(1) {
            first.task_ids = task_ids.clone();
        }

        for task in &tasks {
            self.timed("insert_task", self.store.insert_task(task)).await?;
            tracing::debug!(
                target: "forgeflow.orchestrator",
                stage = "plan",
                workflow_id = %workflow.id,
                task_id = %task.id,
                priority = task.priority.as_str(),
                deps = task.dependencies.len(),
                "task planned"
            );
        }

        let patch = WorkflowPatch {
            plan: Some(plan),
            task_ids: Some(task_ids),
            ..Default::default()
        };
        workflow = self
            .set_workflow_status(&workflow, WorkflowStatus::Planning, patch)
            .await?;

        self.events.emit(FlowEvent::WorkflowCreated {
            workflow_id: workflow.id.clone(),
            task_count: tasks.len(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            target: "forgeflow.orchestrator",
            stage = "plan",
            workflow_id = %workflow.id,
            tasks = tasks.len(),
            estimated_minutes = workflow.plan.total_estimated_minutes(),
            "workflow planned"
        );
        Ok(workflow)
    }

    pub async fn get_workflow(&self, id: &str) -> CoreResult<Option<Workflow>> {
        self.timed("get_workflow", self.store.get_workflow(id)).await
    }

    pub async fn get_workflow_tasks(&self, workflow_id: &str) -> CoreResult<Vec<Task>> {
        self.timed(
            "list_tasks",
            self.store.list_tasks(&TaskFilter::workflow(workflow_id)),
        )
        .await
    }

    pub async fn get_task(&self, id: &str) -> CoreResult<Option<Task>> {
        self.timed("get_task", self.store.get_task(id)).await
    }

    /// Moves a task to `status`, stamping `started_at`/`completed_at` and storing `error`.
    ///
    /// `assigned` is refused with a conflict while any dependency is not completed.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> CoreResult<Task> {
        let task = self.require_task(task_id).await?;
        self.write_task_status(&task, status, error, None).await
    }

    /// Highest priority first, then oldest; `None` when the capability has nothing pending.
    pub async fn get_next_pending_task(&self, agent_type: AgentType) -> CoreResult<Option<Task>> {
        let mut pending = self
            .timed(
                "list_tasks",
                self.store.list_tasks(&TaskFilter::pending_for(agent_type)),
            )
            .await?;
        // stable sort keeps store order on exact ties
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(pending.into_iter().next())
    }

    /// Counts one failed attempt. The task moves to `retry`, or to `failed` once
    /// `max_retries` is reached.
    pub async fn record_task_failure(&self, task_id: &str, error: &str) -> CoreResult<Task> {
        let task = self.require_task(task_id).await?;
        let retry_count = (task.retry_count + 1).min(task.max_retries);
        let status = if retry_count >= task.max_retries {
            TaskStatus::Failed
        } else {
            TaskStatus::Retry
        };
        let task = self
            .write_task_status(&task, status, Some(error.to_string()), Some(retry_count))
            .await?;
        tracing::warn!(
            target: "forgeflow.orchestrator",
            stage = "retry",
            task_id = %task.id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            status = task.status.as_str(),
            error,
            "task attempt failed"
        );
        Ok(task)
    }

    /// Fails a task terminally, without consuming the retry budget.
    pub async fn fail_task(&self, task_id: &str, error: &str) -> CoreResult<Task> {
        let task = self.require_task(task_id).await?;
        if task.status == TaskStatus::Failed {
            return Ok(task);
        }
        self.write_task_status(&task, TaskStatus::Failed, Some(error.to_string()), None)
            .await
    }

    /// `planning -> executing`.
    pub async fn begin_execution(&self, workflow_id: &str) -> CoreResult<Workflow> {
        let workflow = self.require_workflow(workflow_id).await?;
        if workflow.status == WorkflowStatus::Executing {
            return Ok(workflow);
        }
        self.set_workflow_status(&workflow, WorkflowStatus::Executing, WorkflowPatch::default())
            .await
    }

    /// Marks the workflow failed. In-flight tasks keep running; nothing new is dispatched.
    pub async fn fail_workflow(&self, workflow_id: &str, reason: &str) -> CoreResult<Workflow> {
        let workflow = self.require_workflow(workflow_id).await?;
        if workflow.status == WorkflowStatus::Failed {
            return Ok(workflow);
        }
        let patch = WorkflowPatch {
            error: Some(Some(reason.to_string())),
            ..Default::default()
        };
        let workflow = self
            .set_workflow_status(&workflow, WorkflowStatus::Failed, patch)
            .await?;
        tracing::error!(
            target: "forgeflow.orchestrator",
            stage = "fail",
            workflow_id = %workflow.id,
            reason,
            "workflow failed"
        );
        Ok(workflow)
    }

    /// Advances `executing -> testing -> reviewing -> completed` from task status per phase.
    ///
    /// A workflow whose remaining tasks are all blocked behind failures is failed.
    pub async fn refresh_workflow_status(&self, workflow_id: &str) -> CoreResult<Workflow> {
        let mut workflow = self.require_workflow(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Ok(workflow);
        }
        let tasks = self.get_workflow_tasks(workflow_id).await?;

        let failed = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        let stalled = tasks
            .iter()
            .all(|t| t.status.is_terminal() || t.status == TaskStatus::Blocked);
        if failed > 0 && stalled {
            return self
                .fail_workflow(
                    workflow_id,
                    &format!("{failed} task(s) failed; remaining tasks cannot be released"),
                )
                .await;
        }

        let by_phase = phase_completion(&tasks);
        // executing covers phases 1-2, testing phase 3, reviewing phases 4-5
        loop {
            let done_through = match workflow.status {
                WorkflowStatus::Executing => 2,
                WorkflowStatus::Testing => 3,
                WorkflowStatus::Reviewing => 5,
                _ => break,
            };
            let complete = (1..=done_through).all(|p| by_phase.get(&p).copied().unwrap_or(true));
            if !complete {
                break;
            }
            let Some(next) = WorkflowTransition::next(workflow.status) else {
                break;
            };
            let patch = if next == WorkflowStatus::Completed {
                WorkflowPatch {
                    completed_at: Some(Some(Utc::now())),
                    ..Default::default()
                }
            } else {
                WorkflowPatch::default()
            };
            workflow = self.set_workflow_status(&workflow, next, patch).await?;
        }
        Ok(workflow)
    }

    async fn require_task(&self, task_id: &str) -> CoreResult<Task> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task", task_id))
    }

    async fn require_workflow(&self, workflow_id: &str) -> CoreResult<Workflow> {
        self.get_workflow(workflow_id)
            .await?
            .ok_or_else(|| CoreError::not_found("workflow", workflow_id))
    }

    async fn write_task_status(
        &self,
        task: &Task,
        status: TaskStatus,
        error: Option<String>,
        retry_count: Option<u32>,
    ) -> CoreResult<Task> {
        TaskTransition::validate(task.status, status)?;
        if status == TaskStatus::Assigned {
            self.ensure_dependencies_completed(task).await?;
        }

        let now = Utc::now();
        let mut patch = TaskPatch::status(status);
        patch.retry_count = retry_count;
        if let Some(error) = error {
            patch.error = Some(Some(error));
        }
        match status {
            TaskStatus::InProgress if task.started_at.is_none() => {
                patch.started_at = Some(Some(now));
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                patch.completed_at = Some(Some(now));
            }
            _ => {}
        }

        let updated = self
            .timed("update_task", self.store.update_task(&task.id, patch))
            .await?;
        self.events.emit(FlowEvent::TaskStatusChanged {
            task_id: updated.id.clone(),
            workflow_id: updated.workflow_id.clone(),
            from: task.status,
            to: updated.status,
            timestamp: now,
        });
        tracing::debug!(
            target: "forgeflow.orchestrator",
            stage = "task-status",
            task_id = %updated.id,
            from = task.status.as_str(),
            to = updated.status.as_str(),
            "task status updated"
        );
        Ok(updated)
    }

    async fn ensure_dependencies_completed(&self, task: &Task) -> CoreResult<()> {
        let mut unmet = Vec::new();
        for dep_id in &task.dependencies {
            match self.get_task(dep_id).await? {
                Some(dep) if dep.status == TaskStatus::Completed => {}
                Some(_) => unmet.push(dep_id.clone()),
                None => return Err(CoreError::not_found("task", dep_id.clone())),
            }
        }
        if unmet.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "task {} has unmet dependencies: {}",
                task.id,
                unmet.join(", ")
            )))
        }
    }

    async fn set_workflow_status(
        &self,
        workflow: &Workflow,
        status: WorkflowStatus,
        mut patch: WorkflowPatch,
    ) -> CoreResult<Workflow> {
        WorkflowTransition::validate(workflow.status, status)?;
        patch.status = Some(status);
        let updated = self
            .timed(
                "update_workflow",
                self.store.update_workflow(&workflow.id, patch),
            )
            .await?;
        let now = Utc::now();
        self.events.emit(FlowEvent::WorkflowStatusChanged {
            workflow_id: updated.id.clone(),
            from: workflow.status,
            to: updated.status,
            timestamp: now,
        });
        if updated.status.is_terminal() {
            self.events.emit(FlowEvent::WorkflowFinished {
                workflow_id: updated.id.clone(),
                status: updated.status,
                timestamp: now,
            });
        }
        tracing::info!(
            target: "forgeflow.orchestrator",
            stage = "workflow-status",
            workflow_id = %updated.id,
            from = workflow.status.as_str(),
            to = updated.status.as_str(),
            "{}",
            WorkflowTransition::description(updated.status)
        );
        Ok(updated)
    }

    async fn timed<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = CoreResult<T>>,
    ) -> CoreResult<T> {
        with_timeout(operation, self.store_timeout, fut).await
    }
}

/// phase number -> every task of that phase completed
fn phase_completion(tasks: &[Task]) -> HashMap<u32, bool> {
    let mut out: HashMap<u32, bool> = HashMap::new();
    for task in tasks {
        let entry = out.entry(task.phase).or_insert(true);
        *entry &= task.status == TaskStatus::Completed;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::model::{AcceptanceCriterion, TaskPriority, UserStory};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn orchestrator() -> Orchestrator {
        let cfg = AppConfig::default();
        Orchestrator::new(
            Arc::new(MemoryStore::new()),
            OrchestratorConfig {
                chunk_size: 2,
                ..cfg.orchestrator
            },
            &cfg.persistence,
            EventBus::new(),
        )
    }

    fn requirement(stories: usize) -> Requirement {
        Requirement {
            id: "REQ-1".into(),
            title: "Checkout".into(),
            user_stories: (1..=stories)
                .map(|i| UserStory {
                    id: format!("US-{i}"),
                    title: format!("Story {i}"),
                    ..Default::default()
                })
                .collect(),
            acceptance_criteria: (1..=stories)
                .map(|i| AcceptanceCriterion {
                    id: format!("AC-{i}"),
                    description: format!("criterion {i}"),
                    story_id: Some(format!("US-{i}")),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn start_workflow_plans_and_persists() {
        let orch = orchestrator();
        let mut events = orch.subscribe();
        let wf = orch.start_workflow(requirement(4), "tester").await.unwrap();

        assert_eq!(wf.status, WorkflowStatus::Planning);
        assert_eq!(wf.plan.phases.len(), 5);
        assert_eq!(wf.task_ids.len(), 2);

        let tasks = orch.get_workflow_tasks(&wf.id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].dependencies, vec![tasks[0].id.clone()]);

        // created -> validating -> planning, then the creation event
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.last(), Some(FlowEvent::WorkflowCreated { task_count: 2, .. })));
    }

    #[tokio::test]
    async fn incomplete_requirement_names_every_missing_field() {
        let orch = orchestrator();
        let err = orch
            .start_workflow(Requirement::default(), "tester")
            .await
            .unwrap_err();
        match err {
            CoreError::Validation { fields, .. } => {
                assert!(fields.contains(&"id".to_string()));
                assert!(fields.contains(&"title".to_string()));
                assert!(fields.contains(&"user_stories".to_string()));
                assert!(fields.contains(&"acceptance_criteria".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_records_are_none_not_errors() {
        let orch = orchestrator();
        assert!(orch.get_workflow("nope").await.unwrap().is_none());
        assert!(orch.get_workflow_tasks("nope").await.unwrap().is_empty());
        let err = orch
            .update_task_status("nope", TaskStatus::Assigned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "task", .. }));
    }

    #[tokio::test]
    async fn assignment_waits_for_dependencies() {
        let orch = orchestrator();
        let wf = orch.start_workflow(requirement(4), "tester").await.unwrap();
        let tasks = orch.get_workflow_tasks(&wf.id).await.unwrap();

        let err = orch
            .update_task_status(&tasks[1].id, TaskStatus::Assigned, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        orch.update_task_status(&tasks[0].id, TaskStatus::Assigned, None)
            .await
            .unwrap();
        let started = orch
            .update_task_status(&tasks[0].id, TaskStatus::InProgress, None)
            .await
            .unwrap();
        assert!(started.started_at.is_some());
        let done = orch
            .update_task_status(&tasks[0].id, TaskStatus::Completed, None)
            .await
            .unwrap();
        assert!(done.completed_at.is_some());

        orch.update_task_status(&tasks[1].id, TaskStatus::Assigned, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn retry_count_is_capped_and_ends_failed() {
        let orch = orchestrator();
        let wf = orch.start_workflow(requirement(1), "tester").await.unwrap();
        let id = wf.task_ids[0].clone();

        let mut last = None;
        for attempt in 1..=3u32 {
            orch.update_task_status(&id, TaskStatus::Assigned, None)
                .await
                .unwrap();
            orch.update_task_status(&id, TaskStatus::InProgress, None)
                .await
                .unwrap();
            let task = orch.record_task_failure(&id, "generator down").await.unwrap();
            assert_eq!(task.retry_count, attempt);
            last = Some(task);
        }
        let task = last.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("generator down"));
        assert!(task.retry_count <= task.max_retries);
    }

    #[tokio::test]
    async fn next_pending_prefers_priority_then_age() {
        let store = Arc::new(MemoryStore::new());
        let cfg = AppConfig::default();
        let orch = Orchestrator::new(
            store.clone(),
            cfg.orchestrator.clone(),
            &cfg.persistence,
            EventBus::new(),
        );
        let low = Task::new("w1", AgentType::Backend, "low").with_priority(TaskPriority::Low);
        let high_old = Task::new("w1", AgentType::Backend, "high-old").with_priority(TaskPriority::High);
        let high_new = Task::new("w1", AgentType::Backend, "high-new").with_priority(TaskPriority::High);
        let other = Task::new("w1", AgentType::Frontend, "ui").with_priority(TaskPriority::Critical);
        for t in [&low, &high_old, &high_new, &other] {
            store.insert_task(t).await.unwrap();
        }

        let next = orch
            .get_next_pending_task(AgentType::Backend)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, high_old.id);
        assert!(orch
            .get_next_pending_task(AgentType::Security)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn workflow_completes_when_all_tasks_complete() {
        let orch = orchestrator();
        let wf = orch.start_workflow(requirement(1), "tester").await.unwrap();
        orch.begin_execution(&wf.id).await.unwrap();
        let id = wf.task_ids[0].clone();
        for status in [TaskStatus::Assigned, TaskStatus::InProgress, TaskStatus::Completed] {
            orch.update_task_status(&id, status, None).await.unwrap();
        }
        let wf = orch.refresh_workflow_status(&wf.id).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_workflow_is_terminal() {
        let orch = orchestrator();
        let wf = orch.start_workflow(requirement(1), "tester").await.unwrap();
        let failed = orch.fail_workflow(&wf.id, "operator cancelled").await.unwrap();
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert!(orch.begin_execution(&wf.id).await.is_err());
    }
}
