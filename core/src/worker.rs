use std::sync::Arc;

use async_trait::async_trait;

use crate::coordinator::AgentCoordinator;
use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, GenerationResult, Task, TaskStatus, Workflow, WorkflowStatus};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{run_pipeline, AgentExecutionContext, CapabilityExecutor};
use crate::queue::{Job, JobHandler, JobPayload, QueueDispatcher};
use crate::state::TaskTransition;

/// Processor bound to one capability lane.
///
/// Each job drives its task through `assigned -> in_progress`, runs the
/// pipeline, then reports the outcome to the coordinator. Tasks released by a
/// completion are enqueued from here.
pub struct LaneWorker {
    capability: AgentType,
    orchestrator: Arc<Orchestrator>,
    coordinator: Arc<AgentCoordinator>,
    dispatcher: Arc<QueueDispatcher>,
    executor: Arc<dyn CapabilityExecutor>,
    context: Option<Arc<AgentExecutionContext>>,
}

impl LaneWorker {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        coordinator: Arc<AgentCoordinator>,
        dispatcher: Arc<QueueDispatcher>,
        executor: Arc<dyn CapabilityExecutor>,
        context: Option<Arc<AgentExecutionContext>>,
    ) -> Self {
        Self {
            capability: executor.capability(),
            orchestrator,
            coordinator,
            dispatcher,
            executor,
            context,
        }
    }

    pub fn capability(&self) -> AgentType {
        self.capability
    }

    async fn load(&self, payload: &JobPayload) -> CoreResult<(Task, Workflow)> {
        let task = self
            .orchestrator
            .get_task(payload.task_id())
            .await?
            .ok_or_else(|| CoreError::not_found("task", payload.task_id()))?;
        let workflow = self
            .orchestrator
            .get_workflow(&task.workflow_id)
            .await?
            .ok_or_else(|| CoreError::not_found("workflow", task.workflow_id.clone()))?;
        Ok((task, workflow))
    }

    /// Moves the task to `in_progress`, picking up wherever an earlier attempt stopped.
    async fn claim(&self, task: Task) -> CoreResult<Task> {
        let task = if TaskTransition::is_dispatchable(task.status) {
            self.orchestrator
                .update_task_status(&task.id, TaskStatus::Assigned, None)
                .await?
        } else {
            task
        };
        match task.status {
            TaskStatus::Assigned => {
                self.orchestrator
                    .update_task_status(&task.id, TaskStatus::InProgress, None)
                    .await
            }
            TaskStatus::InProgress => Ok(task),
            other => Err(CoreError::Conflict(format!(
                "task {} is {} and cannot be executed",
                task.id, other
            ))),
        }
    }

    async fn on_success(
        &self,
        task: &Task,
        workflow: &Workflow,
        result: &GenerationResult,
    ) -> CoreResult<()> {
        let report = self
            .coordinator
            .report_task_completion(&task.id, &workflow.id, result)
            .await?;

        if report.workflow.status == WorkflowStatus::Failed {
            return Ok(());
        }
        for released in &report.released {
            let payload = JobPayload::for_task(released, &workflow.requirement);
            let outcome = self.dispatcher.queue_task(released, payload).await?;
            tracing::debug!(
                target: "forgeflow.worker",
                stage = "release",
                task_id = %released.id,
                agent_type = %released.agent_type,
                outcome = ?outcome,
                "released task enqueued"
            );
        }
        Ok(())
    }

    /// Terminal failure: the task fails and the coordinator applies its policy downstream.
    async fn fail_terminally(&self, task: &Task, reason: &str) -> CoreResult<()> {
        self.orchestrator.fail_task(&task.id, reason).await?;
        let report = self
            .coordinator
            .report_task_failure(&task.id, &task.workflow_id, reason)
            .await?;
        tracing::warn!(
            target: "forgeflow.worker",
            stage = "fail",
            task_id = %task.id,
            workflow_id = %task.workflow_id,
            failed_dependents = report.failed_dependents.len(),
            blocked_dependents = report.blocked_dependents.len(),
            workflow_status = report.workflow.status.as_str(),
            reason,
            "task failed"
        );
        Ok(())
    }

    /// Job of a workflow that failed in the meantime.
    ///
    /// Tasks that never started are dropped. A task already on its way (`assigned`,
    /// `in_progress` or `retry`) is failed so it cannot linger, and the job is
    /// retained as failed.
    async fn abandon(&self, task: &Task, workflow: &Workflow) -> CoreResult<()> {
        if matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
            tracing::info!(
                target: "forgeflow.worker",
                stage = "skip",
                task_id = %task.id,
                workflow_id = %workflow.id,
                "workflow already failed; job dropped"
            );
            return Ok(());
        }

        let reason = format!(
            "workflow {} failed before the next attempt of task {}",
            workflow.id, task.id
        );
        let failed = self.orchestrator.fail_task(&task.id, &reason).await?;
        tracing::warn!(
            target: "forgeflow.worker",
            stage = "cancel",
            task_id = %failed.id,
            workflow_id = %workflow.id,
            retry_count = failed.retry_count,
            "task cancelled with its workflow"
        );
        Err(CoreError::Conflict(reason))
    }

    /// Always returns `Err`; only a retryable error sends the job back to its lane.
    async fn on_failure(
        &self,
        job: &Job,
        task: &Task,
        reason: &str,
        retryable: bool,
    ) -> CoreResult<()> {
        if !retryable {
            self.fail_terminally(task, reason).await?;
            return Err(CoreError::validation(reason.to_string()));
        }

        let recorded = self.orchestrator.record_task_failure(&task.id, reason).await?;
        if recorded.status == TaskStatus::Failed || job.is_last_attempt() {
            self.fail_terminally(&recorded, reason).await?;
            return Err(CoreError::RetriesExhausted {
                attempts: job.attempts_made,
                last_error: reason.to_string(),
            });
        }
        Err(CoreError::external("pipeline", reason.to_string()))
    }
}

#[async_trait]
impl JobHandler for LaneWorker {
    async fn handle(&self, job: Job) -> CoreResult<()> {
        let (task, workflow) = self.load(&job.payload).await?;

        if task.status.is_terminal() {
            tracing::debug!(
                target: "forgeflow.worker",
                stage = "skip",
                task_id = %task.id,
                status = task.status.as_str(),
                "task already terminal"
            );
            return Ok(());
        }
        if workflow.status == WorkflowStatus::Failed {
            return self.abandon(&task, &workflow).await;
        }

        let task = self.claim(task).await?;
        tracing::info!(
            target: "forgeflow.worker",
            stage = "start",
            task_id = %task.id,
            agent_type = %self.capability,
            attempt = job.attempts_made,
            max_attempts = job.max_attempts,
            "task attempt started"
        );

        let result = match run_pipeline(
            self.context.as_deref(),
            self.executor.as_ref(),
            &task,
            &job.payload,
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                return self
                    .on_failure(&job, &task, &e.to_string(), e.is_retryable())
                    .await;
            }
        };

        if result.success {
            return self.on_success(&task, &workflow, &result).await;
        }

        let (reason, retryable) = result
            .failure
            .as_ref()
            .map(|f| (format!("{}: {}", f.stage, f.reason), f.retryable))
            .unwrap_or_else(|| ("pipeline failed without a reason".to_string(), false));
        self.on_failure(&job, &task, &reason, retryable).await
    }
}
