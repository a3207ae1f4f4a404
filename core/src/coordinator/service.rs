use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::config::FailurePolicy;
use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, GenerationResult, Task, TaskStatus, Workflow};
use crate::orchestrator::Orchestrator;
use crate::state::FlowEvent;
use crate::store::TaskPatch;

use super::graph::TaskGraph;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinationPlan {
    pub workflow_id: String,
    /// A valid release order over every task.
    pub order: Vec<String>,
    /// `order` grouped into independent stages.
    pub stages: Vec<Vec<String>>,
    pub capabilities: Vec<AgentType>,
}

#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub task: Task,
    /// Tasks now eligible for dispatch.
    pub released: Vec<Task>,
    pub still_blocked: Vec<String>,
    pub workflow: Workflow,
}

#[derive(Debug, Clone)]
pub struct FailureReport {
    pub task_id: String,
    pub failed_dependents: Vec<String>,
    pub blocked_dependents: Vec<String>,
    pub workflow: Workflow,
}

/// Dependency-driven release of tasks. Completion reports are the only way a
/// blocked task becomes eligible again.
pub struct AgentCoordinator {
    orchestrator: Arc<Orchestrator>,
    policy: FailurePolicy,
}

impl AgentCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>, policy: FailurePolicy) -> Self {
        Self {
            orchestrator,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn create_coordination_plan(
        &self,
        workflow_id: &str,
        tasks: &[Task],
    ) -> CoreResult<CoordinationPlan> {
        let graph = TaskGraph::from_tasks(tasks)?;
        graph.validate()?;
        let stages = graph.topological_sort()?;
        let order: Vec<String> = stages.iter().flatten().cloned().collect();
        let capabilities: Vec<AgentType> = tasks
            .iter()
            .map(|t| t.agent_type)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!(
            target: "forgeflow.coordinator",
            stage = "plan",
            workflow_id,
            tasks = order.len(),
            stages = stages.len(),
            capabilities = capabilities.len(),
            "coordination plan built"
        );
        Ok(CoordinationPlan {
            workflow_id: workflow_id.to_string(),
            order,
            stages,
            capabilities,
        })
    }

    /// Splits the workflow's open tasks into dispatch-eligible and blocked.
    ///
    /// Returns the eligible tasks in release order.
    pub async fn release_ready(&self, workflow_id: &str) -> CoreResult<Vec<Task>> {
        let tasks = self.orchestrator.get_workflow_tasks(workflow_id).await?;
        let plan = self.create_coordination_plan(workflow_id, &tasks)?;
        let (released, _) = self.settle_open_tasks(workflow_id, &tasks, &plan.order).await?;
        Ok(released)
    }

    /// Marks the task completed, then releases every open task whose dependencies
    /// are all completed. The rest are (or stay) blocked.
    pub async fn report_task_completion(
        &self,
        task_id: &str,
        workflow_id: &str,
        result: &GenerationResult,
    ) -> CoreResult<CompletionReport> {
        if result.task_id != task_id {
            return Err(CoreError::validation(format!(
                "generation result {} belongs to task {}, not {task_id}",
                result.id, result.task_id
            )));
        }
        if !result.success {
            return Err(CoreError::validation(format!(
                "generation result {} did not succeed",
                result.id
            )));
        }

        let current = self
            .orchestrator
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("task", task_id))?;
        if current.workflow_id != workflow_id {
            return Err(CoreError::not_found(
                "task",
                format!("{task_id} in workflow {workflow_id}"),
            ));
        }

        let mut metadata = current.metadata.clone();
        metadata.insert(
            "generation_result_id".into(),
            serde_json::Value::String(result.id.clone()),
        );
        self.orchestrator
            .store()
            .update_task(
                task_id,
                TaskPatch {
                    metadata: Some(metadata),
                    ..Default::default()
                },
            )
            .await?;

        let task = if current.status == TaskStatus::Completed {
            current
        } else {
            self.orchestrator
                .update_task_status(task_id, TaskStatus::Completed, None)
                .await?
        };

        let tasks = self.orchestrator.get_workflow_tasks(workflow_id).await?;
        let plan = self.create_coordination_plan(workflow_id, &tasks)?;
        let (released, still_blocked) =
            self.settle_open_tasks(workflow_id, &tasks, &plan.order).await?;
        let workflow = self
            .orchestrator
            .refresh_workflow_status(workflow_id)
            .await?;

        tracing::info!(
            target: "forgeflow.coordinator",
            stage = "complete",
            workflow_id,
            task_id,
            released = released.len(),
            blocked = still_blocked.len(),
            workflow_status = workflow.status.as_str(),
            "task completion reported"
        );
        Ok(CompletionReport {
            task,
            released,
            still_blocked,
            workflow,
        })
    }

    /// Applies the failure policy to everything downstream of a terminally failed task.
    pub async fn report_task_failure(
        &self,
        task_id: &str,
        workflow_id: &str,
        error: &str,
    ) -> CoreResult<FailureReport> {
        let tasks = self.orchestrator.get_workflow_tasks(workflow_id).await?;
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let failed = by_id
            .get(task_id)
            .ok_or_else(|| CoreError::not_found("task", task_id))?;
        if failed.status != TaskStatus::Failed {
            self.orchestrator.fail_task(task_id, error).await?;
        }

        let graph = TaskGraph::from_tasks(&tasks)?;
        let dependents = graph.dependents_of(task_id);
        let mut failed_dependents = Vec::new();
        let mut blocked_dependents = Vec::new();

        for dep_id in &dependents {
            let Some(dependent) = by_id.get(dep_id.as_str()) else {
                continue;
            };
            if dependent.status.is_terminal() {
                continue;
            }
            match self.policy {
                FailurePolicy::PropagateFailure => {
                    self.orchestrator
                        .fail_task(dep_id, &format!("dependency {task_id} failed: {error}"))
                        .await?;
                    failed_dependents.push(dep_id.clone());
                }
                FailurePolicy::Isolate => {
                    if dependent.status == TaskStatus::Pending {
                        self.orchestrator
                            .update_task_status(dep_id, TaskStatus::Blocked, None)
                            .await?;
                    }
                    blocked_dependents.push(dep_id.clone());
                }
            }
        }

        let workflow = match self.policy {
            FailurePolicy::PropagateFailure => {
                self.orchestrator
                    .fail_workflow(workflow_id, &format!("task {task_id} failed: {error}"))
                    .await?
            }
            FailurePolicy::Isolate => {
                self.orchestrator
                    .refresh_workflow_status(workflow_id)
                    .await?
            }
        };

        tracing::warn!(
            target: "forgeflow.coordinator",
            stage = "failure",
            workflow_id,
            task_id,
            policy = ?self.policy,
            failed_dependents = failed_dependents.len(),
            blocked_dependents = blocked_dependents.len(),
            "task failure reported"
        );
        Ok(FailureReport {
            task_id: task_id.to_string(),
            failed_dependents,
            blocked_dependents,
            workflow,
        })
    }

    async fn settle_open_tasks(
        &self,
        workflow_id: &str,
        tasks: &[Task],
        order: &[String],
    ) -> CoreResult<(Vec<Task>, Vec<String>)> {
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let mut released = Vec::new();
        let mut still_blocked = Vec::new();

        for id in order {
            let Some(task) = by_id.get(id.as_str()) else {
                continue;
            };
            if !matches!(task.status, TaskStatus::Pending | TaskStatus::Blocked) {
                continue;
            }
            let satisfied = task.dependencies.iter().all(|dep| {
                by_id
                    .get(dep.as_str())
                    .is_some_and(|d| d.status == TaskStatus::Completed)
            });

            match (satisfied, task.status) {
                (true, TaskStatus::Blocked) => {
                    let task = self
                        .orchestrator
                        .update_task_status(id, TaskStatus::Pending, None)
                        .await?;
                    self.announce_release(workflow_id, &task);
                    released.push(task);
                }
                (true, _) => {
                    self.announce_release(workflow_id, task);
                    released.push((*task).clone());
                }
                (false, TaskStatus::Pending) => {
                    self.orchestrator
                        .update_task_status(id, TaskStatus::Blocked, None)
                        .await?;
                    still_blocked.push(id.clone());
                }
                (false, _) => still_blocked.push(id.clone()),
            }
        }
        Ok((released, still_blocked))
    }

    fn announce_release(&self, workflow_id: &str, task: &Task) {
        self.orchestrator.events().emit(FlowEvent::TaskReleased {
            task_id: task.id.clone(),
            workflow_id: workflow_id.to_string(),
            agent_type: task.agent_type,
            timestamp: Utc::now(),
        });
        tracing::debug!(
            target: "forgeflow.coordinator",
            stage = "release",
            workflow_id,
            task_id = %task.id,
            lane = %task.agent_type.lane(),
            "task released"
        );
    }
}
