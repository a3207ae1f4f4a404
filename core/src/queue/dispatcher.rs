use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::QueueConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, Task, TaskPriority};

use super::payload::JobPayload;
use super::retry::{ExponentialBackoff, RetryConfig, RetryStrategy};
use super::transport::{EnqueueOutcome, JobHandler, JobStatus, JobTransport, LaneOptions, LaneStats};

/// Builds the retry strategy of one lane from its resolved settings.
pub type RetryStrategyBuilder = dyn Fn(AgentType, &RetryConfig) -> Arc<dyn RetryStrategy> + Send + Sync;

/// Routes tasks to their capability lane.
pub struct QueueDispatcher {
    transport: Arc<dyn JobTransport>,
}

impl QueueDispatcher {
    /// Creates one lane per capability with exponential backoff.
    pub async fn new(transport: Arc<dyn JobTransport>, cfg: &QueueConfig) -> CoreResult<Self> {
        let build_retry = |_: AgentType, retry: &RetryConfig| -> Arc<dyn RetryStrategy> {
            Arc::new(ExponentialBackoff::new(retry.clone()))
        };
        Self::with_retry_strategy(transport, cfg, &build_retry).await
    }

    pub async fn with_retry_strategy(
        transport: Arc<dyn JobTransport>,
        cfg: &QueueConfig,
        build_retry: &RetryStrategyBuilder,
    ) -> CoreResult<Self> {
        for agent_type in AgentType::ALL {
            let lane = cfg.lane(agent_type);
            let retry = RetryConfig {
                base_delay_ms: lane.backoff_base_ms.unwrap_or(cfg.backoff_base_ms),
                max_delay_ms: cfg.backoff_max_ms,
                max_attempts: lane.attempts.unwrap_or(cfg.attempts),
            };
            let options = LaneOptions {
                concurrency: lane
                    .concurrency
                    .unwrap_or_else(|| agent_type.default_concurrency()),
                retry: build_retry(agent_type, &retry),
            };
            transport.create_lane(&agent_type.lane(), options).await?;
        }
        tracing::info!(
            target: "forgeflow.queue",
            transport = transport.name(),
            lanes = AgentType::ALL.len(),
            "queue lanes ready"
        );
        Ok(Self { transport })
    }

    pub fn priority_score(priority: TaskPriority) -> u32 {
        priority.score()
    }

    /// Enqueues `task` on its lane with no delay, keyed by task id.
    pub async fn queue_task(&self, task: &Task, payload: JobPayload) -> CoreResult<EnqueueOutcome> {
        payload.validate_for(task)?;
        let lane = task.agent_type.lane();
        let score = Self::priority_score(task.priority);
        let outcome = self
            .transport
            .enqueue(&lane, &task.id, payload, score)
            .await?;
        match outcome {
            EnqueueOutcome::Enqueued => tracing::info!(
                target: "forgeflow.queue",
                stage = "enqueue",
                lane = %lane,
                task_id = %task.id,
                priority = %task.priority.as_str(),
                score,
                "task queued"
            ),
            EnqueueOutcome::Duplicate => tracing::debug!(
                target: "forgeflow.queue",
                stage = "enqueue",
                lane = %lane,
                task_id = %task.id,
                "task already queued"
            ),
        }
        Ok(outcome)
    }

    /// Binds the processor of a capability lane; a lane takes exactly one.
    pub async fn process_jobs(
        &self,
        capability: AgentType,
        handler: Arc<dyn JobHandler>,
    ) -> CoreResult<()> {
        self.transport
            .register_processor(&capability.lane(), handler)
            .await
            .map_err(|e| match e {
                CoreError::Conflict(_) => CoreError::Conflict(format!(
                    "processor already registered for {capability}"
                )),
                other => other,
            })?;
        tracing::info!(target: "forgeflow.queue", lane = %capability.lane(), "processor bound");
        Ok(())
    }

    pub async fn job_status(&self, task: &Task) -> CoreResult<Option<JobStatus>> {
        self.transport
            .get_status(&task.agent_type.lane(), &task.id)
            .await
    }

    pub async fn get_queue_stats(&self) -> CoreResult<BTreeMap<AgentType, LaneStats>> {
        let mut out = BTreeMap::new();
        for agent_type in AgentType::ALL {
            out.insert(agent_type, self.transport.stats(&agent_type.lane()).await?);
        }
        Ok(out)
    }

    pub async fn close(&self) -> CoreResult<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Requirement;
    use crate::queue::LocalTransport;

    fn backend_task(priority: TaskPriority) -> Task {
        Task::new("w1", AgentType::Backend, "api")
            .with_priority(priority)
            .with_target_module("orders")
    }

    fn payload(task: &Task) -> JobPayload {
        let mut task = task.clone();
        task.story_ids = vec!["US-1".into()];
        JobPayload::for_task(&task, &Requirement::default())
    }

    #[test]
    fn scores_are_ordered_and_unknown_is_medium() {
        assert!(
            QueueDispatcher::priority_score(TaskPriority::Critical)
                > QueueDispatcher::priority_score(TaskPriority::High)
        );
        let unknown: TaskPriority = serde_json::from_str("\"urgent-ish\"").unwrap();
        assert_eq!(QueueDispatcher::priority_score(unknown), 25);
    }

    #[tokio::test]
    async fn requeue_of_same_task_is_idempotent() {
        let dispatcher = QueueDispatcher::new(Arc::new(LocalTransport::new()), &QueueConfig::default())
            .await
            .unwrap();
        let task = backend_task(TaskPriority::High);
        let first = dispatcher.queue_task(&task, payload(&task)).await.unwrap();
        let second = dispatcher.queue_task(&task, payload(&task)).await.unwrap();
        assert_eq!(first, EnqueueOutcome::Enqueued);
        assert_eq!(second, EnqueueOutcome::Duplicate);

        let stats = dispatcher.get_queue_stats().await.unwrap();
        assert_eq!(stats[&AgentType::Backend].waiting, 1);
        assert_eq!(stats.len(), AgentType::ALL.len());
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_before_enqueue() {
        let dispatcher = QueueDispatcher::new(Arc::new(LocalTransport::new()), &QueueConfig::default())
            .await
            .unwrap();
        let task = backend_task(TaskPriority::Low);
        // no story ids
        let payload = JobPayload::for_task(&task, &Requirement::default());
        let err = dispatcher.queue_task(&task, payload).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(dispatcher.job_status(&task).await.unwrap().is_none());
    }
}
