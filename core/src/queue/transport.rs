use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

use super::payload::JobPayload;
use super::retry::RetryStrategy;

/// One unit of work handed to a lane processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Idempotency key; the dispatcher uses the task id.
    pub id: String,
    pub lane: String,
    pub payload: JobPayload,
    pub priority: u32,
    /// Attempts started so far, including the one in progress.
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn is_last_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub attempts_made: u32,
    pub last_error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStats {
    pub active: usize,
    pub waiting: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A job with the same id already exists on the lane; nothing was added.
    Duplicate,
}

#[derive(Clone)]
pub struct LaneOptions {
    pub concurrency: usize,
    pub retry: Arc<dyn RetryStrategy>,
}

impl std::fmt::Debug for LaneOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneOptions")
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry.name())
            .field("max_attempts", &self.retry.max_attempts())
            .finish()
    }
}

/// Lane processor. A returned error is retried when [`crate::error::CoreError::is_retryable`]
/// holds and attempts remain; any other error fails the job.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> CoreResult<()>;
}

/// Named-lane job transport.
#[async_trait::async_trait]
pub trait JobTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn create_lane(&self, lane: &str, options: LaneOptions) -> CoreResult<()>;

    async fn enqueue(
        &self,
        lane: &str,
        job_id: &str,
        payload: JobPayload,
        priority: u32,
    ) -> CoreResult<EnqueueOutcome>;

    /// Binds the single processor of `lane`; a second binding is a conflict.
    async fn register_processor(&self, lane: &str, handler: Arc<dyn JobHandler>)
        -> CoreResult<()>;

    async fn get_status(&self, lane: &str, job_id: &str) -> CoreResult<Option<JobStatus>>;

    async fn stats(&self, lane: &str) -> CoreResult<LaneStats>;

    /// Stops taking new jobs and waits for in-flight handlers.
    async fn close(&self) -> CoreResult<()>;
}
