use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::error::{CoreError, CoreResult};

use super::payload::JobPayload;
use super::transport::{
    EnqueueOutcome, Job, JobHandler, JobState, JobStatus, JobTransport, LaneOptions, LaneStats,
};

const IDLE_POLL: Duration = Duration::from_millis(100);

/// Heap entry: higher priority first, then lower sequence (FIFO within a band).
#[derive(Debug, PartialEq, Eq)]
struct Queued {
    priority: u32,
    seq: u64,
    job_id: String,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct JobRecord {
    job: Job,
    state: JobState,
    last_error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LaneState {
    seq: u64,
    waiting: BinaryHeap<Queued>,
    // Completed and failed jobs stay here for audit.
    jobs: HashMap<String, JobRecord>,
}

impl LaneState {
    fn push(&mut self, job_id: &str, priority: u32) {
        self.seq += 1;
        self.waiting.push(Queued {
            priority,
            seq: self.seq,
            job_id: job_id.to_string(),
        });
    }
}

struct Lane {
    name: String,
    options: LaneOptions,
    state: Mutex<LaneState>,
    notify: Notify,
    closed: AtomicBool,
    bound: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Lane {
    fn new(name: &str, options: LaneOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            state: Mutex::new(LaneState::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            bound: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    async fn claim(&self) -> Option<Job> {
        let mut state = self.state.lock().await;
        while let Some(next) = state.waiting.pop() {
            if let Some(record) = state.jobs.get_mut(&next.job_id) {
                if record.state == JobState::Waiting {
                    record.state = JobState::Active;
                    record.job.attempts_made += 1;
                    return Some(record.job.clone());
                }
            }
        }
        None
    }

    async fn settle(self: &Arc<Self>, job: &Job, result: CoreResult<()>) {
        let mut state = self.state.lock().await;
        let Some(record) = state.jobs.get_mut(&job.id) else {
            return;
        };

        let err = match result {
            Ok(()) => {
                record.state = JobState::Completed;
                record.finished_at = Some(Utc::now());
                tracing::debug!(
                    target: "forgeflow.queue",
                    lane = %self.name,
                    job_id = %job.id,
                    attempt = job.attempts_made,
                    "job completed"
                );
                return;
            }
            Err(err) => err,
        };

        let message = err.to_string();
        record.last_error = Some(message.clone());
        let retry = &self.options.retry;
        let delay = if err.is_retryable() && retry.should_retry(job.attempts_made, &message) {
            retry.next_delay(job.attempts_made.saturating_sub(1), &message)
        } else {
            None
        };

        match delay {
            Some(delay) => {
                record.state = JobState::Delayed;
                tracing::warn!(
                    target: "forgeflow.queue",
                    lane = %self.name,
                    job_id = %job.id,
                    attempt = job.attempts_made,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "job failed, retrying"
                );
                let lane = Arc::clone(self);
                let job_id = job.id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    lane.requeue(&job_id).await;
                });
            }
            None => {
                record.state = JobState::Failed;
                record.finished_at = Some(Utc::now());
                tracing::error!(
                    target: "forgeflow.queue",
                    lane = %self.name,
                    job_id = %job.id,
                    attempts = job.attempts_made,
                    error = %message,
                    "job failed"
                );
            }
        }
    }

    async fn requeue(&self, job_id: &str) {
        if self.is_closed() {
            return;
        }
        let mut state = self.state.lock().await;
        let priority = match state.jobs.get_mut(job_id) {
            Some(record) if record.state == JobState::Delayed => {
                record.state = JobState::Waiting;
                record.job.priority
            }
            _ => return,
        };
        state.push(job_id, priority);
        drop(state);
        self.notify.notify_one();
    }

    async fn stats(&self) -> LaneStats {
        let state = self.state.lock().await;
        let mut stats = LaneStats::default();
        for record in state.jobs.values() {
            match record.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

async fn run_worker(lane: Arc<Lane>, handler: Arc<dyn JobHandler>, worker: usize) {
    tracing::debug!(target: "forgeflow.queue", lane = %lane.name, worker, "worker started");
    while !lane.is_closed() {
        match lane.claim().await {
            Some(job) => {
                let result = handler.handle(job.clone()).await;
                lane.settle(&job, result).await;
            }
            None => {
                let _ = tokio::time::timeout(IDLE_POLL, lane.notify.notified()).await;
            }
        }
    }
    tracing::debug!(target: "forgeflow.queue", lane = %lane.name, worker, "worker stopped");
}

/// In-process job transport: priority lanes served by tokio worker tasks.
#[derive(Default)]
pub struct LocalTransport {
    lanes: RwLock<HashMap<String, Arc<Lane>>>,
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lane(&self, name: &str) -> CoreResult<Arc<Lane>> {
        self.lanes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_found("lane", name))
    }
}

#[async_trait::async_trait]
impl JobTransport for LocalTransport {
    fn name(&self) -> &str {
        "local"
    }

    async fn create_lane(&self, lane: &str, options: LaneOptions) -> CoreResult<()> {
        let mut lanes = self.lanes.write().await;
        if lanes.contains_key(lane) {
            return Err(CoreError::Conflict(format!("lane {lane} already exists")));
        }
        tracing::debug!(target: "forgeflow.queue", lane, options = ?options, "lane created");
        lanes.insert(lane.to_string(), Arc::new(Lane::new(lane, options)));
        Ok(())
    }

    async fn enqueue(
        &self,
        lane: &str,
        job_id: &str,
        payload: JobPayload,
        priority: u32,
    ) -> CoreResult<EnqueueOutcome> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(CoreError::Conflict("transport is closed".into()));
        }
        let lane = self.lane(lane).await?;
        let mut state = lane.state.lock().await;
        if state.jobs.contains_key(job_id) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        let job = Job {
            id: job_id.to_string(),
            lane: lane.name.clone(),
            payload,
            priority,
            attempts_made: 0,
            max_attempts: lane.options.retry.max_attempts(),
            enqueued_at: Utc::now(),
        };
        state.jobs.insert(
            job_id.to_string(),
            JobRecord {
                job,
                state: JobState::Waiting,
                last_error: None,
                finished_at: None,
            },
        );
        state.push(job_id, priority);
        drop(state);
        lane.notify.notify_one();
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn register_processor(
        &self,
        lane: &str,
        handler: Arc<dyn JobHandler>,
    ) -> CoreResult<()> {
        let lane = self.lane(lane).await?;
        if lane.bound.swap(true, AtomicOrdering::SeqCst) {
            return Err(CoreError::Conflict(format!(
                "lane {} already has a processor",
                lane.name
            )));
        }
        let mut workers = lane.workers.lock().await;
        for worker in 0..lane.options.concurrency.max(1) {
            workers.push(tokio::spawn(run_worker(
                Arc::clone(&lane),
                Arc::clone(&handler),
                worker,
            )));
        }
        Ok(())
    }

    async fn get_status(&self, lane: &str, job_id: &str) -> CoreResult<Option<JobStatus>> {
        let lane = self.lane(lane).await?;
        let state = lane.state.lock().await;
        Ok(state.jobs.get(job_id).map(|record| JobStatus {
            id: record.job.id.clone(),
            state: record.state,
            attempts_made: record.job.attempts_made,
            last_error: record.last_error.clone(),
            finished_at: record.finished_at,
        }))
    }

    async fn stats(&self, lane: &str) -> CoreResult<LaneStats> {
        Ok(self.lane(lane).await?.stats().await)
    }

    async fn close(&self) -> CoreResult<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        let lanes: Vec<Arc<Lane>> = self.lanes.read().await.values().cloned().collect();
        let mut pending = Vec::new();
        for lane in &lanes {
            lane.closed.store(true, AtomicOrdering::SeqCst);
            lane.notify.notify_waiters();
            let handles: Vec<JoinHandle<()>> = lane.workers.lock().await.drain(..).collect();
            pending.extend(handles.into_iter().map(|h| (lane.name.clone(), h)));
        }
        let (names, handles): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        for (lane, joined) in names.iter().zip(futures::future::join_all(handles).await) {
            if let Err(e) = joined {
                tracing::warn!(target: "forgeflow.queue", lane = %lane, error = %e, "worker join failed");
            }
        }
        Ok(())
    }
}
