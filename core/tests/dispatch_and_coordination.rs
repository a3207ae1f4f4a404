mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, requirement, single_worker_lane, test_config};
use forgeflow_core::api::{
    AgentCoordinator, AgentType, CoreError, CoreResult, EnqueueOutcome, EventBus, FailurePolicy,
    JobPayload, LocalTransport, MemoryStore, Orchestrator, QueueDispatcher, Task, TaskPriority,
    TaskStatus,
};
use forgeflow_core::queue::{Job, JobHandler};
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};

struct Recorder {
    seen: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl JobHandler for Recorder {
    async fn handle(&self, job: Job) -> CoreResult<()> {
        self.seen.lock().await.push(job.payload.task_id().to_string());
        Ok(())
    }
}

fn test_task(title: &str, priority: TaskPriority) -> Task {
    Task::new("wf-1", AgentType::Test, title)
        .with_priority(priority)
        .with_target_module(format!("{title}_tests"))
}

fn orchestrator() -> Arc<Orchestrator> {
    let cfg = test_config();
    Arc::new(Orchestrator::new(
        Arc::new(MemoryStore::new()),
        cfg.orchestrator.clone(),
        &cfg.persistence,
        EventBus::new(),
    ))
}

#[tokio::test]
async fn higher_priority_jobs_are_delivered_first() {
    let mut cfg = test_config();
    single_worker_lane(&mut cfg, AgentType::Test);
    let dispatcher = QueueDispatcher::new(Arc::new(LocalTransport::new()), &cfg.queue)
        .await
        .unwrap();

    let req = requirement(1);
    let low = test_task("low", TaskPriority::Low);
    let critical = test_task("critical", TaskPriority::Critical);
    let medium = test_task("medium", TaskPriority::Medium);
    for task in [&low, &critical, &medium] {
        let payload = JobPayload::for_task(task, &req);
        assert_eq!(
            dispatcher.queue_task(task, payload).await.unwrap(),
            EnqueueOutcome::Enqueued
        );
    }

    let recorder = Arc::new(Recorder {
        seen: Mutex::new(Vec::new()),
    });
    dispatcher
        .process_jobs(AgentType::Test, recorder.clone())
        .await
        .unwrap();

    let all_seen = eventually(Duration::from_secs(5), || {
        let recorder = recorder.clone();
        async move { recorder.seen.lock().await.len() == 3 }
    })
    .await;
    assert!(all_seen);
    assert_eq!(
        *recorder.seen.lock().await,
        vec![critical.id.clone(), medium.id.clone(), low.id.clone()]
    );
    dispatcher.close().await.unwrap();
}

#[tokio::test]
async fn requeueing_a_task_is_idempotent() {
    let dispatcher = QueueDispatcher::new(Arc::new(LocalTransport::new()), &test_config().queue)
        .await
        .unwrap();
    let task = test_task("checkout", TaskPriority::High);
    let req = requirement(1);

    let first = dispatcher
        .queue_task(&task, JobPayload::for_task(&task, &req))
        .await;
    let second = dispatcher
        .queue_task(&task, JobPayload::for_task(&task, &req))
        .await;
    assert_eq!(assert_ok!(first), EnqueueOutcome::Enqueued);
    assert_eq!(assert_ok!(second), EnqueueOutcome::Duplicate);

    let stats = dispatcher.get_queue_stats().await.unwrap();
    assert_eq!(stats[&AgentType::Test].waiting, 1);
    dispatcher.close().await.unwrap();
}

#[tokio::test]
async fn payload_for_another_capability_is_refused() {
    let dispatcher = QueueDispatcher::new(Arc::new(LocalTransport::new()), &test_config().queue)
        .await
        .unwrap();
    let task = test_task("checkout", TaskPriority::High);
    let other = Task::new("wf-1", AgentType::Security, "scan").with_target_module("scan_audit");
    let payload = JobPayload::for_task(&other, &requirement(1));

    let err = assert_err!(dispatcher.queue_task(&task, payload).await);
    assert!(matches!(err, CoreError::Validation { .. }));
    dispatcher.close().await.unwrap();
}

#[tokio::test]
async fn phase_one_tasks_are_chunked_and_chained() {
    let orchestrator = orchestrator();
    let workflow = orchestrator
        .start_workflow(requirement(4), "tester")
        .await
        .unwrap();

    let names: Vec<&str> = workflow.plan.phases.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "capability-development",
            "dependent-capability-development",
            "test-generation",
            "quality-validation",
            "integration",
        ]
    );

    let tasks = orchestrator.get_workflow_tasks(&workflow.id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    let first = tasks.iter().find(|t| t.dependencies.is_empty()).unwrap();
    let second = tasks.iter().find(|t| !t.dependencies.is_empty()).unwrap();
    assert_eq!(second.dependencies, vec![first.id.clone()]);
    assert_eq!(first.story_ids, vec!["US-1".to_string(), "US-2".to_string()]);
    assert_eq!(first.priority, TaskPriority::High);
    assert_eq!(second.priority, TaskPriority::Medium);
}

#[tokio::test]
async fn assignment_waits_for_dependencies() {
    let orchestrator = orchestrator();
    let workflow = orchestrator
        .start_workflow(requirement(4), "tester")
        .await
        .unwrap();
    let tasks = orchestrator.get_workflow_tasks(&workflow.id).await.unwrap();
    let second = tasks.iter().find(|t| !t.dependencies.is_empty()).unwrap();

    let err = orchestrator
        .update_task_status(&second.id, TaskStatus::Assigned, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)), "{err:?}");

    let unchanged = orchestrator.get_task(&second.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::Pending);
}

#[tokio::test]
async fn cyclic_dependencies_are_detected() {
    let coordinator = AgentCoordinator::new(orchestrator(), FailurePolicy::PropagateFailure);
    let mut a = test_task("a", TaskPriority::Medium);
    let mut b = test_task("b", TaskPriority::Medium);
    a.dependencies = vec![b.id.clone()];
    b.dependencies = vec![a.id.clone()];

    let err = coordinator
        .create_coordination_plan("wf-1", &[a, b])
        .unwrap_err();
    assert!(matches!(err, CoreError::CycleDetected(_)), "{err:?}");
}

#[tokio::test]
async fn isolate_policy_blocks_dependents_only() {
    let orchestrator = orchestrator();
    let coordinator = AgentCoordinator::new(orchestrator.clone(), FailurePolicy::Isolate);
    let workflow = orchestrator
        .start_workflow(requirement(4), "tester")
        .await
        .unwrap();
    orchestrator.begin_execution(&workflow.id).await.unwrap();
    let released = coordinator.release_ready(&workflow.id).await.unwrap();
    assert_eq!(released.len(), 1);

    let report = coordinator
        .report_task_failure(&released[0].id, &workflow.id, "generator gave up")
        .await
        .unwrap();
    assert!(report.failed_dependents.is_empty());
    assert_eq!(report.blocked_dependents.len(), 1);

    let blocked = orchestrator
        .get_task(&report.blocked_dependents[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blocked.status, TaskStatus::Blocked);
}
