#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forgeflow_core::api::{
    AcceptanceCriterion, AgentType, AppConfig, AppContext, Artifact, CapabilityExecutor,
    CoreError, CoreResult, ExecutionRequest, Explanation, ExplanationDraft, GeneratorProvider,
    LaneConfig, LocalTransport, MemoryStore, Requirement, Services, TaskPriority, UserStory,
};

/// Requirement with `stories` user stories and one criterion per story.
pub fn requirement(stories: usize) -> Requirement {
    Requirement {
        id: "REQ-1".into(),
        title: "Order checkout".into(),
        description: "Customers check out a cart".into(),
        user_stories: (1..=stories)
            .map(|i| UserStory {
                id: format!("US-{i}"),
                title: format!("story {i}"),
                description: String::new(),
                priority: Some(if i == 1 {
                    TaskPriority::High
                } else {
                    TaskPriority::Medium
                }),
            })
            .collect(),
        acceptance_criteria: (1..=stories)
            .map(|i| AcceptanceCriterion {
                id: format!("AC-{i}"),
                description: format!("criterion {i}"),
                story_id: Some(format!("US-{i}")),
            })
            .collect(),
        entities: vec!["Order".into()],
        constraints: vec!["pci".into()],
    }
}

/// In-process settings with millisecond backoff so retry paths finish quickly.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.transport.url = "local://".into();
    cfg.persistence.url = "memory://".into();
    cfg.generator.provider = GeneratorProvider::Template;
    cfg.generator.timeout_ms = 2_000;
    cfg.orchestrator.chunk_size = 2;
    cfg.queue.backoff_base_ms = 5;
    cfg.queue.backoff_max_ms = 20;
    cfg
}

pub fn single_worker_lane(cfg: &mut AppConfig, agent_type: AgentType) {
    cfg.queue.lanes.insert(
        agent_type.as_str().to_string(),
        LaneConfig {
            concurrency: Some(1),
            ..Default::default()
        },
    );
}

pub fn complete_draft() -> ExplanationDraft {
    ExplanationDraft::new("validate input, then persist through the repository")
        .section("assumptions", "order ids are unique")
        .section("risks", "duplicate submissions")
        .section("test_strategy", "unit tests per rule")
}

/// Executor with a fixed explanation and a switchable generator.
pub struct ScriptedExecutor {
    capability: AgentType,
    draft: ExplanationDraft,
    generator_down: bool,
    pub generations: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(capability: AgentType) -> Self {
        Self {
            capability,
            draft: complete_draft(),
            generator_down: false,
            generations: AtomicUsize::new(0),
        }
    }

    pub fn with_draft(mut self, draft: ExplanationDraft) -> Self {
        self.draft = draft;
        self
    }

    pub fn generator_down(mut self) -> Self {
        self.generator_down = true;
        self
    }

    pub fn generation_count(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CapabilityExecutor for ScriptedExecutor {
    fn capability(&self) -> AgentType {
        self.capability
    }

    async fn produce_explanation(&self, _request: &ExecutionRequest) -> CoreResult<ExplanationDraft> {
        Ok(self.draft.clone())
    }

    async fn generate_artifact(
        &self,
        request: &ExecutionRequest,
        _explanation: &Explanation,
    ) -> CoreResult<Artifact> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        if self.generator_down {
            return Err(CoreError::external("generator", "connection refused"));
        }
        Ok(Artifact {
            module_name: request.task.target_module.clone(),
            language: "rust".into(),
            code: "pub fn place(order: &Order) -> Result<(), String> { order.check()?; Ok(()) }"
                .into(),
        })
    }
}

pub fn services(executors: Vec<Arc<dyn CapabilityExecutor>>) -> Services {
    Services {
        store: Arc::new(MemoryStore::new()),
        transport: Arc::new(LocalTransport::new()),
        executors,
        contracts: None,
        failure_modes: None,
        retry_strategy: None,
    }
}

pub async fn app(cfg: AppConfig, executors: Vec<Arc<dyn CapabilityExecutor>>) -> AppContext {
    AppContext::from_services(cfg, services(executors))
        .await
        .expect("core assembles")
}

/// Polls `check` until it returns true or `budget` runs out.
pub async fn eventually<F, Fut>(budget: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
