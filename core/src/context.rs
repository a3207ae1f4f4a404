use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::coordinator::AgentCoordinator;
use crate::error::{CoreError, CoreResult};
use crate::model::{AgentType, Requirement, Workflow};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{
    AgentExecutionContext, CapabilityExecutor, ContractRegistry, FailureModeRegistry,
};
use crate::queue::{JobPayload, JobTransport, LaneStats, QueueDispatcher, RetryStrategyBuilder};
use crate::state::{EventBus, FlowEvent};
use crate::store::Store;
use crate::util::with_timeout;
use crate::worker::LaneWorker;

/// Collaborators the core cannot build itself.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn JobTransport>,
    pub executors: Vec<Arc<dyn CapabilityExecutor>>,
    /// `None` keeps the in-core empty registry.
    pub contracts: Option<Arc<dyn ContractRegistry>>,
    pub failure_modes: Option<Arc<dyn FailureModeRegistry>>,
    /// `None` selects exponential backoff on every lane.
    pub retry_strategy: Option<Arc<RetryStrategyBuilder>>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &AppConfig) -> CoreResult<Services>;
}

/// What [`AppContext::submit`] hands back to the caller.
#[derive(Debug, Clone)]
pub struct Submission {
    pub workflow: Workflow,
    /// Tasks enqueued right away, in release order.
    pub dispatched: Vec<String>,
}

/// Wires the orchestrator, dispatcher, coordinator and lane workers together.
pub struct AppContext {
    cfg: AppConfig,
    events: EventBus,
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
    coordinator: Arc<AgentCoordinator>,
    dispatcher: Arc<QueueDispatcher>,
    pipeline: Arc<AgentExecutionContext>,
    executors: HashMap<AgentType, Arc<dyn CapabilityExecutor>>,
}

impl AppContext {
    /// Validates `cfg`, builds services through `factory` and assembles the core.
    pub async fn init(cfg: AppConfig, factory: &dyn ServicesFactory) -> CoreResult<Self> {
        cfg.validate()?;
        let services = factory.build_services(&cfg).await?;
        Self::from_services(cfg, services).await
    }

    /// Assembles the core from prebuilt services without checking connection settings.
    pub async fn from_services(cfg: AppConfig, services: Services) -> CoreResult<Self> {
        let mut executors = HashMap::new();
        for executor in services.executors {
            let capability = executor.capability();
            if executors.insert(capability, executor).is_some() {
                return Err(CoreError::Config(format!(
                    "more than one executor registered for {capability}"
                )));
            }
        }

        let events = EventBus::new();
        let orchestrator = Arc::new(Orchestrator::new(
            services.store.clone(),
            cfg.orchestrator.clone(),
            &cfg.persistence,
            events.clone(),
        ));
        let coordinator = Arc::new(AgentCoordinator::new(
            orchestrator.clone(),
            cfg.coordinator.failure_policy,
        ));
        let dispatcher = match services.retry_strategy.as_deref() {
            Some(build_retry) => {
                QueueDispatcher::with_retry_strategy(services.transport, &cfg.queue, build_retry)
                    .await?
            }
            None => QueueDispatcher::new(services.transport, &cfg.queue).await?,
        };

        let mut pipeline = AgentExecutionContext::builder(&cfg.pipeline)
            .store(services.store.clone())
            .generation_timeout(Duration::from_millis(cfg.generator.timeout_ms));
        if let Some(contracts) = services.contracts {
            pipeline = pipeline.contracts(contracts);
        }
        if let Some(failure_modes) = services.failure_modes {
            pipeline = pipeline.failure_modes(failure_modes);
        }
        let pipeline = Arc::new(pipeline.build()?);

        tracing::info!(
            target: "forgeflow.context",
            store = services.store.name(),
            executors = executors.len(),
            failure_policy = ?cfg.coordinator.failure_policy,
            "core assembled"
        );

        Ok(Self {
            cfg,
            events,
            store: services.store,
            orchestrator,
            coordinator,
            dispatcher: Arc::new(dispatcher),
            pipeline,
            executors,
        })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn coordinator(&self) -> &Arc<AgentCoordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &Arc<QueueDispatcher> {
        &self.dispatcher
    }

    pub fn pipeline(&self) -> &Arc<AgentExecutionContext> {
        &self.pipeline
    }

    /// Executor registered for `agent_type`, if any.
    pub fn executor(&self, agent_type: AgentType) -> Option<&Arc<dyn CapabilityExecutor>> {
        self.executors.get(&agent_type)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    /// Binds one [`LaneWorker`] per capability that has an executor.
    ///
    /// Lanes without an executor accept jobs but never process them.
    pub async fn start(&self) -> CoreResult<()> {
        for agent_type in AgentType::ALL {
            let Some(executor) = self.executors.get(&agent_type) else {
                tracing::warn!(
                    target: "forgeflow.context",
                    agent_type = %agent_type,
                    "no executor registered; lane left unbound"
                );
                continue;
            };
            let worker = LaneWorker::new(
                self.orchestrator.clone(),
                self.coordinator.clone(),
                self.dispatcher.clone(),
                executor.clone(),
                Some(self.pipeline.clone()),
            );
            self.dispatcher
                .process_jobs(agent_type, Arc::new(worker))
                .await?;
        }
        Ok(())
    }

    /// Plans `requirement`, starts execution and enqueues every task with no open dependency.
    pub async fn submit(&self, requirement: Requirement, created_by: &str) -> CoreResult<Submission> {
        let workflow = self
            .orchestrator
            .start_workflow(requirement, created_by)
            .await?;
        let tasks = self.orchestrator.get_workflow_tasks(&workflow.id).await?;
        self.coordinator
            .create_coordination_plan(&workflow.id, &tasks)?;
        let workflow = self.orchestrator.begin_execution(&workflow.id).await?;

        let released = self.coordinator.release_ready(&workflow.id).await?;
        let mut dispatched = Vec::with_capacity(released.len());
        for task in &released {
            let payload = JobPayload::for_task(task, &workflow.requirement);
            self.dispatcher.queue_task(task, payload).await?;
            dispatched.push(task.id.clone());
        }

        tracing::info!(
            target: "forgeflow.context",
            workflow_id = %workflow.id,
            tasks = tasks.len(),
            dispatched = dispatched.len(),
            "workflow submitted"
        );
        Ok(Submission {
            workflow,
            dispatched,
        })
    }

    /// Waits until the workflow reaches `completed` or `failed`.
    pub async fn wait_for_workflow(&self, workflow_id: &str, budget: Duration) -> CoreResult<Workflow> {
        let mut events = self.events.subscribe();
        with_timeout("wait_for_workflow", budget, async {
            loop {
                let workflow = self
                    .orchestrator
                    .get_workflow(workflow_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("workflow", workflow_id))?;
                if workflow.status.is_terminal() {
                    return Ok(workflow);
                }
                // lagged or idle receivers fall back to polling
                let _ = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
            }
        })
        .await
    }

    pub async fn queue_stats(&self) -> CoreResult<BTreeMap<AgentType, LaneStats>> {
        self.dispatcher.get_queue_stats().await
    }

    /// Stops the lanes, then flushes the store.
    pub async fn stop(&self) -> CoreResult<()> {
        self.dispatcher.close().await?;
        self.store.close().await?;
        tracing::info!(target: "forgeflow.context", "core stopped");
        Ok(())
    }
}
