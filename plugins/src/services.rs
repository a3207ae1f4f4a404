//! `ServicesFactory` implementation: builds every configured collaborator once so the CLI can reuse it.
use async_trait::async_trait;
use forgeflow_core::api::{AppConfig, CoreError, CoreResult, Services, ServicesFactory};

use crate::factory;

#[derive(Debug, Default)]
pub struct PluginServicesFactory;

fn config_error(e: anyhow::Error) -> CoreError {
    match e.downcast::<CoreError>() {
        Ok(core) => core,
        Err(other) => CoreError::Config(format!("{other:#}")),
    }
}

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &AppConfig) -> CoreResult<Services> {
        let store = factory::build_store(cfg).await.map_err(config_error)?;
        let transport = factory::build_transport(cfg).map_err(config_error)?;
        let generator = factory::build_generator(cfg).map_err(config_error)?;
        let executors = factory::build_executors(cfg, generator.clone());
        let contracts = factory::build_contracts(cfg).map_err(config_error)?;
        let failure_modes = factory::build_failure_modes(cfg).map_err(config_error)?;
        let retry_strategy = factory::build_retry_strategy(cfg).map_err(config_error)?;

        tracing::info!(
            target: "forgeflow.plugins",
            store = store.name(),
            transport = transport.name(),
            generator = generator.name(),
            strategy = %cfg.queue.strategy,
            "services built"
        );
        Ok(Services {
            store,
            transport,
            executors,
            contracts,
            failure_modes,
            retry_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::api::{AppContext, GeneratorProvider, WorkflowStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn template_stack_completes_a_workflow() {
        let mut cfg = AppConfig::default();
        cfg.transport.url = "local://".into();
        cfg.persistence.url = "memory://".into();
        cfg.generator.provider = GeneratorProvider::Template;

        let app = AppContext::init(cfg, &PluginServicesFactory).await.unwrap();
        app.start().await.unwrap();

        let requirement = serde_json::from_value(serde_json::json!({
            "id": "REQ-9",
            "title": "Invoices",
            "user_stories": [{ "id": "US-1", "title": "issue an invoice" }],
            "acceptance_criteria": [{ "id": "AC-1", "description": "invoice has a number" }],
            "entities": ["Invoice"]
        }))
        .unwrap();
        let submission = app.submit(requirement, "test").await.unwrap();
        let done = app
            .wait_for_workflow(&submission.workflow.id, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_settings_fail_init() {
        let err = AppContext::init(AppConfig::default(), &PluginServicesFactory)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
