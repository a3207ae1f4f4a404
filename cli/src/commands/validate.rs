use forgeflow_core::api::{AgentType, AppContext, CliError};

/// Boots every service, binds the lanes, reads from persistence and the queue
/// once, then shuts down.
pub async fn handle_validate(ctx: AppContext) -> Result<i32, CliError> {
    let smoke = smoke_test(&ctx).await;
    let stopped = ctx.stop().await;

    let report = smoke?;
    stopped.map_err(|e| CliError::Command(format!("shutdown failed: {e}")))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| CliError::Command(e.to_string()))?
    );
    Ok(0)
}

async fn smoke_test(ctx: &AppContext) -> Result<serde_json::Value, CliError> {
    let primary = ctx.cfg().orchestrator.primary_capability;
    ctx.start()
        .await
        .map_err(|e| CliError::SmokeTest(format!("lanes: {e}")))?;
    let Some(executor) = ctx.executor(primary) else {
        return Err(CliError::SmokeTest(format!(
            "executor: no executor bound for primary capability {primary}"
        )));
    };
    let bound: Vec<AgentType> = AgentType::ALL
        .into_iter()
        .filter(|a| ctx.executor(*a).is_some())
        .collect();

    ctx.orchestrator()
        .get_next_pending_task(primary)
        .await
        .map_err(|e| CliError::SmokeTest(format!("persistence: {e}")))?;

    let stats = ctx
        .queue_stats()
        .await
        .map_err(|e| CliError::SmokeTest(format!("queue: {e}")))?;
    if let Some(missing) = AgentType::ALL.iter().find(|a| !stats.contains_key(a)) {
        return Err(CliError::SmokeTest(format!("queue: lane {missing} not registered")));
    }

    tracing::info!(target: "forgeflow.cli", lanes = stats.len(), "smoke test passed");
    Ok(serde_json::json!({
        "ok": true,
        "store": ctx.orchestrator().store().name(),
        "transport": ctx.cfg().transport.url,
        "generator": ctx.cfg().generator.provider,
        "primary_capability": primary,
        "primary_executor": executor.capability(),
        "bound_lanes": bound,
        "lanes": stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::api::{
        AppConfig, GeneratorProvider, LocalTransport, MemoryStore, Services,
    };
    use std::sync::Arc;

    fn offline_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.transport.url = "local://".into();
        cfg.persistence.url = "memory://".into();
        cfg.generator.provider = GeneratorProvider::Template;
        cfg
    }

    #[tokio::test]
    async fn offline_stack_passes_the_smoke_test() {
        let ctx = crate::app::build_context(offline_config()).await.unwrap();
        let report = smoke_test(&ctx).await.unwrap();
        assert_eq!(report["ok"], true);
        assert_eq!(report["store"], "memory");
        assert_eq!(report["lanes"].as_object().unwrap().len(), AgentType::ALL.len());
        assert_eq!(report["primary_executor"], "backend");
        assert_eq!(
            report["bound_lanes"].as_array().unwrap().len(),
            AgentType::ALL.len()
        );
        ctx.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_primary_executor_fails_the_smoke_test() {
        let services = Services {
            store: Arc::new(MemoryStore::new()),
            transport: Arc::new(LocalTransport::new()),
            executors: Vec::new(),
            contracts: None,
            failure_modes: None,
            retry_strategy: None,
        };
        let ctx = AppContext::from_services(offline_config(), services)
            .await
            .unwrap();
        let err = smoke_test(&ctx).await.unwrap_err();
        assert!(matches!(err, CliError::SmokeTest(ref m) if m.contains("no executor bound")));
        ctx.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_transport_fails_initialization() {
        let mut cfg = offline_config();
        cfg.transport.url.clear();
        let err = crate::app::build_context(cfg).await.err().unwrap();
        assert!(matches!(err, CliError::Init(_)));
    }
}
