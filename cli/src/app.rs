use std::path::{Path, PathBuf};

use forgeflow_core::api::{self as core_api, AppConfig, AppContext, CliError, FlowEvent};
use forgeflow_plugins::services::PluginServicesFactory;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Loads `path` when given (env overrides still apply), otherwise the default lookup.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, CliError> {
    let loaded = match path {
        Some(p) => {
            let expanded = PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned());
            core_api::load_from_path(&expanded).map(core_api::apply_env_overrides)
        }
        None => core_api::load_default(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

pub async fn build_context(cfg: AppConfig) -> Result<AppContext, CliError> {
    AppContext::init(cfg, &PluginServicesFactory)
        .await
        .map_err(CliError::Init)
}

/// Mirrors workflow events into the log until the bus closes.
pub fn spawn_event_logger(ctx: &AppContext) -> JoinHandle<()> {
    let mut events = ctx.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(target: "forgeflow.cli", skipped, "event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &FlowEvent) {
    match event {
        FlowEvent::WorkflowCreated {
            workflow_id,
            task_count,
            ..
        } => {
            tracing::info!(target: "forgeflow.cli", %workflow_id, task_count, "workflow created");
        }
        FlowEvent::WorkflowStatusChanged {
            workflow_id,
            from,
            to,
            ..
        } => {
            tracing::debug!(target: "forgeflow.cli", %workflow_id, "workflow {} -> {}", from, to);
        }
        FlowEvent::TaskStatusChanged {
            task_id, from, to, ..
        } => {
            tracing::debug!(target: "forgeflow.cli", %task_id, "task {} -> {}", from, to);
        }
        FlowEvent::TaskReleased {
            task_id,
            agent_type,
            ..
        } => {
            tracing::debug!(target: "forgeflow.cli", %task_id, %agent_type, "task released");
        }
        FlowEvent::WorkflowFinished {
            workflow_id,
            status,
            ..
        } => {
            tracing::info!(target: "forgeflow.cli", %workflow_id, status = %status, "workflow finished");
        }
    }
}
