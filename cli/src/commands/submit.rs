use std::path::Path;
use std::time::Duration;

use forgeflow_core::api::{AppContext, CliError, Requirement, Workflow, WorkflowStatus};

use super::cli::SubmitArgs;
use crate::app;

/// Runs one requirement to a terminal state and prints a JSON summary.
///
/// Exits `0` only when the workflow completed.
pub async fn handle_submit(args: SubmitArgs, ctx: AppContext) -> Result<i32, CliError> {
    let requirement = read_requirement(&args.requirement).await?;
    let logger = app::spawn_event_logger(&ctx);

    let outcome = drive(&ctx, requirement, &args).await;
    let stopped = ctx.stop().await;
    logger.abort();

    let summary = outcome?;
    stopped.map_err(|e| CliError::Command(format!("shutdown failed: {e}")))?;

    let completed = summary["status"] == WorkflowStatus::Completed.as_str();
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).map_err(|e| CliError::Command(e.to_string()))?
    );
    Ok(if completed { 0 } else { 1 })
}

async fn read_requirement(path: &Path) -> Result<Requirement, CliError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Command(format!("read {} failed: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| CliError::Command(format!("parse {} failed: {e}", path.display())))
}

async fn drive(
    ctx: &AppContext,
    requirement: Requirement,
    args: &SubmitArgs,
) -> Result<serde_json::Value, CliError> {
    ctx.start().await.map_err(CliError::Init)?;
    let submission = ctx
        .submit(requirement, &args.created_by)
        .await
        .map_err(|e| CliError::Command(format!("submit failed: {e}")))?;
    tracing::info!(
        target: "forgeflow.cli",
        workflow_id = %submission.workflow.id,
        dispatched = submission.dispatched.len(),
        "waiting for workflow"
    );

    let workflow = ctx
        .wait_for_workflow(&submission.workflow.id, Duration::from_secs(args.timeout_secs))
        .await
        .map_err(|e| CliError::Command(e.to_string()))?;
    summarize(ctx, &workflow).await
}

async fn summarize(ctx: &AppContext, workflow: &Workflow) -> Result<serde_json::Value, CliError> {
    let tasks = ctx
        .orchestrator()
        .get_workflow_tasks(&workflow.id)
        .await
        .map_err(|e| CliError::Command(e.to_string()))?;
    let stats = ctx
        .queue_stats()
        .await
        .map_err(|e| CliError::Command(e.to_string()))?;

    let tasks: Vec<_> = tasks
        .iter()
        .map(|t| {
            serde_json::json!({
                "id": t.id,
                "title": t.title,
                "agent_type": t.agent_type,
                "status": t.status,
                "retry_count": t.retry_count,
                "error": t.error,
            })
        })
        .collect();
    Ok(serde_json::json!({
        "workflow_id": workflow.id,
        "requirement_id": workflow.requirement.id,
        "status": workflow.status.as_str(),
        "error": workflow.error,
        "tasks": tasks,
        "queue": stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeflow_core::api::{AppConfig, GeneratorProvider};
    use std::io::Write;

    fn offline_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.transport.url = "local://".into();
        cfg.persistence.url = "memory://".into();
        cfg.generator.provider = GeneratorProvider::Template;
        cfg
    }

    fn requirement_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn args(path: &Path) -> SubmitArgs {
        SubmitArgs {
            requirement: path.to_path_buf(),
            timeout_secs: 30,
            created_by: "test".into(),
        }
    }

    #[tokio::test]
    async fn malformed_requirement_is_rejected_before_start() {
        let file = requirement_file("{ not json");
        let ctx = app::build_context(offline_config()).await.unwrap();
        let err = handle_submit(args(file.path()), ctx).await.unwrap_err();
        assert!(matches!(err, CliError::Command(ref m) if m.contains("parse")));
    }

    #[tokio::test]
    async fn incomplete_requirement_fails_submission() {
        let file = requirement_file(r#"{"id": "REQ-9", "title": "empty"}"#);
        let ctx = app::build_context(offline_config()).await.unwrap();
        let err = handle_submit(args(file.path()), ctx).await.unwrap_err();
        assert!(matches!(err, CliError::Command(ref m) if m.contains("submit failed")));
    }

    #[tokio::test]
    async fn offline_requirement_runs_to_completion() {
        let file = requirement_file(
            r#"{
                "id": "REQ-1",
                "title": "Order checkout",
                "user_stories": [{"id": "US-1", "title": "pay for an order"}],
                "acceptance_criteria": [{"id": "AC-1", "description": "payment is captured"}],
                "entities": ["Order"]
            }"#,
        );
        let ctx = app::build_context(offline_config()).await.unwrap();
        let code = handle_submit(args(file.path()), ctx).await.unwrap();
        assert_eq!(code, 0);
    }
}
