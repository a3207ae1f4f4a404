use forgeflow_core::api::{AppContext, CliError};
use tokio::signal;

use crate::app;

/// Binds every lane and keeps processing until Ctrl-C or SIGTERM.
pub async fn handle_run(ctx: AppContext) -> Result<i32, CliError> {
    let logger = app::spawn_event_logger(&ctx);
    ctx.start().await.map_err(CliError::Init)?;
    tracing::info!(
        target: "forgeflow.cli",
        transport = %ctx.cfg().transport.url,
        persistence = %ctx.cfg().persistence.url,
        "forgeflow running; press Ctrl-C to stop"
    );

    shutdown_signal().await;
    tracing::info!(target: "forgeflow.cli", "shutdown requested");

    let stopped = ctx.stop().await;
    logger.abort();
    stopped.map_err(|e| CliError::Command(format!("shutdown failed: {e}")))?;
    Ok(0)
}

async fn shutdown_signal() {
    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!(target: "forgeflow.cli", error = %e, "ctrl-c handler failed");
            }
        }
        _ = wait_for_sigterm() => {}
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(target: "forgeflow.cli", error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}
