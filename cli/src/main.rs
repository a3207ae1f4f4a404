use clap::Parser;
use forgeflow_cli::app;
use forgeflow_cli::commands::{cli, run, submit, validate};
use forgeflow_core::api::{CliError, CoreError, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = app::load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    let ctx = app::build_context(cfg).await?;
    match args.command {
        cli::Commands::Validate => validate::handle_validate(ctx).await,
        cli::Commands::Run => run::handle_run(ctx).await,
        cli::Commands::Submit(submit_args) => submit::handle_submit(submit_args, ctx).await,
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: workflow finished without completing (returned as a normal exit code)
    // 11: config error
    // 20: initialization / command / IO error
    // 30: smoke test failed
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Init(CoreError::Config(_)) => 11,
        CliError::Init(_) => 20,
        CliError::SmokeTest(_) => 30,
        CliError::Command(_) => 20,
        CliError::Io(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(shellexpand::tilde(d).into_owned()),
            None => dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("forgeflow")
                .join("logs"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("forgeflow.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
