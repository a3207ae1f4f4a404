use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "forgeflow", version, about = "Plan requirements into tasks and drive them through capability lanes")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of `<data dir>/config.toml` or `./forgeflow.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build every service from config and run a smoke check.
    Validate,
    /// Bind the lane workers and process jobs until interrupted.
    Run,
    /// Plan a requirement file and wait for the workflow to finish.
    Submit(SubmitArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SubmitArgs {
    /// JSON file holding the requirement.
    #[arg(long)]
    pub requirement: PathBuf,

    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    /// Recorded as the workflow's `created_by`.
    #[arg(long, default_value = "cli")]
    pub created_by: String,
}
