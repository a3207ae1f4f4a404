use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Data directory: `$FORGEFLOW_HOME`, else `~/.forgeflow`.
pub fn get_forgeflow_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(v) = std::env::var("FORGEFLOW_HOME") {
        if !v.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&v).into_owned()));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".forgeflow"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: <data dir>/config.toml
    let data_dir = get_forgeflow_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./forgeflow.toml
    let local_config = Path::new("forgeflow.toml");

    let cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    Ok(apply_env_overrides(cfg))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read {} failed: {e}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("parse {} failed: {e}", path.display()))?;
    Ok(cfg)
}

// Environment variables win over file values.
pub fn apply_env_overrides(mut cfg: AppConfig) -> AppConfig {
    if let Some(v) = non_empty_env("FORGEFLOW_TRANSPORT_URL") {
        cfg.transport.url = v;
    }
    if let Some(v) = non_empty_env("FORGEFLOW_DATABASE_URL") {
        cfg.persistence.url = v;
    }
    if let Some(v) = non_empty_env("FORGEFLOW_GENERATOR_API_KEY") {
        cfg.generator.api_key = v;
    }
    if let Some(v) = non_empty_env("FORGEFLOW_GENERATOR_ENDPOINT") {
        cfg.generator.endpoint = v;
    }
    if let Some(v) = non_empty_env("FORGEFLOW_LOG") {
        cfg.logging.level = v;
    }
    cfg
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
