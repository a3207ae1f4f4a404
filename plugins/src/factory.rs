use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use forgeflow_core::api::{
    AgentType, AppConfig, CapabilityExecutor, ContractRegistry, FailureModeRegistry,
    GeneratorProvider, JobTransport, LocalTransport, MemoryStore, RetryConfig, RetryStrategy,
    RetryStrategyBuilder, Store, TextGenerator,
};

use crate::agents::PromptedExecutor;
use crate::generator::{HttpTextGenerator, TemplateGenerator};
use crate::registry::{FileContractRegistry, FileFailureModeRegistry};
use crate::retry::LinearRetry;
use crate::store::FileStore;

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// `memory://` or `file://<path>`.
pub async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn Store>> {
    let url = cfg.persistence.url.trim();
    if url == "memory://" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(path) = url.strip_prefix("file://") {
        let store = FileStore::open(expand_path(path))
            .await
            .with_context(|| format!("open file store {path}"))?;
        return Ok(Arc::new(store));
    }
    bail!("unsupported persistence url: {url}")
}

pub fn build_transport(cfg: &AppConfig) -> Result<Arc<dyn JobTransport>> {
    match cfg.transport.url.trim() {
        "local://" => Ok(Arc::new(LocalTransport::new())),
        other => bail!("unsupported transport url: {other}"),
    }
}

pub fn build_generator(cfg: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    let g = &cfg.generator;
    match g.provider {
        GeneratorProvider::Http => Ok(Arc::new(HttpTextGenerator::new(
            g.endpoint.clone(),
            g.api_key.clone(),
            g.model.clone(),
            g.timeout_ms,
        )?)),
        GeneratorProvider::Template => Ok(Arc::new(TemplateGenerator::new())),
    }
}

/// One prompted executor per capability, all sharing `generator`.
pub fn build_executors(
    cfg: &AppConfig,
    generator: Arc<dyn TextGenerator>,
) -> Vec<Arc<dyn CapabilityExecutor>> {
    AgentType::ALL
        .into_iter()
        .map(|agent_type| {
            Arc::new(PromptedExecutor::new(
                agent_type,
                generator.clone(),
                cfg.pipeline.required_sections.clone(),
            )) as Arc<dyn CapabilityExecutor>
        })
        .collect()
}

pub fn build_contracts(cfg: &AppConfig) -> Result<Option<Arc<dyn ContractRegistry>>> {
    let Some(path) = cfg.pipeline.contracts_file.as_deref() else {
        return Ok(None);
    };
    let registry = FileContractRegistry::load(&expand_path(path))?;
    Ok(Some(Arc::new(registry)))
}

pub fn build_failure_modes(cfg: &AppConfig) -> Result<Option<Arc<dyn FailureModeRegistry>>> {
    let Some(path) = cfg.pipeline.failure_modes_file.as_deref() else {
        return Ok(None);
    };
    let registry = FileFailureModeRegistry::load(&expand_path(path))?;
    Ok(Some(Arc::new(registry)))
}

/// `None` leaves the core default (exponential backoff) in place.
pub fn build_retry_strategy(cfg: &AppConfig) -> Result<Option<Arc<RetryStrategyBuilder>>> {
    match cfg.queue.strategy.as_str() {
        "exponential-backoff" => Ok(None),
        "linear" => {
            let builder: Arc<RetryStrategyBuilder> =
                Arc::new(|_: AgentType, retry: &RetryConfig| -> Arc<dyn RetryStrategy> {
                    Arc::new(LinearRetry::new(retry.clone()))
                });
            Ok(Some(builder))
        }
        other => bail!("unknown retry strategy: {other}"),
    }
}
