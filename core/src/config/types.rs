use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::AgentType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Checks required settings. Every missing value is reported in one error.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut missing = Vec::new();
        if self.transport.url.trim().is_empty() {
            missing.push("transport.url".to_string());
        }
        if self.persistence.url.trim().is_empty() {
            missing.push("persistence.url".to_string());
        }
        if self.generator.provider == GeneratorProvider::Http {
            if self.generator.endpoint.trim().is_empty() {
                missing.push("generator.endpoint".to_string());
            }
            if self.generator.api_key.trim().is_empty() {
                missing.push("generator.api_key".to_string());
            }
        }
        if self.orchestrator.chunk_size == 0 {
            missing.push("orchestrator.chunk_size (must be > 0)".to_string());
        }
        if self.queue.attempts == 0 {
            missing.push("queue.attempts (must be > 0)".to_string());
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Config(format!(
                "missing or invalid settings: {}",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or the local data dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "forgeflow_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// `memory://` or `file:///path/to/store.json`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    /// `local://` selects the in-process transport.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorProvider {
    Http,
    /// Offline template generator; no credentials required.
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_provider")]
    pub provider: GeneratorProvider,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_generator_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_generator_provider() -> GeneratorProvider {
    GeneratorProvider::Http
}

fn default_generator_model() -> String {
    "default".to_string()
}

fn default_generator_timeout_ms() -> u64 {
    60_000
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: default_generator_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_generator_model(),
            timeout_ms: default_generator_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// User stories per phase-1 task.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capability that receives phase-1 work.
    #[serde(default = "default_primary_capability")]
    pub primary_capability: AgentType,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_chunk_size() -> usize {
    3
}

fn default_primary_capability() -> AgentType {
    AgentType::Backend
}

fn default_max_retries() -> u32 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            primary_capability: default_primary_capability(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// `exponential-backoff` or `linear`.
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,

    /// Worker count for lanes without an override; unset uses the capability's nominal count.
    #[serde(default)]
    pub default_concurrency: Option<usize>,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-lane overrides keyed by capability name.
    #[serde(default)]
    pub lanes: HashMap<String, LaneConfig>,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            default_concurrency: None,
            attempts: default_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            lanes: HashMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn lane(&self, agent_type: AgentType) -> LaneConfig {
        let overrides = self.lanes.get(agent_type.as_str());
        LaneConfig {
            concurrency: overrides
                .and_then(|l| l.concurrency)
                .or(self.default_concurrency)
                .or(Some(agent_type.default_concurrency())),
            attempts: overrides.and_then(|l| l.attempts).or(Some(self.attempts)),
            backoff_base_ms: overrides
                .and_then(|l| l.backoff_base_ms)
                .or(Some(self.backoff_base_ms)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneConfig {
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
}

/// What happens to dependents when a task fails terminally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Fail every transitive dependent and the workflow.
    PropagateFailure,
    /// Leave dependents blocked; other branches keep running.
    Isolate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_failure_policy")]
    pub failure_policy: FailurePolicy,
}

fn default_failure_policy() -> FailurePolicy {
    FailurePolicy::PropagateFailure
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            failure_policy: default_failure_policy(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Explanation sections an executor must fill in before emitting code.
    #[serde(default = "default_required_sections")]
    pub required_sections: Vec<String>,

    /// Treat a missing domain contract as a stage failure instead of a skip.
    #[serde(default)]
    pub require_contract: bool,

    /// How long an accepted explanation authorizes emission.
    #[serde(default = "default_emission_ttl_secs")]
    pub emission_ttl_secs: u64,

    #[serde(default)]
    pub contracts_file: Option<String>,

    #[serde(default)]
    pub failure_modes_file: Option<String>,
}

fn default_required_sections() -> Vec<String> {
    vec![
        "assumptions".to_string(),
        "risks".to_string(),
        "test_strategy".to_string(),
    ]
}

fn default_emission_ttl_secs() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_sections: default_required_sections(),
            require_contract: false,
            emission_ttl_secs: default_emission_ttl_secs(),
            contracts_file: None,
            failure_modes_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reports_all_missing_settings() {
        let err = AppConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("transport.url"));
        assert!(msg.contains("persistence.url"));
        assert!(msg.contains("generator.endpoint"));
        assert!(msg.contains("generator.api_key"));
    }

    #[test]
    fn template_provider_needs_no_credentials() {
        let mut cfg = AppConfig::default();
        cfg.transport.url = "local://".into();
        cfg.persistence.url = "memory://".into();
        cfg.generator.provider = GeneratorProvider::Template;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lane_overrides_fall_back_to_defaults() {
        let toml_src = r#"
            attempts = 5
            [lanes.security]
            concurrency = 1
        "#;
        let queue: QueueConfig = toml::from_str(toml_src).unwrap();
        let security = queue.lane(AgentType::Security);
        assert_eq!(security.concurrency, Some(1));
        assert_eq!(security.attempts, Some(5));
        let backend = queue.lane(AgentType::Backend);
        assert_eq!(backend.concurrency, Some(3));
        assert_eq!(backend.backoff_base_ms, Some(1_000));
    }

    #[test]
    fn failure_policy_parses_kebab_case() {
        let cfg: CoordinatorConfig = toml::from_str("failure_policy = \"isolate\"").unwrap();
        assert_eq!(cfg.failure_policy, FailurePolicy::Isolate);
    }
}
