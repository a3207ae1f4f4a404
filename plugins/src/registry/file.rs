use std::path::Path;

use async_trait::async_trait;
use forgeflow_core::api::{
    ContractRegistry, CoreError, CoreResult, DomainContract, FailureModeRegistry, FailureModeSpec,
    InMemoryContractRegistry, InMemoryFailureModeRegistry,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ContractsFile {
    #[serde(default)]
    contracts: Vec<DomainContract>,
}

#[derive(Debug, Deserialize)]
struct FailureModesFile {
    #[serde(default)]
    features: Vec<FailureModeSpec>,
}

fn load<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("read {}: {e}", path.display())))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("parse {}: {e}", path.display())))
    } else {
        toml::from_str(&raw).map_err(|e| CoreError::Config(format!("parse {}: {e}", path.display())))
    }
}

/// Domain contracts read once from a `[[contracts]]` file.
#[derive(Debug)]
pub struct FileContractRegistry {
    inner: InMemoryContractRegistry,
    count: usize,
}

impl FileContractRegistry {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let file: ContractsFile = load(path)?;
        let count = file.contracts.len();
        tracing::info!(target: "forgeflow.registry", path = %path.display(), count, "contracts loaded");
        Ok(Self {
            inner: InMemoryContractRegistry::new(file.contracts),
            count,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[async_trait]
impl ContractRegistry for FileContractRegistry {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_contract(&self, entity: &str) -> CoreResult<Option<DomainContract>> {
        self.inner.get_contract(entity).await
    }
}

/// Failure-mode declarations keyed by feature (the task's target module).
#[derive(Debug)]
pub struct FileFailureModeRegistry {
    inner: InMemoryFailureModeRegistry,
}

impl FileFailureModeRegistry {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let file: FailureModesFile = load(path)?;
        tracing::info!(
            target: "forgeflow.registry",
            path = %path.display(),
            count = file.features.len(),
            "failure modes loaded"
        );
        Ok(Self {
            inner: InMemoryFailureModeRegistry::new(file.features),
        })
    }
}

#[async_trait]
impl FailureModeRegistry for FileFailureModeRegistry {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_failure_modes(&self, feature: &str) -> CoreResult<Option<FailureModeSpec>> {
        self.inner.get_failure_modes(feature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn toml_contracts_are_looked_up_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "contracts.toml",
            r#"
[[contracts]]
entity = "Order"
required_fields = ["id", "total"]
"#,
        );
        let registry = FileContractRegistry::load(&path).unwrap();
        assert_eq!(registry.len(), 1);
        let contract = registry.get_contract("order").await.unwrap().unwrap();
        assert_eq!(contract.required_fields, vec!["id", "total"]);
        assert!(registry.get_contract("invoice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_failure_modes_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "modes.json",
            r#"{"features":[{"feature":"order_service","modes":[{"name":"timeout","trigger":"db slow","handling":"retry"}]}]}"#,
        );
        let registry = FileFailureModeRegistry::load(&path).unwrap();
        let spec = registry
            .get_failure_modes("order_service")
            .await
            .unwrap()
            .unwrap();
        assert!(spec.missing_parts().is_empty());
    }

    #[test]
    fn unreadable_or_malformed_files_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileContractRegistry::load(&dir.path().join("absent.toml")),
            Err(CoreError::Config(_))
        ));
        let bad = write(&dir, "bad.json", "[1, 2");
        assert!(matches!(
            FileContractRegistry::load(&bad),
            Err(CoreError::Config(_))
        ));
    }
}
