//! Pluggable checks consulted by the pipeline stages.
//!
//! Contract conformance and purity are structural heuristics over the emitted
//! text. They catch obvious omissions; they do not verify semantics.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::model::{Artifact, Explanation, ExplanationDraft, Task};

/// Fields generated code for an entity must mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainContract {
    pub entity: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMode {
    pub name: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub handling: String,
}

/// Failure modes declared for a feature before code is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureModeSpec {
    pub feature: String,
    #[serde(default)]
    pub modes: Vec<FailureMode>,
}

impl FailureModeSpec {
    /// Names of the parts that are still undeclared.
    pub fn missing_parts(&self) -> Vec<String> {
        if self.modes.is_empty() {
            return vec!["modes".to_string()];
        }
        let mut missing = Vec::new();
        for (idx, mode) in self.modes.iter().enumerate() {
            if mode.trigger.trim().is_empty() {
                missing.push(format!("modes[{idx}].trigger"));
            }
            if mode.handling.trim().is_empty() {
                missing.push(format!("modes[{idx}].handling"));
            }
        }
        missing
    }
}

#[async_trait::async_trait]
pub trait ContractRegistry: Send + Sync {
    fn name(&self) -> &str;
    async fn get_contract(&self, entity: &str) -> CoreResult<Option<DomainContract>>;
}

#[async_trait::async_trait]
pub trait FailureModeRegistry: Send + Sync {
    fn name(&self) -> &str;
    async fn get_failure_modes(&self, feature: &str) -> CoreResult<Option<FailureModeSpec>>;
}

pub trait ExplanationValidator: Send + Sync {
    /// Required sections absent from `draft`; empty means complete.
    fn missing_sections(&self, draft: &ExplanationDraft) -> Vec<String>;
}

pub trait ConformanceValidator: Send + Sync {
    fn violations(&self, contract: &DomainContract, code: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Critical,
    NonCritical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant: String,
    pub severity: Severity,
    pub message: String,
}

/// Execution state an invariant is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct InvariantState<'a> {
    pub task: &'a Task,
    pub explanation: Option<&'a Explanation>,
    pub artifact: Option<&'a Artifact>,
}

pub trait Invariant: Send + Sync {
    fn name(&self) -> &str;
    fn severity(&self) -> Severity;
    /// `Some(message)` when the invariant does not hold.
    fn check(&self, state: &InvariantState<'_>) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    PureLogic,
    Integration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurityReport {
    pub kind: ModuleKind,
    pub violations: Vec<String>,
}

impl PurityReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub trait PurityChecker: Send + Sync {
    fn classify(&self, module_name: &str) -> ModuleKind;
    fn check(&self, module_name: &str, code: &str) -> PurityReport;
}
