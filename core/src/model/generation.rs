use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The eight gates of a constrained execution run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    ContextBind,
    ContractLoad,
    FailureModeDeclaration,
    Explanation,
    EmissionPermission,
    ContractConformance,
    InvariantCheck,
    PurityCheck,
    Persist,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextBind => "context-bind",
            Self::ContractLoad => "contract-load",
            Self::FailureModeDeclaration => "failure-mode-declaration",
            Self::Explanation => "explanation",
            Self::EmissionPermission => "emission-permission",
            Self::ContractConformance => "contract-conformance",
            Self::InvariantCheck => "invariant-check",
            Self::PurityCheck => "purity-check",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Warning,
}

/// One append-only record of a pipeline stage outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub task_id: String,
    pub stage: PipelineStage,
    pub outcome: AuditOutcome,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// What an executor submits before any code is requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationDraft {
    pub approach: String,
    /// Named sections (assumptions, risks, test strategy, ...).
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
}

impl ExplanationDraft {
    pub fn new(approach: impl Into<String>) -> Self {
        Self {
            approach: approach.into(),
            sections: BTreeMap::new(),
        }
    }

    pub fn section(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.insert(name.into(), body.into());
        self
    }
}

/// A validated explanation. Never mutated once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub id: String,
    pub task_id: String,
    pub approach: String,
    pub sections: BTreeMap<String, String>,
    pub complete: bool,
    pub missing_sections: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Code produced by an executor for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub module_name: String,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    pub contract_valid: bool,
    pub invariants_hold: bool,
    pub explanation_complete: bool,
    pub purity_valid: bool,
}

impl ValidationResults {
    pub fn all_passed(&self) -> bool {
        self.contract_valid && self.invariants_hold && self.explanation_complete && self.purity_valid
    }
}

/// Why a pipeline attempt stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub reason: String,
    /// True when the cause was a transient collaborator failure worth another attempt.
    pub retryable: bool,
}

/// Outcome of one pipeline run. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: String,
    pub task_id: String,
    pub workflow_id: String,
    pub success: bool,
    pub explanation_id: Option<String>,
    pub module_name: Option<String>,
    pub code: Option<String>,
    pub validation_results: ValidationResults,
    pub failure: Option<StageFailure>,
    pub audit_log: Vec<AuditLogEntry>,
    pub created_at: DateTime<Utc>,
}
