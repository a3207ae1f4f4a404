use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::model::ExplanationDraft;

use super::collaborators::{
    ConformanceValidator, ContractRegistry, DomainContract, ExplanationValidator, FailureModeRegistry,
    FailureModeSpec, Invariant, InvariantState, InvariantViolation, ModuleKind, PurityChecker,
    PurityReport, Severity,
};

/// Contracts keyed by lowercased entity name.
#[derive(Debug, Default)]
pub struct InMemoryContractRegistry {
    contracts: HashMap<String, DomainContract>,
}

impl InMemoryContractRegistry {
    pub fn new(contracts: impl IntoIterator<Item = DomainContract>) -> Self {
        Self {
            contracts: contracts
                .into_iter()
                .map(|c| (c.entity.to_lowercase(), c))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl ContractRegistry for InMemoryContractRegistry {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn get_contract(&self, entity: &str) -> CoreResult<Option<DomainContract>> {
        Ok(self.contracts.get(&entity.to_lowercase()).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFailureModeRegistry {
    specs: HashMap<String, FailureModeSpec>,
}

impl InMemoryFailureModeRegistry {
    pub fn new(specs: impl IntoIterator<Item = FailureModeSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.feature.clone(), s)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl FailureModeRegistry for InMemoryFailureModeRegistry {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn get_failure_modes(&self, feature: &str) -> CoreResult<Option<FailureModeSpec>> {
        Ok(self.specs.get(feature).cloned())
    }
}

/// Complete means a non-blank approach plus every required section with content.
#[derive(Debug, Clone)]
pub struct SectionExplanationValidator {
    required: Vec<String>,
}

impl SectionExplanationValidator {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

impl ExplanationValidator for SectionExplanationValidator {
    fn missing_sections(&self, draft: &ExplanationDraft) -> Vec<String> {
        let mut missing = Vec::new();
        if draft.approach.trim().is_empty() {
            missing.push("approach".to_string());
        }
        for section in &self.required {
            let present = draft
                .sections
                .get(section)
                .is_some_and(|body| !body.trim().is_empty());
            if !present {
                missing.push(section.clone());
            }
        }
        missing
    }
}

/// A required field counts as present when it appears as a whole word.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldPresenceConformance;

impl ConformanceValidator for FieldPresenceConformance {
    fn violations(&self, contract: &DomainContract, code: &str) -> Vec<String> {
        contract
            .required_fields
            .iter()
            .filter(|field| !contains_word(code, field))
            .map(|field| format!("missing required field `{field}` for {}", contract.entity))
            .collect()
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    if word.is_empty() {
        return true;
    }
    haystack.match_indices(word).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + word.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Ordered set of invariants evaluated at stage 7.
#[derive(Default, Clone)]
pub struct InvariantRegistry {
    invariants: Vec<Arc<dyn Invariant>>,
}

impl InvariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExplanationPrecedesCode));
        registry.register(Arc::new(CodeNonEmpty));
        registry.register(Arc::new(TaskNotTerminal));
        registry.register(Arc::new(ModuleMatchesTask));
        registry
    }

    pub fn register(&mut self, invariant: Arc<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    pub fn names(&self) -> Vec<&str> {
        self.invariants.iter().map(|i| i.name()).collect()
    }

    pub fn evaluate(&self, state: &InvariantState<'_>) -> Vec<InvariantViolation> {
        self.invariants
            .iter()
            .filter_map(|inv| {
                inv.check(state).map(|message| InvariantViolation {
                    invariant: inv.name().to_string(),
                    severity: inv.severity(),
                    message,
                })
            })
            .collect()
    }
}

struct ExplanationPrecedesCode;

impl Invariant for ExplanationPrecedesCode {
    fn name(&self) -> &str {
        "explanation-precedes-code"
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn check(&self, state: &InvariantState<'_>) -> Option<String> {
        match (state.artifact, state.explanation) {
            (Some(_), None) => Some("code emitted without an explanation".into()),
            (Some(_), Some(e)) if !e.complete => {
                Some("code emitted against an incomplete explanation".into())
            }
            _ => None,
        }
    }
}

struct CodeNonEmpty;

impl Invariant for CodeNonEmpty {
    fn name(&self) -> &str {
        "emitted-code-non-empty"
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn check(&self, state: &InvariantState<'_>) -> Option<String> {
        match state.artifact {
            Some(a) if a.code.trim().is_empty() => Some("emitted code is empty".into()),
            None => Some("no code was emitted".into()),
            _ => None,
        }
    }
}

struct TaskNotTerminal;

impl Invariant for TaskNotTerminal {
    fn name(&self) -> &str {
        "task-not-terminal"
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
    fn check(&self, state: &InvariantState<'_>) -> Option<String> {
        state.task.status.is_terminal().then(|| {
            format!(
                "task {} is already {}",
                state.task.id,
                state.task.status.as_str()
            )
        })
    }
}

struct ModuleMatchesTask;

impl Invariant for ModuleMatchesTask {
    fn name(&self) -> &str {
        "module-matches-task"
    }
    fn severity(&self) -> Severity {
        Severity::NonCritical
    }
    fn check(&self, state: &InvariantState<'_>) -> Option<String> {
        let artifact = state.artifact?;
        (artifact.module_name != state.task.target_module).then(|| {
            format!(
                "artifact module {} differs from task target {}",
                artifact.module_name, state.task.target_module
            )
        })
    }
}

const INTEGRATION_MARKERS: &[&str] = &[
    "service",
    "adapter",
    "client",
    "repository",
    "controller",
    "api",
    "handler",
    "gateway",
    "integration",
];

fn side_effect_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"\bstd::fs\b|\btokio::fs\b|\bFile::(open|create)\b", "filesystem access"),
            (r"\bstd::net\b|\breqwest\b|\bfetch\s*\(|\bTcpStream\b", "network access"),
            (r"\bprintln!|\beprintln!|\bconsole\.log\b|\bprint\s*\(", "console output"),
            (r"\bstd::env\b|\bprocess\.env\b|\bos\.environ\b", "environment access"),
            (r"\bstd::process\b|\bCommand::new\b|\bsubprocess\b", "process spawning"),
            (r"\bSystemTime::now\b|\bUtc::now\b|\bDate\.now\b", "wall-clock reads"),
            (r"\brand::|\bMath\.random\b", "randomness"),
        ]
        .into_iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("side-effect rule is valid"), label))
        .collect()
    })
}

fn error_handling_rule() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| {
        Regex::new(r"\bResult<|\?;|\.map_err\b|\bErr\(|\bcatch\b|\bexcept\b|\btry\b")
            .expect("error handling rule is valid")
    })
}

/// Classifies modules by name and applies regex rule sets.
///
/// Pure logic must not match any side-effect rule. Integration layers may do
/// I/O but must show some error handling.
#[derive(Debug, Default, Clone)]
pub struct RegexPurityChecker {
    extra_rules: Vec<(Regex, String)>,
}

impl RegexPurityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a side-effect pattern for pure modules.
    pub fn with_rule(mut self, pattern: &str, label: &str) -> CoreResult<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| CoreError::Config(format!("invalid purity rule {pattern}: {e}")))?;
        self.extra_rules.push((re, label.to_string()));
        Ok(self)
    }
}

impl PurityChecker for RegexPurityChecker {
    fn classify(&self, module_name: &str) -> ModuleKind {
        let name = module_name.to_lowercase();
        let is_integration = name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|part| INTEGRATION_MARKERS.contains(&part));
        if is_integration {
            ModuleKind::Integration
        } else {
            ModuleKind::PureLogic
        }
    }

    fn check(&self, module_name: &str, code: &str) -> PurityReport {
        let kind = self.classify(module_name);
        let mut violations = Vec::new();
        match kind {
            ModuleKind::PureLogic => {
                for (re, label) in side_effect_rules() {
                    if re.is_match(code) {
                        violations.push(format!("pure module performs {label}"));
                    }
                }
                for (re, label) in &self.extra_rules {
                    if re.is_match(code) {
                        violations.push(format!("pure module performs {label}"));
                    }
                }
            }
            ModuleKind::Integration => {
                if !error_handling_rule().is_match(code) {
                    violations.push("integration layer shows no error handling".to_string());
                }
            }
        }
        PurityReport { kind, violations }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentType, Artifact, Task, TaskStatus};
    use pretty_assertions::assert_eq;

    #[test]
    fn explanation_validator_lists_every_gap() {
        let validator =
            SectionExplanationValidator::new(vec!["assumptions".into(), "risks".into()]);
        let draft = ExplanationDraft::new("").section("risks", "  ");
        assert_eq!(
            validator.missing_sections(&draft),
            vec!["approach", "assumptions", "risks"]
        );
        let draft = ExplanationDraft::new("split by aggregate")
            .section("assumptions", "single tenant")
            .section("risks", "none");
        assert!(validator.missing_sections(&draft).is_empty());
    }

    #[test]
    fn conformance_requires_whole_word_fields() {
        let contract = DomainContract {
            entity: "Order".into(),
            required_fields: vec!["id".into(), "total".into()],
            description: String::new(),
        };
        let code = "struct Order { order_id: u64, subtotal: u64 }";
        assert_eq!(FieldPresenceConformance.violations(&contract, code).len(), 2);
        let code = "struct Order { id: u64, total: u64 }";
        assert!(FieldPresenceConformance.violations(&contract, code).is_empty());
    }

    #[test]
    fn purity_rules_depend_on_module_kind() {
        let checker = RegexPurityChecker::new();
        assert_eq!(checker.classify("pricing_rules"), ModuleKind::PureLogic);
        assert_eq!(checker.classify("order_service"), ModuleKind::Integration);
        assert_eq!(checker.classify("payment-gateway"), ModuleKind::Integration);

        let report = checker.check("pricing", "fn total() { println!(\"x\"); }");
        assert_eq!(report.violations, vec!["pure module performs console output"]);

        let report = checker.check("order_service", "fn save() { db.insert(x) }");
        assert!(!report.is_clean());
        let report = checker.check(
            "order_service",
            "fn save() -> Result<(), Error> { db.insert(x)?; Ok(()) }",
        );
        assert!(report.is_clean());
    }

    #[test]
    fn invalid_extra_rule_is_a_config_error() {
        assert!(matches!(
            RegexPurityChecker::new().with_rule("(unclosed", "oops"),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn builtin_invariants_flag_missing_code_and_terminal_tasks() {
        let registry = InvariantRegistry::with_builtins();
        let mut task = Task::new("w", AgentType::Backend, "t").with_target_module("pricing");
        let artifact = Artifact {
            module_name: "other".into(),
            language: "rust".into(),
            code: "fn f() {}".into(),
        };

        let violations = registry.evaluate(&InvariantState {
            task: &task,
            explanation: None,
            artifact: Some(&artifact),
        });
        let names: Vec<&str> = violations.iter().map(|v| v.invariant.as_str()).collect();
        assert_eq!(names, vec!["explanation-precedes-code", "module-matches-task"]);
        assert_eq!(violations[1].severity, Severity::NonCritical);

        task.status = TaskStatus::Completed;
        let violations = registry.evaluate(&InvariantState {
            task: &task,
            explanation: None,
            artifact: None,
        });
        let names: Vec<&str> = violations.iter().map(|v| v.invariant.as_str()).collect();
        assert_eq!(names, vec!["emitted-code-non-empty", "task-not-terminal"]);
    }

    #[tokio::test]
    async fn contract_lookup_ignores_case() {
        let registry = InMemoryContractRegistry::new([DomainContract {
            entity: "Invoice".into(),
            required_fields: vec!["amount".into()],
            description: String::new(),
        }]);
        assert!(registry.get_contract("invoice").await.unwrap().is_some());
        assert!(registry.get_contract("payment").await.unwrap().is_none());
    }
}
