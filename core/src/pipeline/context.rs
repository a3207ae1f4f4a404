use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::Store;

use super::collaborators::{
    ConformanceValidator, ContractRegistry, ExplanationValidator, FailureModeRegistry,
    PurityChecker,
};
use super::defaults::{
    FieldPresenceConformance, InMemoryContractRegistry, InMemoryFailureModeRegistry,
    InvariantRegistry, RegexPurityChecker, SectionExplanationValidator,
};
use super::ledger::ExplanationLedger;

/// Collaborators bound to pipeline runs.
#[derive(Clone)]
pub struct AgentExecutionContext {
    pub contracts: Arc<dyn ContractRegistry>,
    pub failure_modes: Arc<dyn FailureModeRegistry>,
    pub explanations: Arc<dyn ExplanationValidator>,
    pub ledger: Arc<ExplanationLedger>,
    pub invariants: Arc<InvariantRegistry>,
    pub purity: Arc<dyn PurityChecker>,
    pub conformance: Arc<dyn ConformanceValidator>,
    pub store: Arc<dyn Store>,
    pub require_contract: bool,
    pub generation_timeout: Duration,
}

impl AgentExecutionContext {
    pub fn builder(cfg: &PipelineConfig) -> AgentExecutionContextBuilder {
        AgentExecutionContextBuilder::new(cfg)
    }
}

/// Starts from the in-core defaults; only the store has no default.
pub struct AgentExecutionContextBuilder {
    contracts: Arc<dyn ContractRegistry>,
    failure_modes: Arc<dyn FailureModeRegistry>,
    explanations: Arc<dyn ExplanationValidator>,
    ledger: Arc<ExplanationLedger>,
    invariants: Arc<InvariantRegistry>,
    purity: Arc<dyn PurityChecker>,
    conformance: Arc<dyn ConformanceValidator>,
    store: Option<Arc<dyn Store>>,
    require_contract: bool,
    generation_timeout: Duration,
}

impl AgentExecutionContextBuilder {
    fn new(cfg: &PipelineConfig) -> Self {
        Self {
            contracts: Arc::new(InMemoryContractRegistry::default()),
            failure_modes: Arc::new(InMemoryFailureModeRegistry::default()),
            explanations: Arc::new(SectionExplanationValidator::new(
                cfg.required_sections.clone(),
            )),
            ledger: Arc::new(ExplanationLedger::new(Duration::from_secs(
                cfg.emission_ttl_secs,
            ))),
            invariants: Arc::new(InvariantRegistry::with_builtins()),
            purity: Arc::new(RegexPurityChecker::new()),
            conformance: Arc::new(FieldPresenceConformance),
            store: None,
            require_contract: cfg.require_contract,
            generation_timeout: Duration::from_secs(60),
        }
    }

    pub fn contracts(mut self, contracts: Arc<dyn ContractRegistry>) -> Self {
        self.contracts = contracts;
        self
    }

    pub fn failure_modes(mut self, failure_modes: Arc<dyn FailureModeRegistry>) -> Self {
        self.failure_modes = failure_modes;
        self
    }

    pub fn explanations(mut self, explanations: Arc<dyn ExplanationValidator>) -> Self {
        self.explanations = explanations;
        self
    }

    pub fn invariants(mut self, invariants: InvariantRegistry) -> Self {
        self.invariants = Arc::new(invariants);
        self
    }

    pub fn purity(mut self, purity: Arc<dyn PurityChecker>) -> Self {
        self.purity = purity;
        self
    }

    pub fn conformance(mut self, conformance: Arc<dyn ConformanceValidator>) -> Self {
        self.conformance = conformance;
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn build(self) -> CoreResult<AgentExecutionContext> {
        let store = self
            .store
            .ok_or_else(|| CoreError::Config("pipeline context requires a store".into()))?;
        Ok(AgentExecutionContext {
            contracts: self.contracts,
            failure_modes: self.failure_modes,
            explanations: self.explanations,
            ledger: self.ledger,
            invariants: self.invariants,
            purity: self.purity,
            conformance: self.conformance,
            store,
            require_contract: self.require_contract,
            generation_timeout: self.generation_timeout,
        })
    }
}
