//! Constrained execution: explanation before emission, then structural gates.
//!
//! [`run_pipeline`] drives one attempt through eight stages against a bound
//! [`AgentExecutionContext`] and always persists a [`GenerationResult`] with
//! the audit trail, whether or not the attempt passed.
//!
//! [`GenerationResult`]: crate::model::GenerationResult

mod collaborators;
mod context;
mod defaults;
mod executor;
mod ledger;
mod run;

pub use collaborators::{
    ConformanceValidator, ContractRegistry, DomainContract, ExplanationValidator, FailureMode,
    FailureModeRegistry, FailureModeSpec, Invariant, InvariantState, InvariantViolation,
    ModuleKind, PurityChecker, PurityReport, Severity,
};
pub use context::{AgentExecutionContext, AgentExecutionContextBuilder};
pub use defaults::{
    FieldPresenceConformance, InMemoryContractRegistry, InMemoryFailureModeRegistry,
    InvariantRegistry, RegexPurityChecker, SectionExplanationValidator,
};
pub use executor::{CapabilityExecutor, ExecutionRequest, TextGenerator};
pub use ledger::ExplanationLedger;
pub use run::{run_pipeline, PipelineState};
