//! Workflow intake and lifecycle.
//!
//! [`Orchestrator::start_workflow`] validates a requirement, builds the
//! five-phase plan and materializes chained phase-one tasks. Every later
//! status write goes through the transition tables in [`crate::state`].

mod planner;
mod service;

pub use planner::{build_plan, derive_phase_one_tasks, validate_plan};
pub use service::Orchestrator;
