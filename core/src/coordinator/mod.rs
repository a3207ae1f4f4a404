//! Dependency ordering and release of tasks across capability lanes.

mod graph;
mod service;

pub use graph::{DependencyNode, TaskGraph};
pub use service::{AgentCoordinator, CompletionReport, CoordinationPlan, FailureReport};
