//! Status transition rules for workflows and tasks, plus the lifecycle event bus.
//!
//! Both tables are checked before any status write reaches the store, so an
//! illegal jump surfaces as [`CoreError::InvalidTransition`] instead of a
//! corrupted record.
//!
//! [`CoreError::InvalidTransition`]: crate::error::CoreError::InvalidTransition

pub mod events;
pub mod transitions;

pub use events::{EventBus, FlowEvent};
pub use transitions::{TaskTransition, WorkflowTransition};
