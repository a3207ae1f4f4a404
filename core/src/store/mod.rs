//! Persistence collaborator.
//!
//! The core only relies on insert, get-by-id, partial update-by-id and
//! filtered list over four tables: workflows, tasks, generation results and
//! audit logs. [`MemoryStore`] is the in-process implementation; durable
//! backends live in the plugins crate.

mod memory;
mod patch;
mod r#trait;

pub use memory::{MemoryStore, StoreSnapshot};
pub use patch::{TaskFilter, TaskPatch, WorkflowPatch};
pub use r#trait::Store;
