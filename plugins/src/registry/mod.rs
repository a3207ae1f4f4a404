//! File-backed contract and failure-mode registries.
//!
//! Both accept TOML or JSON, picked by file extension.

mod file;

pub use file::{FileContractRegistry, FileFailureModeRegistry};
