//! forgeflow-cli library; exposes the command layer for unit tests.

pub mod app;
pub mod commands;
