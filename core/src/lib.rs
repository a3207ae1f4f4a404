pub mod api;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod state;
pub mod store;
pub mod util;
pub mod worker;
