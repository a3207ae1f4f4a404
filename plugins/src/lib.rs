pub mod agents;
pub mod factory;
pub mod generator;
pub mod registry;
pub mod retry;
pub mod services;
pub mod store;
