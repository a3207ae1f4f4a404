mod prompted;

pub use prompted::PromptedExecutor;
