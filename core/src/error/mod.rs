#[allow(clippy::module_inception)]
pub mod error;
pub mod code;

pub use code::ErrorCode;
pub use error::{CliError, CoreError, CoreResult};
