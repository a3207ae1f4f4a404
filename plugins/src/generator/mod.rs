pub mod http;
pub mod template;

pub use http::{GeneratorHttpError, GeneratorHttpErrorKind, HttpTextGenerator};
pub use template::TemplateGenerator;
