pub mod cli;
pub mod run;
pub mod submit;
pub mod validate;
