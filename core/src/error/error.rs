use thiserror::Error;

use super::code::ErrorCode;

pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy for every core operation.
///
/// Validation and not-found errors go straight back to the caller and are
/// never retried. `Timeout` and `ExternalService` are the only retryable
/// kinds; the job transport checks [`CoreError::is_retryable`] before it
/// schedules another attempt.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// Every offending field, not only the first one found.
        fields: Vec<String>,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("{service} failed: {message}")]
    ExternalService {
        service: String,
        message: String,
        rate_limited: bool,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("circular dependency detected: {0}")]
    CycleDetected(String),

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn missing_fields(fields: Vec<String>) -> Self {
        Self::Validation {
            message: format!("missing required fields: {}", fields.join(", ")),
            fields,
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn rate_limited(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            rate_limited: true,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ExternalService { .. })
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::ExternalService {
                rate_limited: true, ..
            } => ErrorCode::RateLimited,
            Self::ExternalService { .. } => ErrorCode::ExternalService,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::CycleDetected(_) => ErrorCode::CircularDependency,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::RetriesExhausted { .. } => ErrorCode::GeneralError,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("initialization failed: {0}")]
    Init(#[source] CoreError),
    #[error("smoke test failed: {0}")]
    SmokeTest(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
