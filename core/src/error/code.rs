/// Stable numeric error codes shared by logs, job records and CLI exit mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ValidationError = 3,
    NotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    Conflict = 13,
    InvalidTransition = 14,
    ExternalService = 20,
    RateLimited = 22,
    Timeout = 30,
    Cancelled = 31,
    DatabaseError = 40,
    ConfigError = 50,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
