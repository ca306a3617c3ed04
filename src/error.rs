//! Error types for the computation analyzer and compiler

use thiserror::Error;

/// Compilation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A structural or temporal invariant of a computation does not hold
    ///
    /// **Triggered by:** the checker, or analysis of a malformed computation
    /// **Example:** a variable read before it is written, a buffer allocated twice
    /// **Recovery:** none; this is a bug in the lowering or in an optimization pass
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The external lowering could not produce a computation for a request
    #[error("Lowering failed: {0}")]
    LoweringFailed(String),

    /// Options could not be parsed or are inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Aborts the compilation of the request that raised it
    Fatal,
    /// Bad input from the caller; may succeed with different input
    Recoverable,
}

impl Error {
    /// Create an invariant violation with a message
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// Create a lowering error with a message
    pub fn lowering(msg: impl Into<String>) -> Self {
        Error::LoweringFailed(msg.into())
    }

    /// Create a configuration error with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::InvariantViolation(_) => ErrorSeverity::Fatal,
            Error::LoweringFailed(_) | Error::InvalidConfig(_) => ErrorSeverity::Recoverable,
        }
    }

    /// True for checker / analysis failures
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;
