//! Error types for the balance mutation engine
//!
//! Two layers live here. [`StoreError`] is what account storage backends
//! report. [`Error`] is the taxonomy every service operation returns; storage
//! failures are always folded into [`Error::OperationFailed`] before they
//! reach a caller.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by an account store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The account changed between read and conditional write
    #[error("Concurrent modification of account {account_id}")]
    Conflict {
        /// Account whose version no longer matched
        account_id: String,
    },

    /// An account with this ID already exists
    #[error("Account already exists: {account_id}")]
    Duplicate {
        account_id: String,
    },

    /// Stored data could not be interpreted
    #[error("Corrupted account data: {0}")]
    Corrupted(String),
}

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Balance engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// Structural validation of a request failed
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Account is absent or not owned by the acting user
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Store read or write failed or reported a conflict
    #[error("Operation failed: {message}")]
    OperationFailed {
        /// Context for the failure
        message: String,
        /// Lower-level cause, when one exists
        #[source]
        source: Option<StoreError>,
    },

    /// Functionality reserved but not available yet
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Delta computation left the representable balance range
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Result would be negative while negative balances are disallowed
    #[error("Negative balance rejected: {0}")]
    NegativeBalanceRejected(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an `OperationFailed` error with no underlying cause
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Error::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedRequest(_) => "malformed_request",
            Error::AccountNotFound(_) => "account_not_found",
            Error::OperationFailed { .. } => "operation_failed",
            Error::NotImplemented(_) => "not_implemented",
            Error::ArithmeticOverflow(_) => "arithmetic_overflow",
            Error::NegativeBalanceRejected(_) => "negative_balance_rejected",
            Error::ConfigurationError(_) => "configuration_error",
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::OperationFailed {
                source: Some(StoreError::Conflict { .. }),
                ..
            }
        )
    }
}

/// Storage failures never cross the service boundary unwrapped
impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::OperationFailed {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::MalformedRequest(msg) => Error::MalformedRequest(format!("{}: {}", context, msg)),
                Error::AccountNotFound(msg) => Error::AccountNotFound(format!("{}: {}", context, msg)),
                Error::OperationFailed { message, source } => Error::OperationFailed {
                    message: format!("{}: {}", context, message),
                    source,
                },
                Error::NotImplemented(msg) => Error::NotImplemented(format!("{}: {}", context, msg)),
                Error::ArithmeticOverflow(msg) => Error::ArithmeticOverflow(format!("{}: {}", context, msg)),
                Error::NegativeBalanceRejected(msg) => Error::NegativeBalanceRejected(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
            }
        })
    }
}

impl<T> ErrorExt<T> for StoreResult<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| Error::OperationFailed {
            message: format!("{}: {}", context_fn(), e),
            source: Some(e),
        })
    }
}

/// Structured error carried back to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (string identifier for the error type)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> Self {
        ErrorResponse::from(&err)
    }
}

/// Convert JSON decoding failures into request errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedRequest(err.to_string())
    }
}
