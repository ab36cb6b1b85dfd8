//! Error types for Synclock

use thiserror::Error;

use crate::domain::locking::LockError;

/// Result type alias using Synclock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Synclock error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lock errors (E300-E399)
    #[error(transparent)]
    Lock(#[from] LockError),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lock(e) => e.code(),
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Lock(LockError::StoreUnavailable(_)) => {
                Some("Check that the lock store is reachable and retry".to_string())
            }
            Self::Lock(LockError::InvalidRequest(_)) => {
                Some("Pass a non-empty holder identity and task type".to_string())
            }
            Self::ConfigError(_) => Some("synclock config list".to_string()),
            Self::InvalidInput(_) => Some("synclock simulate --help".to_string()),
            _ => None,
        }
    }

    /// Whether this error came from the lock store rather than the caller
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_store_failure())
    }
}
