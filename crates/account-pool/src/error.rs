//! Pool error types

use thiserror::Error;

/// Errors from pool and accounts-file operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("accounts file parse error: {0}")]
    Parse(String),

    #[error("unknown account: {0}")]
    UnknownAccount(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
