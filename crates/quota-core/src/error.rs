//! Domain-level error types.

use std::time::Duration;

use thiserror::Error;

/// Policy construction errors - programmer errors, never runtime decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("max attempts must be greater than zero")]
    ZeroAttempts,

    #[error("window duration must be greater than zero")]
    ZeroWindow,

    #[error("window duration {0:?} is out of range")]
    WindowOutOfRange(Duration),
}

/// Counter store errors.
///
/// Every variant is a transport or operational failure of a store. None of
/// them reach callers of the gate; they only trigger the local fallback.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation failed: {0}")]
    Operation(String),
}
