//! Error taxonomy for the replication engine.

use std::fmt;

use thiserror::Error;

/// Why the venue refused or failed to fill a replicated order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionFailure {
    /// Not enough collateral or allowance on the controlled account.
    InsufficientFunds,
    /// Venue throttled the request.
    RateLimited,
    /// Transport failure or venue-side 5xx.
    Network,
    /// Venue rejected the order (market closed, bad size, ...).
    Rejected,
}

impl ExecutionFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionFailure::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ExecutionFailure::RateLimited => "RATE_LIMITED",
            ExecutionFailure::Network => "NETWORK_ERROR",
            ExecutionFailure::Rejected => "REJECTED",
        }
    }

    /// Whether another attempt at the same order may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionFailure::RateLimited | ExecutionFailure::Network)
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt checkpoint state: {0}")]
    CorruptState(String),

    #[error("Checkpoint storage error: {0}")]
    Storage(String),

    #[error("Order feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Balance unavailable for {account}: {message}")]
    BalanceUnavailable { account: String, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Order execution failed ({reason}): {message}")]
    Execution {
        reason: ExecutionFailure,
        message: String,
    },
}

impl Error {
    pub fn execution(reason: ExecutionFailure, message: impl Into<String>) -> Self {
        Error::Execution {
            reason,
            message: message.into(),
        }
    }

    /// Errors that are absorbed with backoff and never cross a cycle boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::FeedUnavailable(_) | Error::BalanceUnavailable { .. } => true,
            Error::Execution { reason, .. } => reason.is_retryable(),
            _ => false,
        }
    }

    /// Errors that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::CorruptState(_) | Error::AccountNotFound(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
