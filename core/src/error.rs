//! Error types for SURETY

use thiserror::Error;

/// Coarse classification of a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller may not perform the operation right now
    Authorization,
    /// Input was wrong; caller may correct and retry
    Validation,
    /// Caller or oracle is out of sync with current state
    Protocol,
    /// Nothing to hand out, or the funds cannot be moved
    Resource,
    Internal,
}

/// Main error type for SURETY
#[derive(Error, Debug)]
pub enum SuretyError {
    // ============ Authorization Errors ============
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Contract is not operational")]
    NotOperational,

    // ============ Validation Errors ============
    #[error("Invalid amount: expected {expected}, got {got}")]
    InvalidAmount { expected: u128, got: u128 },

    #[error("Invalid stake: cap {cap}, got {got}")]
    InvalidStake { cap: u128, got: u128 },

    #[error("Flight already registered: {0}")]
    DuplicateFlight(String),

    #[error("Unknown flight: {0}")]
    UnknownFlight(String),

    #[error("Airline already funded: {0}")]
    AlreadyFunded(String),

    #[error("Unknown oracle: {0}")]
    UnknownOracle(String),

    #[error("Invalid status code: {0}")]
    InvalidStatus(u8),

    // ============ Protocol Errors ============
    #[error("Index {index} does not match the oracle's indices or the active request")]
    IndexMismatch { index: u8 },

    #[error("Flight already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Oracle indices already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Policy already paid: {0}")]
    AlreadyPaid(String),

    #[error("Oracle request expired: {0}")]
    RequestExpired(String),

    // ============ Resource Errors ============
    #[error("Nothing owed to {0}")]
    NothingOwed(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u128, available: u128 },

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization failed: {0}")]
    SerializationError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SuretyError {
    pub fn category(&self) -> ErrorCategory {
        use SuretyError::*;
        match self {
            Unauthorized(_) | NotOperational => ErrorCategory::Authorization,
            InvalidAmount { .. }
            | InvalidStake { .. }
            | DuplicateFlight(_)
            | UnknownFlight(_)
            | AlreadyFunded(_)
            | UnknownOracle(_)
            | InvalidStatus(_)
            | ConfigError(_)
            | SerializationError(_) => ErrorCategory::Validation,
            IndexMismatch { .. }
            | AlreadyResolved(_)
            | AlreadyAssigned(_)
            | AlreadyPaid(_)
            | RequestExpired(_) => ErrorCategory::Protocol,
            NothingOwed(_) | InsufficientFunds { .. } | TransferFailed(_) => {
                ErrorCategory::Resource
            }
            Internal(_) | Other(_) => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for SuretyError {
    fn from(err: serde_json::Error) -> Self {
        SuretyError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for SuretyError {
    fn from(err: std::io::Error) -> Self {
        SuretyError::Internal(err.to_string())
    }
}
