//! Error types for the point service

use thiserror::Error;

/// Record store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not serve the request
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    /// A row with the same unique key already exists
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// No row matched the filter of an update
    #[error("Record not found: {0}")]
    Missing(String),

    /// The entry has already been flagged as rolled back
    #[error("Transaction already rolled back: {0}")]
    AlreadyRolledBack(String),
}

/// Errors raised by read operations
#[derive(Error, Debug)]
pub enum PointError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PointError>;
