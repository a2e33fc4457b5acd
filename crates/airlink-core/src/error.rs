//! Error types for Airlink

use thiserror::Error;

/// Main error type for Airlink operations
#[derive(Error, Debug)]
pub enum AirlinkError {
    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote endpoint unreachable, timed out, or answered with garbage
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration file missing or malformed
    #[error("Config error: {0}")]
    Config(String),

    /// Public key material could not be decoded
    #[error("Key error: {0}")]
    Key(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The singleton user row has not been created yet
    #[error("User profile not initialized")]
    UserMissing,
}

impl From<serde_json::Error> for AirlinkError {
    fn from(err: serde_json::Error) -> Self {
        AirlinkError::Serialization(err.to_string())
    }
}

/// Result type alias using AirlinkError
pub type AirlinkResult<T> = Result<T, AirlinkError>;
