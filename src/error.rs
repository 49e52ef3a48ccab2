//! Error types for Emberchain

use thiserror::Error;

/// Reasons a transaction is rejected by validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("missing or malformed signature")]
    BadSignature,
    #[error("sender address does not match the signing key")]
    SenderMismatch,
    #[error("spendable balance does not cover amount plus fee")]
    InsufficientBalance,
    #[error("sender already has a different transaction pending")]
    ConflictingPending,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("malformed block: {0}")]
    MalformedBlock(String),
    #[error("block hash does not meet the difficulty target")]
    DifficultyNotMet,
    #[error("merkle root does not match block transactions")]
    MerkleMismatch,
    #[error("invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("parent block {0} is not known on any chain")]
    UnknownParent(String),
    #[error("block already known")]
    BlockAlreadyKnown,
    #[error("transaction already pending")]
    DuplicateTransaction,
    #[error("nonce space exhausted for the current candidate")]
    NonceOverflow,
    #[error("chain integrity violation: {0}")]
    ChainIntegrity(String),
    #[error("cryptographic error: {0}")]
    Crypto(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::Database(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for ChainError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
