//! Error types for the ledger

use crate::types::UserId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// Referral code does not belong to any user
    #[error("Unknown referral code: {0}")]
    UnknownReferralCode(String),

    /// Debit larger than the current balance
    #[error("Insufficient funds for user {user}: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Wallet owner
        user: UserId,
        /// Debit amount
        requested: Decimal,
        /// Balance at evaluation time
        available: Decimal,
    },

    /// Amount is zero, negative or overflows
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Invariant violation (balance vs. movement log, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether repeating the same request may succeed.
    ///
    /// Units of work commit atomically, so a failed attempt left nothing behind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Concurrency(_) | Error::Io(_))
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Storage("disk".into()).is_retryable());
        assert!(Error::Concurrency("mailbox closed".into()).is_retryable());
        assert!(!Error::InsufficientFunds {
            user: UserId::generate(),
            requested: Decimal::from(10),
            available: Decimal::ZERO,
        }
        .is_retryable());
        assert!(!Error::UnknownReferralCode("ABCD1234".into()).is_retryable());
    }
}
