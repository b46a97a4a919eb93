//! Error types for the settlement engine

use crate::types::AssetRef;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
#[derive(Error, Debug)]
pub enum Error {
    /// Request rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown transaction, or one the requester does not own
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    /// Catalog has no such asset
    #[error("Asset not found: {0}")]
    AssetNotFound(AssetRef),

    /// Operation not allowed in the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transaction left `pending` before this settlement ran
    #[error("Transaction {0} already settled")]
    AlreadySettled(Uuid),

    /// Unknown withdrawal, or one the requester does not own
    #[error("Withdrawal not found: {0}")]
    WithdrawalNotFound(Uuid),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_core::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the same request may succeed when repeated.
    ///
    /// Only storage and writer faults qualify; every unit of work is atomic,
    /// so the failed attempt left no partial state behind.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ledger(e) => e.is_retryable(),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Debit larger than the wallet balance
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Error::Ledger(ledger_core::Error::InsufficientFunds { .. }))
    }
}

/// Why a request was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Amount is zero or negative
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Amount under the asset minimum
    #[error("Amount {amount} is below minimum limit of {min}")]
    BelowMinimum {
        /// Requested amount
        amount: Decimal,
        /// Asset minimum
        min: Decimal,
    },

    /// Amount over the asset maximum
    #[error("Amount {amount} exceeds maximum limit of {max}")]
    AboveMaximum {
        /// Requested amount
        amount: Decimal,
        /// Asset maximum
        max: Decimal,
    },

    /// Catalog has no such asset
    #[error("Unknown asset: {0}")]
    UnknownAsset(AssetRef),

    /// Asset exists but is not tradable
    #[error("Asset is not active: {0}")]
    InactiveAsset(AssetRef),

    /// Gift card has no such subcategory
    #[error("Gift card {card_id} has no subcategory {subcategory_id}")]
    UnknownSubcategory {
        /// Gift card
        card_id: u32,
        /// Requested subcategory
        subcategory_id: u32,
    },

    /// Gift-card sale without proof images
    #[error("At least one proof image is required")]
    MissingProofImage,

    /// Gift-card sale without a card code
    #[error("Card code must not be empty")]
    EmptyCardCode,

    /// Effective rate (base plus adjustment) is zero or negative
    #[error("Effective rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    /// Percentage below zero
    #[error("Percentage must not be negative, got {0}")]
    NegativePercentage(Decimal),

    /// Malformed catalog entry
    #[error("Invalid asset definition: {0}")]
    InvalidDefinition(String),

    /// Withdrawal without a destination
    #[error("Withdrawal destination must not be empty")]
    EmptyDestination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::UserId;

    #[test]
    fn test_retryable_classification() {
        let storage = Error::Ledger(ledger_core::Error::Storage("disk".into()));
        assert!(storage.is_retryable());

        let closed = Error::Ledger(ledger_core::Error::Concurrency("closed".into()));
        assert!(closed.is_retryable());

        assert!(!Error::AlreadySettled(Uuid::nil()).is_retryable());
        assert!(!Error::Validation(ValidationError::MissingProofImage).is_retryable());
    }

    #[test]
    fn test_insufficient_funds_is_distinguishable() {
        let err: Error = ledger_core::Error::InsufficientFunds {
            user: UserId::generate(),
            requested: Decimal::from(5),
            available: Decimal::ONE,
        }
        .into();

        assert!(err.is_insufficient_funds());
        assert!(!err.is_retryable());
        assert!(!Error::InvalidState("cancelled".into()).is_insufficient_funds());
    }

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::BelowMinimum {
            amount: Decimal::new(1, 4),
            min: Decimal::new(1, 3),
        };
        assert_eq!(err.to_string(), "Amount 0.0001 is below minimum limit of 0.001");
    }
}
