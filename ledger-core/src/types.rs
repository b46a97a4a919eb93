//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for credit)
//! - Time-ordered identifiers (UUIDv7) so index scans follow creation order

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// User identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Allocate a fresh, time-ordered user ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Raw key bytes (16 bytes, big-endian UUID layout)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered user (referral fields only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,

    /// Unique code other users register with
    pub referral_code: String,

    /// Referrer, resolved from a referral code at registration time.
    /// Never changes after the account exists.
    pub referred_by: Option<UserId>,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Per-user credit wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Owner
    pub user_id: UserId,

    /// Current balance, never negative
    pub balance: Decimal,

    /// Number of movements posted against this wallet
    pub movement_count: u64,

    /// Most recent movement
    pub last_movement_id: Option<Uuid>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Empty wallet for a newly registered user
    pub fn open(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            movement_count: 0,
            last_movement_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MovementKind {
    /// Balance increases
    Credit = 1,
    /// Balance decreases
    Debit = 2,
}

impl MovementKind {
    /// Apply the direction to an unsigned amount
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            MovementKind::Credit => amount,
            MovementKind::Debit => -amount,
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementKind::Credit => write!(f, "credit"),
            MovementKind::Debit => write!(f, "debit"),
        }
    }
}

/// What caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReferenceKind {
    /// Settled sell transaction
    Sale = 1,
    /// Commission for a referred user's sale
    ReferralBonus = 2,
    /// Withdrawal request (debit) or its refund (credit)
    Withdrawal = 3,
    /// Operator adjustment
    Manual = 4,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Sale => "sale",
            ReferenceKind::ReferralBonus => "referral-bonus",
            ReferenceKind::Withdrawal => "withdrawal",
            ReferenceKind::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Link from a movement to the record that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Kind of source record
    pub kind: ReferenceKind,
    /// Source record ID
    pub id: Uuid,
}

impl Reference {
    /// Reference a settled sale
    pub fn sale(transaction_id: Uuid) -> Self {
        Self { kind: ReferenceKind::Sale, id: transaction_id }
    }

    /// Reference the sale a referral bonus was paid for
    pub fn referral_bonus(source_transaction_id: Uuid) -> Self {
        Self { kind: ReferenceKind::ReferralBonus, id: source_transaction_id }
    }

    /// Reference a withdrawal request
    pub fn withdrawal(withdrawal_id: Uuid) -> Self {
        Self { kind: ReferenceKind::Withdrawal, id: withdrawal_id }
    }

    /// Operator adjustment with its own ID
    pub fn manual() -> Self {
        Self { kind: ReferenceKind::Manual, id: Uuid::now_v7() }
    }
}

/// Append-only record of one balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMovement {
    /// Movement ID (UUIDv7, time-ordered)
    pub movement_id: Uuid,

    /// Wallet owner
    pub user_id: UserId,

    /// Signed amount: positive for credits, negative for debits
    pub amount: Decimal,

    /// Direction
    pub kind: MovementKind,

    /// Wallet balance right after this movement
    pub balance_after: Decimal,

    /// Source record
    pub reference: Reference,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of comparing a wallet against its movement log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Wallet owner
    pub user_id: UserId,
    /// Stored balance
    pub balance: Decimal,
    /// Σ(movement.amount)
    pub movement_sum: Decimal,
    /// Number of movements found
    pub movement_count: u64,
}

impl Reconciliation {
    /// Balance matches the movement log
    pub fn is_balanced(&self) -> bool {
        self.balance == self.movement_sum
    }
}
