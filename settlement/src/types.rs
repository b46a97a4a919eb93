//! Core types for sell transactions, bonuses and withdrawals

use chrono::{DateTime, Utc};
use ledger_core::{LedgerMovement, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What is being sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Cryptocurrency sent to a deposit address
    Crypto,
    /// Gift card redeemed by code
    GiftCard,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Crypto => write!(f, "crypto"),
            AssetKind::GiftCard => write!(f, "giftcard"),
        }
    }
}

/// Reference to a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetRef {
    /// Crypto asset
    Crypto {
        /// Catalog ID
        asset_id: u32,
    },
    /// Gift card, optionally narrowed to a subcategory
    GiftCard {
        /// Catalog ID
        card_id: u32,
        /// Subcategory with its own rate adjustment
        subcategory_id: Option<u32>,
    },
}

impl AssetRef {
    /// Kind of asset referenced
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetRef::Crypto { .. } => AssetKind::Crypto,
            AssetRef::GiftCard { .. } => AssetKind::GiftCard,
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRef::Crypto { asset_id } => write!(f, "crypto:{}", asset_id),
            AssetRef::GiftCard {
                card_id,
                subcategory_id: Some(sub),
            } => write!(f, "giftcard:{}/{}", card_id, sub),
            AssetRef::GiftCard {
                card_id,
                subcategory_id: None,
            } => write!(f, "giftcard:{}", card_id),
        }
    }
}

/// Resolved catalog entry with its effective rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDefinition {
    /// Entry this definition was resolved from
    pub asset: AssetRef,
    /// Display name
    pub name: String,
    /// Ticker symbol (crypto only)
    pub symbol: Option<String>,
    /// Credit per asset unit, adjustments applied
    pub rate: Decimal,
    /// Smallest sellable amount
    pub min_amount: Decimal,
    /// Largest sellable amount, zero means unbounded
    pub max_amount: Decimal,
    /// Listed for new sales
    pub active: bool,
}

/// Sell transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Awaiting settlement (initial)
    Pending = 1,
    /// Paid out (terminal)
    Completed = 2,
    /// Refused by an administrator (terminal)
    Rejected = 3,
    /// Withdrawn by the seller (terminal)
    Cancelled = 4,
}

impl TransactionStatus {
    /// Every status, in lifecycle order
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Rejected,
        TransactionStatus::Cancelled,
    ];

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Stable byte used in index keys
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal status a settlement may choose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementTarget {
    /// Credit the seller
    Completed,
    /// Close without payout
    Rejected,
}

impl From<SettlementTarget> for TransactionStatus {
    fn from(target: SettlementTarget) -> Self {
        match target {
            SettlementTarget::Completed => TransactionStatus::Completed,
            SettlementTarget::Rejected => TransactionStatus::Rejected,
        }
    }
}

/// Sell request as submitted by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellRequest {
    /// Sell cryptocurrency
    Crypto {
        /// Catalog ID
        asset_id: u32,
        /// Quantity in asset units
        amount: Decimal,
    },
    /// Sell a gift card
    GiftCard {
        /// Catalog ID
        card_id: u32,
        /// Optional subcategory
        subcategory_id: Option<u32>,
        /// Face value in card units
        amount: Decimal,
        /// Redemption code
        card_code: String,
        /// Stable references to uploaded proof images
        images: Vec<String>,
    },
}

impl SellRequest {
    /// Kind of asset being sold
    pub fn kind(&self) -> AssetKind {
        self.asset().kind()
    }

    /// Catalog entry being sold
    pub fn asset(&self) -> AssetRef {
        match self {
            SellRequest::Crypto { asset_id, .. } => AssetRef::Crypto {
                asset_id: *asset_id,
            },
            SellRequest::GiftCard {
                card_id,
                subcategory_id,
                ..
            } => AssetRef::GiftCard {
                card_id: *card_id,
                subcategory_id: *subcategory_id,
            },
        }
    }

    /// Quantity sold
    pub fn amount(&self) -> Decimal {
        match self {
            SellRequest::Crypto { amount, .. } | SellRequest::GiftCard { amount, .. } => *amount,
        }
    }
}

/// Kind-specific transaction data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionDetails {
    /// Crypto sale
    Crypto {
        /// Where the seller sends the coins
        deposit_address: String,
    },
    /// Gift-card sale
    GiftCard {
        /// Redemption code
        card_code: String,
        /// Proof image references (at least one)
        images: Vec<String>,
    },
}

/// A sell request and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID (UUIDv7, time-ordered)
    pub id: Uuid,
    /// Seller
    pub user_id: UserId,
    /// Asset sold
    pub asset: AssetRef,
    /// Quantity sold, asset-denominated
    pub amount: Decimal,
    /// Credit per unit, frozen at creation
    pub rate: Decimal,
    /// Current status
    pub status: TransactionStatus,
    /// Administrator who settled it
    pub settled_by: Option<String>,
    /// Kind-specific data
    pub details: TransactionDetails,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Kind of asset sold
    pub fn kind(&self) -> AssetKind {
        self.asset.kind()
    }

    /// Credit due on completion: amount × frozen rate
    pub fn payout(&self) -> Option<Decimal> {
        self.amount.checked_mul(self.rate)
    }
}

/// Result of a committed settlement
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    /// Transaction after the transition
    pub transaction: Transaction,
    /// Seller credit (completed only)
    pub payout: Option<LedgerMovement>,
    /// Referrer commission, when the seller was referred
    pub bonus: Option<ReferralBonus>,
}

/// Commission paid to a referrer for one settled sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralBonus {
    /// Bonus ID
    pub id: Uuid,
    /// User who receives the bonus
    pub referrer_id: UserId,
    /// Seller who was referred
    pub referred_user_id: UserId,
    /// Credit paid
    pub amount: Decimal,
    /// Settled sale that triggered it
    pub source_transaction_id: Uuid,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Withdrawal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    /// Funds held, payout outstanding
    Pending,
    /// Paid out by an administrator
    Paid,
    /// Cancelled and refunded
    Cancelled,
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Request to pay credit out of the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    /// Withdrawal ID (UUIDv7)
    pub id: Uuid,
    /// Wallet owner
    pub user_id: UserId,
    /// Credit debited
    pub amount: Decimal,
    /// Payout destination (bank account, address)
    pub destination: String,
    /// Current status
    pub status: WithdrawalStatus,
    /// Administrator who paid it
    pub processed_by: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Transaction counts and completed value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    /// All transactions
    pub total: u64,
    /// Awaiting settlement
    pub pending: u64,
    /// Paid out
    pub completed: u64,
    /// Rejected
    pub rejected: u64,
    /// Cancelled by the seller
    pub cancelled: u64,
    /// Crypto sales
    pub crypto: u64,
    /// Gift-card sales
    pub gift_card: u64,
    /// Σ(amount × rate) over completed transactions
    pub completed_value: Decimal,
}

impl TransactionStats {
    pub(crate) fn record(&mut self, tx: &Transaction) -> crate::Result<()> {
        self.total += 1;
        match tx.status {
            TransactionStatus::Pending => self.pending += 1,
            TransactionStatus::Completed => {
                self.completed += 1;
                self.completed_value = tx
                    .payout()
                    .and_then(|payout| self.completed_value.checked_add(payout))
                    .ok_or_else(|| {
                        ledger_core::Error::InvalidAmount(format!(
                            "Completed value overflows at transaction {}",
                            tx.id
                        ))
                    })?;
            }
            TransactionStatus::Rejected => self.rejected += 1,
            TransactionStatus::Cancelled => self.cancelled += 1,
        }
        match tx.kind() {
            AssetKind::Crypto => self.crypto += 1,
            AssetKind::GiftCard => self.gift_card += 1,
        }
        Ok(())
    }
}
