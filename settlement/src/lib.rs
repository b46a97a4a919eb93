//! Settlement Engine
//!
//! Sell-side settlement for the exchange: users sell cryptocurrency or gift
//! cards for platform credit, administrators settle the requests, and
//! referrers earn a commission on their referred users' completed sales.
//!
//! # Architecture
//!
//! 1. **Catalog**: Rates and amount bounds, frozen into each transaction at creation
//! 2. **Transactions**: `pending` → `completed` | `rejected` | `cancelled`
//! 3. **Settlement**: Status change, payout credit and referral bonus in one unit
//! 4. **Withdrawals**: Debit on request, refund on cancel
//!
//! All writes go through the ledger's single writer, so each operation is
//! atomic and serialized against every other.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use settlement::{Config, Exchange, SellRequest, SettlementTarget, TracingNotifier};
//!
//! #[tokio::main]
//! async fn main() -> settlement::Result<()> {
//!     let exchange = Exchange::open(Config::default(), Arc::new(TracingNotifier)).await?;
//!
//!     let seller = exchange.register_user(None).await?;
//!     let tx = exchange
//!         .create_sell_transaction(
//!             seller.id,
//!             SellRequest::Crypto { asset_id: 1, amount: Decimal::new(5, 1) },
//!         )
//!         .await?;
//!
//!     exchange
//!         .settle_transaction(tx.id, SettlementTarget::Completed, "admin")
//!         .await?;
//!     println!("Balance: {}", exchange.get_balance(seller.id)?);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod notify;
pub mod referral;
pub mod transactions;
pub mod types;
pub mod withdrawals;

// Re-exports
pub use allocator::AddressAllocator;
pub use catalog::{CryptoAsset, GiftCard, GiftCardSubcategory, RateCatalog};
pub use config::Config;
pub use engine::SettlementEngine;
pub use error::{Error, Result, ValidationError};
pub use exchange::Exchange;
pub use metrics::Metrics;
pub use notify::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use referral::ReferralCascade;
pub use transactions::TransactionStore;
pub use types::*;
pub use withdrawals::WithdrawalService;
