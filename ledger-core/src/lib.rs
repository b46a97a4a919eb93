//! Tradegate Ledger Core
//!
//! Per-user credit wallets with an append-only movement log, backed by
//! RocksDB and written by a single actor.
//!
//! # Architecture
//!
//! - **Single Writer**: Every mutation runs as a unit of work on one actor task
//! - **Atomic Units**: A unit commits as one `WriteBatch` or leaves no trace
//! - **Direct Reads**: Queries read RocksDB without going through the actor
//! - **Time-Ordered Keys**: UUIDv7 identifiers keep index scans in creation order
//!
//! # Invariants
//!
//! - A balance never goes negative
//! - Every balance change has exactly one movement, written in the same batch
//! - Σ(movement.amount) == wallet.balance for every user
//! - Movements are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod accounts;
pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;
pub mod unit;

// Re-exports
pub use actor::LedgerHandle;
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{post_movement, uuid_from_suffix, Ledger};
pub use storage::{cf, index, index_key, ScanOrder, Storage};
pub use types::{
    LedgerMovement, MovementKind, Reconciliation, Reference, ReferenceKind, User, UserId, Wallet,
};
pub use unit::UnitOfWork;
