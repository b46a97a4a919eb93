//! Main ledger orchestration layer
//!
//! This module ties together storage and the writer actor into the wallet
//! API. [`post_movement`] is the only code path that changes a balance; it
//! updates the wallet and appends the movement in the same unit of work, so
//! the returned `balance_after` is the committed post-update balance.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger, MovementKind, Reference};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let user = ledger.register_user(None).await?;
//!     let balance = ledger
//!         .apply_movement(user.id, Decimal::from(100), MovementKind::Credit, Reference::manual())
//!         .await?;
//!     assert_eq!(balance, Decimal::from(100));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    accounts,
    actor::{spawn_ledger_actor, LedgerHandle},
    storage::{cf, index, index_key, ScanOrder},
    types::{LedgerMovement, MovementKind, Reconciliation, Reference, User, UserId, Wallet},
    unit::UnitOfWork,
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_ledger_actor(storage.clone(), config.actor.mailbox_capacity);

        tracing::info!(
            service = %config.service_name,
            data_dir = ?config.data_dir,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            config,
        })
    }

    /// Writer handle, for units of work spanning more than the ledger
    pub fn handle(&self) -> &LedgerHandle {
        &self.handle
    }

    /// Read-only store access
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Users

    /// Register a user, optionally referred by another user's code
    pub async fn register_user(&self, referral_code: Option<String>) -> Result<User> {
        let user = self
            .handle
            .transact(move |uow| accounts::register_in(uow, referral_code.as_deref(), Utc::now()))
            .await?;

        tracing::info!(
            user_id = %user.id,
            referral_code = %user.referral_code,
            referred_by = ?user.referred_by,
            "User registered"
        );
        Ok(user)
    }

    /// Get user by ID
    pub fn get_user(&self, user_id: UserId) -> Result<User> {
        self.storage
            .get(cf::USERS, user_id.as_bytes())?
            .ok_or(Error::UserNotFound(user_id))
    }

    /// Resolve a referral code
    pub fn find_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        let code = accounts::normalize_referral_code(code);
        match self.storage.get::<UserId>(cf::REFERRAL_CODES, code.as_bytes())? {
            Some(user_id) => Ok(Some(self.get_user(user_id)?)),
            None => Ok(None),
        }
    }

    /// Users registered with this user's referral code, in registration order
    pub fn referrals_of(&self, referrer: UserId) -> Result<Vec<User>> {
        let prefix = index_key(index::REFERRALS, &[referrer.as_bytes()]);
        self.storage
            .scan_index(&prefix, ScanOrder::Oldest)?
            .into_iter()
            .map(|suffix| self.get_user(UserId::from_uuid(uuid_from_suffix(&suffix)?)))
            .collect()
    }

    // Wallets

    /// Get wallet
    pub fn get_wallet(&self, user_id: UserId) -> Result<Wallet> {
        self.storage
            .get(cf::WALLETS, user_id.as_bytes())?
            .ok_or(Error::WalletNotFound(user_id))
    }

    /// Current balance (never negative)
    pub fn get_balance(&self, user_id: UserId) -> Result<Decimal> {
        Ok(self.get_wallet(user_id)?.balance)
    }

    /// Change a balance and append its movement atomically.
    ///
    /// Debits larger than the balance fail with [`Error::InsufficientFunds`]
    /// and leave the wallet untouched. Returns the post-update balance.
    pub async fn apply_movement(
        &self,
        user_id: UserId,
        amount: Decimal,
        kind: MovementKind,
        reference: Reference,
    ) -> Result<Decimal> {
        let movement = self
            .handle
            .transact(move |uow| post_movement(uow, user_id, amount, kind, reference, Utc::now()))
            .await?;

        tracing::info!(
            user_id = %user_id,
            movement_id = %movement.movement_id,
            kind = %kind,
            amount = %amount,
            balance_after = %movement.balance_after,
            reference = %movement.reference.kind,
            "Movement committed"
        );
        Ok(movement.balance_after)
    }

    /// Movements for a user, newest first
    pub fn movements(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerMovement>> {
        let prefix = index_key(index::USER_MOVEMENTS, &[user_id.as_bytes()]);
        self.storage
            .scan_index(&prefix, ScanOrder::Newest)?
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|suffix| self.get_movement(uuid_from_suffix(&suffix)?))
            .collect()
    }

    /// Get movement by ID
    pub fn get_movement(&self, movement_id: Uuid) -> Result<LedgerMovement> {
        self.storage
            .get(cf::MOVEMENTS, movement_id.as_bytes())?
            .ok_or_else(|| {
                Error::InvariantViolation(format!("Indexed movement {} is missing", movement_id))
            })
    }

    /// Compare a wallet with the sum of its movements
    pub fn reconcile(&self, user_id: UserId) -> Result<Reconciliation> {
        let wallet = self.get_wallet(user_id)?;
        let movements = self.movements(user_id, usize::MAX, 0)?;

        let movement_sum = movements
            .iter()
            .try_fold(Decimal::ZERO, |acc, m| acc.checked_add(m.amount))
            .ok_or_else(|| Error::InvariantViolation("Movement sum overflow".to_string()))?;

        let reconciliation = Reconciliation {
            user_id,
            balance: wallet.balance,
            movement_sum,
            movement_count: movements.len() as u64,
        };

        if !reconciliation.is_balanced() {
            tracing::error!(
                user_id = %user_id,
                balance = %reconciliation.balance,
                movement_sum = %reconciliation.movement_sum,
                "Wallet does not match its movement log"
            );
        }

        Ok(reconciliation)
    }

    /// Shutdown ledger
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

/// Apply one movement inside a unit of work.
///
/// Reads the wallet, checks the debit against the balance, stages the new
/// wallet state, the movement record and its index entry. Nothing is
/// visible until the enclosing unit commits.
pub fn post_movement(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    amount: Decimal,
    kind: MovementKind,
    reference: Reference,
    now: DateTime<Utc>,
) -> Result<LedgerMovement> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "Movement amount must be positive, got {}",
            amount
        )));
    }

    let mut wallet: Wallet = uow
        .get(cf::WALLETS, user_id.as_bytes())?
        .ok_or(Error::WalletNotFound(user_id))?;

    let balance_after = match kind {
        MovementKind::Credit => wallet
            .balance
            .checked_add(amount)
            .ok_or_else(|| Error::InvalidAmount(format!("Credit of {} overflows", amount)))?,
        MovementKind::Debit => {
            if amount > wallet.balance {
                return Err(Error::InsufficientFunds {
                    user: user_id,
                    requested: amount,
                    available: wallet.balance,
                });
            }
            wallet.balance - amount
        }
    };

    let movement = LedgerMovement {
        movement_id: Uuid::now_v7(),
        user_id,
        amount: kind.signed(amount),
        kind,
        balance_after,
        reference,
        created_at: now,
    };

    wallet.balance = balance_after;
    wallet.movement_count += 1;
    wallet.last_movement_id = Some(movement.movement_id);
    wallet.updated_at = now;

    uow.put(cf::WALLETS, user_id.as_bytes(), &wallet)?;
    uow.put(cf::MOVEMENTS, movement.movement_id.as_bytes(), &movement)?;
    uow.put_index(index_key(
        index::USER_MOVEMENTS,
        &[user_id.as_bytes(), movement.movement_id.as_bytes()],
    ));

    tracing::debug!(
        user_id = %user_id,
        movement_id = %movement.movement_id,
        amount = %movement.amount,
        "Movement staged"
    );

    Ok(movement)
}

/// Decode a 16-byte UUID index suffix
pub fn uuid_from_suffix(suffix: &[u8]) -> Result<Uuid> {
    let bytes: [u8; 16] = suffix
        .get(..16)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Storage(format!("Malformed index suffix of {} bytes", suffix.len())))?;
    Ok(Uuid::from_bytes(bytes))
}
