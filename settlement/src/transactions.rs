//! Sell transaction store
//!
//! Owns the lifecycle of a sell request:
//!
//! ```text
//!            ┌──> completed
//! pending ───┼──> rejected      (settle, via SettlementEngine)
//!            └──> cancelled     (cancel, by the seller)
//! ```
//!
//! Every transition runs as a unit of work on the ledger writer. The record,
//! its per-user index entry and its status index entry are always written
//! together.

use crate::{
    allocator,
    catalog::RateCatalog,
    engine::SettlementEngine,
    metrics::Metrics,
    notify::{Notification, Notifier},
    types::{
        AssetDefinition, SellRequest, SettlementOutcome, SettlementTarget,
        Transaction, TransactionDetails, TransactionStats, TransactionStatus,
    },
    Error, Result, ValidationError,
};
use chrono::Utc;
use ledger_core::{
    accounts, cf, index, index_key, uuid_from_suffix, LedgerHandle, ScanOrder, Storage,
    UnitOfWork, UserId,
};
use rust_decimal::Decimal;
use std::{sync::Arc, time::Instant};
use uuid::Uuid;

fn status_key(status: TransactionStatus, transaction_id: Uuid) -> Vec<u8> {
    index_key(
        index::TRANSACTION_STATUS,
        &[&[status.as_byte()], transaction_id.as_bytes()],
    )
}

/// Load a transaction inside a unit of work
pub(crate) fn load_in(uow: &UnitOfWork<'_>, transaction_id: Uuid) -> Result<Transaction> {
    uow.get(cf::TRANSACTIONS, transaction_id.as_bytes())?
        .ok_or(Error::TransactionNotFound(transaction_id))
}

/// Stage an updated transaction and move its status index entry
pub(crate) fn store_transition_in(
    uow: &mut UnitOfWork<'_>,
    transaction: &Transaction,
    previous: TransactionStatus,
) -> Result<()> {
    uow.put(cf::TRANSACTIONS, transaction.id.as_bytes(), transaction)?;
    if previous != transaction.status {
        uow.delete(cf::INDICES, &status_key(previous, transaction.id));
        uow.put_index(status_key(transaction.status, transaction.id));
    }
    Ok(())
}

/// Sell transaction store
#[derive(Debug, Clone)]
pub struct TransactionStore {
    handle: LedgerHandle,
    storage: Arc<Storage>,
    catalog: Arc<RateCatalog>,
    engine: SettlementEngine,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    max_page_size: usize,
}

impl TransactionStore {
    /// Create store
    pub fn new(
        handle: LedgerHandle,
        storage: Arc<Storage>,
        catalog: Arc<RateCatalog>,
        engine: SettlementEngine,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        max_page_size: usize,
    ) -> Self {
        Self {
            handle,
            storage,
            catalog,
            engine,
            notifier,
            metrics,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Settlement engine used by [`TransactionStore::settle`]
    pub fn engine(&self) -> &SettlementEngine {
        &self.engine
    }

    // Commands

    /// Validate a sell request and record it as `pending`.
    ///
    /// The current catalog rate is frozen into the transaction. Crypto sales
    /// get the seller's deposit address for the asset, allocated in the same
    /// unit if it does not exist yet.
    pub async fn create(&self, user_id: UserId, request: SellRequest) -> Result<Transaction> {
        let definition = match self.validate(&request) {
            Ok(definition) => definition,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    asset = %request.asset(),
                    error = %e,
                    "Sell request rejected"
                );
                return Err(e);
            }
        };

        let transaction = self
            .handle
            .transact(move |uow| -> Result<Transaction> {
                accounts::get_user_in(uow, user_id)?;

                let now = Utc::now();
                let asset = request.asset();
                let amount = request.amount();
                let details = match request {
                    SellRequest::Crypto { asset_id, .. } => {
                        let symbol = definition.symbol.as_deref().ok_or_else(|| {
                            ledger_core::Error::InvariantViolation(format!(
                                "Crypto asset {} has no symbol",
                                asset_id
                            ))
                        })?;
                        TransactionDetails::Crypto {
                            deposit_address: allocator::allocate_in(uow, user_id, asset_id, symbol)?,
                        }
                    }
                    SellRequest::GiftCard {
                        card_code, images, ..
                    } => TransactionDetails::GiftCard {
                        card_code: card_code.trim().to_string(),
                        images,
                    },
                };

                let transaction = Transaction {
                    id: Uuid::now_v7(),
                    user_id,
                    asset,
                    amount,
                    rate: definition.rate,
                    status: TransactionStatus::Pending,
                    settled_by: None,
                    details,
                    created_at: now,
                    updated_at: now,
                };

                uow.put(cf::TRANSACTIONS, transaction.id.as_bytes(), &transaction)?;
                uow.put_index(index_key(
                    index::USER_TRANSACTIONS,
                    &[user_id.as_bytes(), transaction.id.as_bytes()],
                ));
                uow.put_index(status_key(transaction.status, transaction.id));

                Ok(transaction)
            })
            .await?;

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %user_id,
            asset = %transaction.asset,
            amount = %transaction.amount,
            rate = %transaction.rate,
            "Sell transaction created"
        );

        self.metrics
            .record_transaction_created(&transaction.kind().to_string());
        self.notifier.notify(Notification::TransactionCreated {
            transaction_id: transaction.id,
            user_id,
            kind: transaction.kind(),
        });

        Ok(transaction)
    }

    fn validate(&self, request: &SellRequest) -> Result<AssetDefinition> {
        let asset = request.asset();
        let definition = self.catalog.get_asset(&asset).map_err(|e| match e {
            Error::AssetNotFound(asset) => Error::Validation(ValidationError::UnknownAsset(asset)),
            other => other,
        })?;

        if !definition.active {
            return Err(ValidationError::InactiveAsset(asset).into());
        }
        if definition.rate <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveRate(definition.rate).into());
        }
        self.catalog.validate_amount(&definition, request.amount())?;

        if let SellRequest::GiftCard {
            card_code, images, ..
        } = request
        {
            if card_code.trim().is_empty() {
                return Err(ValidationError::EmptyCardCode.into());
            }
            if images.is_empty() || images.iter().any(|image| image.trim().is_empty()) {
                return Err(ValidationError::MissingProofImage.into());
            }
        }

        Ok(definition)
    }

    /// Cancel a pending transaction on behalf of its owner.
    ///
    /// Transactions owned by someone else are reported as not found.
    pub async fn cancel(&self, transaction_id: Uuid, requesting_user: UserId) -> Result<Transaction> {
        let result = self
            .handle
            .transact(move |uow| -> Result<Transaction> {
                let mut transaction = load_in(uow, transaction_id)?;
                if transaction.user_id != requesting_user {
                    return Err(Error::TransactionNotFound(transaction_id));
                }
                if transaction.status != TransactionStatus::Pending {
                    return Err(Error::InvalidState(format!(
                        "Transaction {} is {}, only pending transactions can be cancelled",
                        transaction_id, transaction.status
                    )));
                }

                let previous = transaction.status;
                transaction.status = TransactionStatus::Cancelled;
                transaction.updated_at = Utc::now();
                store_transition_in(uow, &transaction, previous)?;
                Ok(transaction)
            })
            .await;

        let transaction = match result {
            Ok(transaction) => transaction,
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    user_id = %requesting_user,
                    error = %e,
                    "Cancellation refused"
                );
                return Err(e);
            }
        };

        tracing::info!(
            transaction_id = %transaction_id,
            user_id = %requesting_user,
            "Sell transaction cancelled"
        );
        self.notifier.notify(Notification::TransactionCancelled {
            transaction_id,
            user_id: transaction.user_id,
        });

        Ok(transaction)
    }

    /// Settle a pending transaction to `completed` or `rejected`.
    ///
    /// A transaction that is no longer pending fails with
    /// [`Error::AlreadySettled`] and nothing is written.
    pub async fn settle(
        &self,
        transaction_id: Uuid,
        target: SettlementTarget,
        settled_by: &str,
    ) -> Result<SettlementOutcome> {
        let started = Instant::now();
        let engine = self.engine.clone();
        let admin = settled_by.to_string();

        let result = self
            .handle
            .transact(move |uow| engine.settle_in(uow, transaction_id, target, &admin, Utc::now()))
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let label = match &e {
                    Error::AlreadySettled(_) => "already_settled",
                    Error::TransactionNotFound(_) => "not_found",
                    _ => "failed",
                };
                self.metrics.record_settlement(label, elapsed);

                if e.is_retryable() {
                    tracing::error!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Settlement failed, transaction left pending"
                    );
                } else {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Settlement refused"
                    );
                }
                return Err(e);
            }
        };

        let transaction = &outcome.transaction;
        self.metrics
            .record_settlement(&transaction.status.to_string(), elapsed);

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %transaction.user_id,
            status = %transaction.status,
            settled_by = %settled_by,
            payout = ?outcome.payout.as_ref().map(|m| m.amount),
            "Sell transaction settled"
        );

        self.notifier.notify(Notification::TransactionSettled {
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            status: transaction.status,
            payout: outcome.payout.as_ref().map(|m| m.amount),
        });

        if let Some(movement) = &outcome.payout {
            self.metrics.record_movement(&movement.kind.to_string());
        }

        if let Some(bonus) = &outcome.bonus {
            self.metrics.record_movement("credit");
            self.metrics.record_referral_bonus();

            tracing::info!(
                referrer_id = %bonus.referrer_id,
                referred_user_id = %bonus.referred_user_id,
                amount = %bonus.amount,
                source_transaction_id = %bonus.source_transaction_id,
                "Referral bonus paid"
            );
            self.notifier.notify(Notification::ReferralBonusPaid {
                user_id: bonus.referrer_id,
                referred_user_id: bonus.referred_user_id,
                amount: bonus.amount,
                source_transaction_id: bonus.source_transaction_id,
            });
        }

        Ok(outcome)
    }

    // Queries

    /// Get transaction by ID
    pub fn get(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.storage
            .get(cf::TRANSACTIONS, transaction_id.as_bytes())?
            .ok_or(Error::TransactionNotFound(transaction_id))
    }

    /// A user's transactions, newest first.
    ///
    /// `limit` is capped at the configured maximum page size.
    pub fn list_user(&self, user_id: UserId, limit: usize, offset: usize) -> Result<Vec<Transaction>> {
        let prefix = index_key(index::USER_TRANSACTIONS, &[user_id.as_bytes()]);
        self.load_indexed(&prefix, ScanOrder::Newest)?
            .into_iter()
            .skip(offset)
            .take(limit.min(self.max_page_size))
            .map(|id| self.get(id))
            .collect()
    }

    /// Transactions awaiting settlement, oldest first
    pub fn list_pending(&self) -> Result<Vec<Transaction>> {
        self.list_by_status(TransactionStatus::Pending, ScanOrder::Oldest)
    }

    /// Transactions in one status
    pub fn list_by_status(
        &self,
        status: TransactionStatus,
        order: ScanOrder,
    ) -> Result<Vec<Transaction>> {
        let prefix = index_key(index::TRANSACTION_STATUS, &[&[status.as_byte()]]);
        self.load_indexed(&prefix, order)?
            .into_iter()
            .map(|id| self.get(id))
            .collect()
    }

    /// Counts per status and kind, for one user or everyone
    pub fn stats(&self, user_id: Option<UserId>) -> Result<TransactionStats> {
        let mut stats = TransactionStats::default();
        match user_id {
            Some(user_id) => {
                let prefix = index_key(index::USER_TRANSACTIONS, &[user_id.as_bytes()]);
                for id in self.load_indexed(&prefix, ScanOrder::Oldest)? {
                    stats.record(&self.get(id)?)?;
                }
            }
            None => {
                for status in TransactionStatus::ALL {
                    for transaction in self.list_by_status(status, ScanOrder::Oldest)? {
                        stats.record(&transaction)?;
                    }
                }
            }
        }
        Ok(stats)
    }

    fn load_indexed(&self, prefix: &[u8], order: ScanOrder) -> Result<Vec<Uuid>> {
        self.storage
            .scan_index(prefix, order)?
            .iter()
            .map(|suffix| Ok(uuid_from_suffix(suffix)?))
            .collect()
    }
}
