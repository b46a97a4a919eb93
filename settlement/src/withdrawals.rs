//! Withdrawals: paying credit out of the platform
//!
//! Requesting a withdrawal debits the wallet immediately, so the same credit
//! cannot be withdrawn twice or spent while the payout is outstanding.
//! Cancelling refunds it with a credit movement; completing only records who
//! paid it.

use crate::{
    metrics::Metrics,
    notify::{Notification, Notifier},
    types::{Withdrawal, WithdrawalStatus},
    Error, Result, ValidationError,
};
use chrono::Utc;
use ledger_core::{
    cf, index, index_key, post_movement, uuid_from_suffix, LedgerHandle, MovementKind, Reference,
    ScanOrder, Storage, UnitOfWork, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

fn load_in(uow: &UnitOfWork<'_>, withdrawal_id: Uuid) -> Result<Withdrawal> {
    uow.get(cf::WITHDRAWALS, withdrawal_id.as_bytes())?
        .ok_or(Error::WithdrawalNotFound(withdrawal_id))
}

fn ensure_pending(withdrawal: &Withdrawal) -> Result<()> {
    if withdrawal.status != WithdrawalStatus::Pending {
        return Err(Error::InvalidState(format!(
            "Withdrawal {} is {}, only pending withdrawals can change",
            withdrawal.id, withdrawal.status
        )));
    }
    Ok(())
}

/// Withdrawal requests against wallets
#[derive(Debug, Clone)]
pub struct WithdrawalService {
    handle: LedgerHandle,
    storage: Arc<Storage>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
}

impl WithdrawalService {
    /// Create service
    pub fn new(
        handle: LedgerHandle,
        storage: Arc<Storage>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            handle,
            storage,
            notifier,
            metrics,
        }
    }

    /// Debit `amount` and record a pending withdrawal.
    ///
    /// Fails with insufficient funds (see [`Error::is_insufficient_funds`])
    /// when the balance is short; nothing is written in that case.
    pub async fn request(
        &self,
        user_id: UserId,
        amount: Decimal,
        destination: &str,
    ) -> Result<Withdrawal> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        let destination = destination.trim().to_string();
        if destination.is_empty() {
            return Err(ValidationError::EmptyDestination.into());
        }

        let result = self
            .handle
            .transact(move |uow| -> Result<Withdrawal> {
                let now = Utc::now();
                let withdrawal = Withdrawal {
                    id: Uuid::now_v7(),
                    user_id,
                    amount,
                    destination,
                    status: WithdrawalStatus::Pending,
                    processed_by: None,
                    created_at: now,
                    updated_at: now,
                };

                post_movement(
                    uow,
                    user_id,
                    amount,
                    MovementKind::Debit,
                    Reference::withdrawal(withdrawal.id),
                    now,
                )?;
                uow.put(cf::WITHDRAWALS, withdrawal.id.as_bytes(), &withdrawal)?;
                uow.put_index(index_key(
                    index::USER_WITHDRAWALS,
                    &[user_id.as_bytes(), withdrawal.id.as_bytes()],
                ));
                Ok(withdrawal)
            })
            .await;

        let withdrawal = match result {
            Ok(withdrawal) => withdrawal,
            Err(e) => {
                tracing::warn!(user_id = %user_id, amount = %amount, error = %e, "Withdrawal refused");
                return Err(e);
            }
        };

        tracing::info!(
            withdrawal_id = %withdrawal.id,
            user_id = %user_id,
            amount = %amount,
            "Withdrawal requested"
        );
        self.after_commit(&withdrawal, true);
        Ok(withdrawal)
    }

    /// Cancel a pending withdrawal and refund it.
    ///
    /// Withdrawals owned by someone else are reported as not found.
    pub async fn cancel(&self, withdrawal_id: Uuid, requesting_user: UserId) -> Result<Withdrawal> {
        let withdrawal = self
            .handle
            .transact(move |uow| -> Result<Withdrawal> {
                let mut withdrawal = load_in(uow, withdrawal_id)?;
                if withdrawal.user_id != requesting_user {
                    return Err(Error::WithdrawalNotFound(withdrawal_id));
                }
                ensure_pending(&withdrawal)?;

                let now = Utc::now();
                post_movement(
                    uow,
                    withdrawal.user_id,
                    withdrawal.amount,
                    MovementKind::Credit,
                    Reference::withdrawal(withdrawal.id),
                    now,
                )?;

                withdrawal.status = WithdrawalStatus::Cancelled;
                withdrawal.updated_at = now;
                uow.put(cf::WITHDRAWALS, withdrawal.id.as_bytes(), &withdrawal)?;
                Ok(withdrawal)
            })
            .await?;

        tracing::info!(
            withdrawal_id = %withdrawal_id,
            user_id = %requesting_user,
            amount = %withdrawal.amount,
            "Withdrawal cancelled and refunded"
        );
        self.after_commit(&withdrawal, true);
        Ok(withdrawal)
    }

    /// Mark a pending withdrawal as paid out
    pub async fn complete(&self, withdrawal_id: Uuid, processed_by: &str) -> Result<Withdrawal> {
        let admin = processed_by.to_string();
        let withdrawal = self
            .handle
            .transact(move |uow| -> Result<Withdrawal> {
                let mut withdrawal = load_in(uow, withdrawal_id)?;
                ensure_pending(&withdrawal)?;

                withdrawal.status = WithdrawalStatus::Paid;
                withdrawal.processed_by = Some(admin);
                withdrawal.updated_at = Utc::now();
                uow.put(cf::WITHDRAWALS, withdrawal.id.as_bytes(), &withdrawal)?;
                Ok(withdrawal)
            })
            .await?;

        tracing::info!(
            withdrawal_id = %withdrawal_id,
            user_id = %withdrawal.user_id,
            processed_by = %processed_by,
            "Withdrawal paid"
        );
        self.after_commit(&withdrawal, false);
        Ok(withdrawal)
    }

    fn after_commit(&self, withdrawal: &Withdrawal, moved_balance: bool) {
        self.metrics.record_withdrawal(&withdrawal.status.to_string());
        if moved_balance {
            let kind = match withdrawal.status {
                WithdrawalStatus::Pending => MovementKind::Debit,
                _ => MovementKind::Credit,
            };
            self.metrics.record_movement(&kind.to_string());
        }
        self.notifier.notify(Notification::WithdrawalUpdated {
            withdrawal_id: withdrawal.id,
            user_id: withdrawal.user_id,
            amount: withdrawal.amount,
            status: withdrawal.status,
        });
    }

    /// Get withdrawal by ID
    pub fn get(&self, withdrawal_id: Uuid) -> Result<Withdrawal> {
        self.storage
            .get(cf::WITHDRAWALS, withdrawal_id.as_bytes())?
            .ok_or(Error::WithdrawalNotFound(withdrawal_id))
    }

    /// A user's withdrawals, newest first
    pub fn list_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let prefix = index_key(index::USER_WITHDRAWALS, &[user_id.as_bytes()]);
        self.storage
            .scan_index(&prefix, ScanOrder::Newest)?
            .iter()
            .map(|suffix| self.get(uuid_from_suffix(suffix)?))
            .collect()
    }
}
