//! Referral cascade
//!
//! When a referred user's sale completes, the referrer receives
//! `payout × bonus_percentage / 100` as a credit movement, and a
//! [`ReferralBonus`] record keyed by the source transaction is written in
//! the same unit. The record key doubles as a guard: a second bonus for the
//! same transaction aborts the unit.

use crate::{
    error::{Result, ValidationError},
    types::ReferralBonus,
};
use chrono::{DateTime, Utc};
use ledger_core::{
    cf, index, index_key, post_movement, uuid_from_suffix, MovementKind, Reference, ScanOrder,
    Storage, UnitOfWork, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Computes and posts referrer commissions
#[derive(Debug, Clone)]
pub struct ReferralCascade {
    storage: Arc<Storage>,
    bonus_percentage: Decimal,
}

impl ReferralCascade {
    /// Create cascade paying `bonus_percentage` percent of each payout
    pub fn new(storage: Arc<Storage>, bonus_percentage: Decimal) -> Result<Self> {
        if bonus_percentage < Decimal::ZERO {
            return Err(ValidationError::NegativePercentage(bonus_percentage).into());
        }
        Ok(Self {
            storage,
            bonus_percentage,
        })
    }

    /// Configured percentage
    pub fn bonus_percentage(&self) -> Decimal {
        self.bonus_percentage
    }

    /// Bonus owed on a payout
    pub fn bonus_for(&self, base_amount: Decimal) -> Option<Decimal> {
        base_amount
            .checked_mul(self.bonus_percentage)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
    }

    /// Credit the referrer and record the bonus, inside the settlement unit.
    ///
    /// Returns `None` when the computed bonus is zero (percentage set to 0).
    pub fn award_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        referrer_id: UserId,
        referred_user_id: UserId,
        base_amount: Decimal,
        source_transaction_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ReferralBonus>> {
        let amount = self.bonus_for(base_amount).ok_or_else(|| {
            ledger_core::Error::InvalidAmount(format!("Bonus on {} overflows", base_amount))
        })?;

        if amount <= Decimal::ZERO {
            tracing::debug!(
                source_transaction_id = %source_transaction_id,
                "Referral bonus is zero, skipped"
            );
            return Ok(None);
        }

        if uow.contains(cf::REFERRAL_BONUSES, source_transaction_id.as_bytes())? {
            return Err(ledger_core::Error::InvariantViolation(format!(
                "Referral bonus for transaction {} already paid",
                source_transaction_id
            ))
            .into());
        }

        post_movement(
            uow,
            referrer_id,
            amount,
            MovementKind::Credit,
            Reference::referral_bonus(source_transaction_id),
            now,
        )?;

        let bonus = ReferralBonus {
            id: Uuid::now_v7(),
            referrer_id,
            referred_user_id,
            amount,
            source_transaction_id,
            created_at: now,
        };

        uow.put(cf::REFERRAL_BONUSES, source_transaction_id.as_bytes(), &bonus)?;
        uow.put_index(index_key(
            index::REFERRER_BONUSES,
            &[referrer_id.as_bytes(), source_transaction_id.as_bytes()],
        ));

        Ok(Some(bonus))
    }

    /// Bonus paid for a transaction, if any
    pub fn bonus_for_transaction(&self, transaction_id: Uuid) -> Result<Option<ReferralBonus>> {
        Ok(self
            .storage
            .get(cf::REFERRAL_BONUSES, transaction_id.as_bytes())?)
    }

    /// Bonuses earned by a referrer, newest sale first
    pub fn bonuses_for(&self, referrer_id: UserId) -> Result<Vec<ReferralBonus>> {
        let prefix = index_key(index::REFERRER_BONUSES, &[referrer_id.as_bytes()]);
        let mut bonuses = Vec::new();
        for suffix in self.storage.scan_index(&prefix, ScanOrder::Newest)? {
            let transaction_id = uuid_from_suffix(&suffix)?;
            let bonus = self.bonus_for_transaction(transaction_id)?.ok_or_else(|| {
                ledger_core::Error::InvariantViolation(format!(
                    "Indexed bonus for {} is missing",
                    transaction_id
                ))
            })?;
            bonuses.push(bonus);
        }
        Ok(bonuses)
    }

    /// Total earned by a referrer
    pub fn total_bonus(&self, referrer_id: UserId) -> Result<Decimal> {
        self.bonuses_for(referrer_id)?
            .iter()
            .try_fold(Decimal::ZERO, |total, bonus| total.checked_add(bonus.amount))
            .ok_or_else(|| {
                ledger_core::Error::InvalidAmount(format!(
                    "Bonus total for {} overflows",
                    referrer_id
                ))
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{Config, Ledger};

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_bonus_arithmetic() {
        let (ledger, _temp) = create_test_ledger().await;
        let cascade = ReferralCascade::new(ledger.storage().clone(), Decimal::from(5)).unwrap();

        assert_eq!(cascade.bonus_for(Decimal::from(30000)), Some(Decimal::from(1500)));
        assert_eq!(cascade.bonus_for(Decimal::new(1999, 2)), Some(Decimal::new(9995, 4)));

        assert!(ReferralCascade::new(ledger.storage().clone(), Decimal::from(-1)).is_err());
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_award_once_per_transaction() {
        let (ledger, _temp) = create_test_ledger().await;
        let cascade = ReferralCascade::new(ledger.storage().clone(), Decimal::from(5)).unwrap();

        let referrer = ledger.register_user(None).await.unwrap();
        let referred = ledger
            .register_user(Some(referrer.referral_code.clone()))
            .await
            .unwrap();
        let source = Uuid::now_v7();

        let award = cascade.clone();
        let bonus = ledger
            .handle()
            .transact(move |uow| {
                award.award_in(uow, referrer.id, referred.id, Decimal::from(30000), source, Utc::now())
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bonus.amount, Decimal::from(1500));
        assert_eq!(ledger.get_balance(referrer.id).unwrap(), Decimal::from(1500));

        let award = cascade.clone();
        let again = ledger
            .handle()
            .transact(move |uow| {
                award.award_in(uow, referrer.id, referred.id, Decimal::from(30000), source, Utc::now())
            })
            .await;
        assert!(again.is_err());
        assert_eq!(ledger.get_balance(referrer.id).unwrap(), Decimal::from(1500));

        assert_eq!(cascade.bonuses_for(referrer.id).unwrap(), vec![bonus]);
        assert_eq!(cascade.total_bonus(referrer.id).unwrap(), Decimal::from(1500));

        let movements = ledger.movements(referrer.id, 10, 0).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].reference, Reference::referral_bonus(source));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_percentage_pays_nothing() {
        let (ledger, _temp) = create_test_ledger().await;
        let cascade = ReferralCascade::new(ledger.storage().clone(), Decimal::ZERO).unwrap();
        let referrer = ledger.register_user(None).await.unwrap();
        let referred = ledger.register_user(None).await.unwrap();

        let award = cascade.clone();
        let bonus = ledger
            .handle()
            .transact(move |uow| {
                award.award_in(uow, referrer.id, referred.id, Decimal::from(100), Uuid::now_v7(), Utc::now())
            })
            .await
            .unwrap();

        assert!(bonus.is_none());
        assert_eq!(ledger.get_balance(referrer.id).unwrap(), Decimal::ZERO);
        assert!(cascade.bonuses_for(referrer.id).unwrap().is_empty());

        ledger.shutdown().await.unwrap();
    }
}
