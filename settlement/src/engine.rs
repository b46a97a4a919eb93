//! Settlement engine
//!
//! Moves a pending transaction to `completed` or `rejected` inside one unit
//! of work on the ledger writer:
//!
//! 1. Re-read the transaction; anything but `pending` is [`Error::AlreadySettled`]
//! 2. Record the new status and the settling administrator
//! 3. On completion, credit `amount × rate` (the rate frozen at creation)
//! 4. If the seller was referred, run the referral cascade on the payout
//!
//! Any failure discards the whole unit and the transaction stays `pending`.

use crate::{
    referral::ReferralCascade,
    transactions::{load_in, store_transition_in},
    types::{SettlementOutcome, SettlementTarget, TransactionStatus},
    Error, Result,
};
use chrono::{DateTime, Utc};
use ledger_core::{accounts, post_movement, MovementKind, Reference, UnitOfWork};
use uuid::Uuid;

/// Settlement engine
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    /// Referral commission on completed sales
    referrals: ReferralCascade,
}

impl SettlementEngine {
    /// Create new settlement engine
    pub fn new(referrals: ReferralCascade) -> Self {
        Self { referrals }
    }

    /// Referral cascade used on completion
    pub fn referrals(&self) -> &ReferralCascade {
        &self.referrals
    }

    /// Settle a transaction inside the caller's unit of work
    pub fn settle_in(
        &self,
        uow: &mut UnitOfWork<'_>,
        transaction_id: Uuid,
        target: SettlementTarget,
        settled_by: &str,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome> {
        let mut transaction = load_in(uow, transaction_id)?;
        if transaction.status != TransactionStatus::Pending {
            return Err(Error::AlreadySettled(transaction_id));
        }

        let previous = transaction.status;
        transaction.status = target.into();
        transaction.settled_by = Some(settled_by.to_string());
        transaction.updated_at = now;
        store_transition_in(uow, &transaction, previous)?;

        let (payout, bonus) = match target {
            SettlementTarget::Rejected => (None, None),
            SettlementTarget::Completed => {
                let amount = transaction.payout().ok_or_else(|| {
                    ledger_core::Error::InvalidAmount(format!(
                        "Payout {} × {} overflows",
                        transaction.amount, transaction.rate
                    ))
                })?;

                let movement = post_movement(
                    uow,
                    transaction.user_id,
                    amount,
                    MovementKind::Credit,
                    Reference::sale(transaction.id),
                    now,
                )?;

                let seller = accounts::get_user_in(uow, transaction.user_id)?;
                let bonus = match seller.referred_by {
                    Some(referrer_id) => self.referrals.award_in(
                        uow,
                        referrer_id,
                        seller.id,
                        amount,
                        transaction.id,
                        now,
                    )?,
                    None => None,
                };

                (Some(movement), bonus)
            }
        };

        tracing::debug!(
            transaction_id = %transaction.id,
            status = %transaction.status,
            credited = payout.is_some(),
            bonus = bonus.is_some(),
            "Settlement staged"
        );

        Ok(SettlementOutcome {
            transaction,
            payout,
            bonus,
        })
    }
}
