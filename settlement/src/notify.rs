//! Notification dispatch
//!
//! Notifications are sent after a unit of work commits and never influence
//! it: a notifier that cannot deliver logs and drops the message.

use crate::types::{AssetKind, TransactionStatus};
use ledger_core::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// State change worth telling a user about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Sell request accepted
    TransactionCreated {
        /// Transaction
        transaction_id: Uuid,
        /// Seller
        user_id: UserId,
        /// Asset kind
        kind: AssetKind,
    },
    /// Sell request withdrawn by the seller
    TransactionCancelled {
        /// Transaction
        transaction_id: Uuid,
        /// Seller
        user_id: UserId,
    },
    /// Sell request completed or rejected
    TransactionSettled {
        /// Transaction
        transaction_id: Uuid,
        /// Seller
        user_id: UserId,
        /// Terminal status
        status: TransactionStatus,
        /// Credit paid (completed only)
        payout: Option<Decimal>,
    },
    /// Referrer credited for a referred user's sale
    ReferralBonusPaid {
        /// Referrer
        user_id: UserId,
        /// Seller who was referred
        referred_user_id: UserId,
        /// Bonus amount
        amount: Decimal,
        /// Sale that triggered the bonus
        source_transaction_id: Uuid,
    },
    /// Withdrawal moved to a new status
    WithdrawalUpdated {
        /// Withdrawal
        withdrawal_id: Uuid,
        /// Wallet owner
        user_id: UserId,
        /// Amount
        amount: Decimal,
        /// New status
        status: crate::types::WithdrawalStatus,
    },
}

impl Notification {
    /// User the notification is addressed to
    pub fn recipient(&self) -> UserId {
        match self {
            Notification::TransactionCreated { user_id, .. }
            | Notification::TransactionCancelled { user_id, .. }
            | Notification::TransactionSettled { user_id, .. }
            | Notification::ReferralBonusPaid { user_id, .. }
            | Notification::WithdrawalUpdated { user_id, .. } => *user_id,
        }
    }
}

/// Fire-and-forget notification sink
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Deliver or drop; must not block or fail the caller
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match serde_json::to_string(&notification) {
            Ok(payload) => tracing::info!(
                recipient = %notification.recipient(),
                payload = %payload,
                "Notification"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to encode notification"),
        }
    }
}

/// Forwards notifications to a bounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    /// Create notifier and the receiving end for a delivery task
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.sender.try_send(notification) {
            let reason = match &e {
                mpsc::error::TrySendError::Full(_) => "channel full",
                mpsc::error::TrySendError::Closed(_) => "channel closed",
            };
            let dropped = e.into_inner();
            tracing::warn!(
                recipient = %dropped.recipient(),
                reason,
                "Notification dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled() -> Notification {
        Notification::TransactionCancelled {
            transaction_id: Uuid::now_v7(),
            user_id: UserId::generate(),
        }
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new(4);
        let sent = cancelled();
        notifier.notify(sent.clone());
        assert_eq!(rx.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn test_channel_notifier_drops_when_full_or_closed() {
        let (notifier, mut rx) = ChannelNotifier::new(1);
        let first = cancelled();
        notifier.notify(first.clone());
        notifier.notify(cancelled());

        assert_eq!(rx.recv().await, Some(first));
        assert!(rx.try_recv().is_err());

        drop(rx);
        notifier.notify(cancelled());
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_value(cancelled()).unwrap();
        assert_eq!(json["event"], "transaction_cancelled");
    }
}
