//! Property-based tests for settlement invariants
//!
//! - Payout is amount × frozen rate
//! - Referral bonus is payout × percentage / 100, paid once
//! - Withdrawals never overdraw and refunds restore the balance

use proptest::prelude::*;
use rust_decimal::Decimal;
use settlement::{
    Config, CryptoAsset, Exchange, RateCatalog, SellRequest, SettlementTarget, TracingNotifier,
};
use std::sync::Arc;

/// Amounts inside the test asset's bounds (0.001 ..= 1)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1000).prop_map(|thousandths| Decimal::new(thousandths, 3))
}

/// Rates with up to two decimal places
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Percentages with one decimal place, 0 to 20
fn percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..=200).prop_map(|tenths| Decimal::new(tenths, 1))
}

async fn create_test_exchange(
    rate: Decimal,
    percentage: Decimal,
) -> (Exchange, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.ledger.data_dir = temp_dir.path().to_path_buf();
    config.ledger.rocksdb.sync_writes = false;
    config.referral.bonus_percentage = percentage;

    let catalog = RateCatalog::new();
    catalog
        .upsert_crypto(CryptoAsset {
            id: 1,
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            rate,
            min_amount: Decimal::new(1, 3),
            max_amount: Decimal::ONE,
            active: true,
        })
        .unwrap();

    let exchange = Exchange::with_catalog(config, Arc::new(catalog), Arc::new(TracingNotifier))
        .await
        .unwrap();
    (exchange, temp_dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: seller gets amount × rate, referrer gets the configured share
    #[test]
    fn prop_payout_and_bonus(
        amount in amount_strategy(),
        rate in rate_strategy(),
        percentage in percentage_strategy(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (exchange, _temp) = create_test_exchange(rate, percentage).await;
            let referrer = exchange.register_user(None).await.unwrap();
            let seller = exchange
                .register_user(Some(referrer.referral_code.as_str()))
                .await
                .unwrap();

            let tx = exchange
                .create_sell_transaction(seller.id, SellRequest::Crypto { asset_id: 1, amount })
                .await
                .unwrap();
            let outcome = exchange
                .settle_transaction(tx.id, SettlementTarget::Completed, "admin")
                .await
                .unwrap();

            let payout = amount * rate;
            let bonus = payout * percentage / Decimal::ONE_HUNDRED;
            prop_assert_eq!(exchange.get_balance(seller.id).unwrap(), payout);
            prop_assert_eq!(exchange.get_balance(referrer.id).unwrap(), bonus);
            prop_assert_eq!(outcome.bonus.is_some(), bonus > Decimal::ZERO);
            prop_assert!(exchange.ledger().reconcile(referrer.id).unwrap().is_balanced());

            exchange.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: withdrawals never overdraw; cancelling refunds exactly
    #[test]
    fn prop_withdrawals_never_overdraw(
        requests in prop::collection::vec((1i64..50_000).prop_map(|c| Decimal::new(c, 2)), 1..12)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (exchange, _temp) = create_test_exchange(Decimal::from(1000), Decimal::ZERO).await;
            let user = exchange.register_user(None).await.unwrap();

            let tx = exchange
                .create_sell_transaction(user.id, SellRequest::Crypto { asset_id: 1, amount: Decimal::ONE })
                .await
                .unwrap();
            exchange
                .settle_transaction(tx.id, SettlementTarget::Completed, "admin")
                .await
                .unwrap();

            let mut balance = Decimal::from(1000);
            let mut open = Vec::new();
            for amount in requests {
                match exchange.request_withdrawal(user.id, amount, "IBAN DE00 1234").await {
                    Ok(withdrawal) => {
                        balance -= amount;
                        open.push(withdrawal);
                    }
                    Err(e) => {
                        prop_assert!(e.is_insufficient_funds());
                        prop_assert!(amount > balance);
                    }
                }
                prop_assert_eq!(exchange.get_balance(user.id).unwrap(), balance);
            }

            for withdrawal in open {
                exchange.cancel_withdrawal(withdrawal.id, user.id).await.unwrap();
            }
            prop_assert_eq!(exchange.get_balance(user.id).unwrap(), Decimal::from(1000));
            prop_assert!(exchange.ledger().reconcile(user.id).unwrap().is_balanced());

            exchange.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
