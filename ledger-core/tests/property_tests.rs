//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: Σ(movement.amount) == wallet.balance
//! - Non-negativity: no sequence of debits drives a balance below zero
//! - Chaining: each movement's balance_after follows from the previous one
//! - Ordering: movement listings are newest first

use ledger_core::{Config, Error, Ledger, MovementKind, Reference};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid amounts (positive decimals)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating movement directions
fn kind_strategy() -> impl Strategy<Value = MovementKind> {
    prop_oneof![
        3 => Just(MovementKind::Credit),
        2 => Just(MovementKind::Debit),
    ]
}

/// Create test ledger with temp directory
async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.rocksdb.sync_writes = false; // No fsync in tests

    (Ledger::open(config).await.unwrap(), temp_dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: balance equals the sum of movements, and never goes negative
    #[test]
    fn prop_balance_matches_movement_log(
        ops in prop::collection::vec((kind_strategy(), amount_strategy()), 1..30)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let user = ledger.register_user(None).await.unwrap();

            let mut expected = Decimal::ZERO;
            let mut applied = 0usize;
            for (kind, amount) in ops {
                match ledger.apply_movement(user.id, amount, kind, Reference::manual()).await {
                    Ok(balance) => {
                        expected += kind.signed(amount);
                        applied += 1;
                        prop_assert_eq!(balance, expected);
                    }
                    Err(Error::InsufficientFunds { available, .. }) => {
                        prop_assert_eq!(kind, MovementKind::Debit);
                        prop_assert!(amount > expected);
                        prop_assert_eq!(available, expected);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
                prop_assert!(ledger.get_balance(user.id).unwrap() >= Decimal::ZERO);
            }

            let reconciliation = ledger.reconcile(user.id).unwrap();
            prop_assert!(reconciliation.is_balanced());
            prop_assert_eq!(reconciliation.balance, expected);
            prop_assert_eq!(reconciliation.movement_count as usize, applied);
            prop_assert_eq!(ledger.get_wallet(user.id).unwrap().movement_count as usize, applied);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Property: balance_after chains through the log, newest first
    #[test]
    fn prop_movements_chain_newest_first(
        amounts in prop::collection::vec(amount_strategy(), 1..20)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger().await;
            let user = ledger.register_user(None).await.unwrap();

            for amount in &amounts {
                ledger
                    .apply_movement(user.id, *amount, MovementKind::Credit, Reference::manual())
                    .await
                    .unwrap();
            }

            let movements = ledger.movements(user.id, usize::MAX, 0).unwrap();
            prop_assert_eq!(movements.len(), amounts.len());

            // Oldest first for the chain check
            let mut running = Decimal::ZERO;
            for (movement, amount) in movements.iter().rev().zip(&amounts) {
                prop_assert_eq!(movement.amount, *amount);
                running += movement.amount;
                prop_assert_eq!(movement.balance_after, running);
            }

            for pair in movements.windows(2) {
                prop_assert!(pair[0].movement_id > pair[1].movement_id);
            }

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_referral_chain_and_balances() {
        let (ledger, _temp) = create_test_ledger().await;

        let referrer = ledger.register_user(None).await.unwrap();
        let referred = ledger
            .register_user(Some(referrer.referral_code.clone()))
            .await
            .unwrap();

        ledger
            .apply_movement(referred.id, Decimal::from(30000), MovementKind::Credit, Reference::manual())
            .await
            .unwrap();
        ledger
            .apply_movement(referrer.id, Decimal::from(1500), MovementKind::Credit, Reference::manual())
            .await
            .unwrap();

        assert_eq!(ledger.get_balance(referred.id).unwrap(), Decimal::from(30000));
        assert_eq!(ledger.get_balance(referrer.id).unwrap(), Decimal::from(1500));
        assert_eq!(ledger.referrals_of(referrer.id).unwrap()[0].id, referred.id);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let user_id = {
            let ledger = Ledger::open(config.clone()).await.unwrap();
            let user = ledger.register_user(None).await.unwrap();
            ledger
                .apply_movement(user.id, Decimal::new(12345, 2), MovementKind::Credit, Reference::manual())
                .await
                .unwrap();
            ledger.shutdown().await.unwrap();
            user.id
        };

        // Let the writer task drop its storage handle and release the lock
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let ledger = Ledger::open(config).await.unwrap();
        assert_eq!(ledger.get_balance(user_id).unwrap(), Decimal::new(12345, 2));
        assert!(ledger.reconcile(user_id).unwrap().is_balanced());
        ledger.shutdown().await.unwrap();
    }
}
