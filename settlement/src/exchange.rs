//! Exchange facade
//!
//! Wires the ledger, catalog, allocator, transaction store and withdrawals
//! together and exposes the operations the request layer calls. Collaborators
//! (catalog, notifier) are passed in at construction.

use crate::{
    allocator::AddressAllocator,
    catalog::RateCatalog,
    config::Config,
    engine::SettlementEngine,
    metrics::Metrics,
    notify::Notifier,
    referral::ReferralCascade,
    transactions::TransactionStore,
    types::{
        ReferralBonus, SellRequest, SettlementOutcome, SettlementTarget, Transaction,
        TransactionStats, Withdrawal,
    },
    withdrawals::WithdrawalService,
    Result,
};
use ledger_core::{Ledger, LedgerMovement, User, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Ledger and settlement services behind one handle
#[derive(Debug)]
pub struct Exchange {
    ledger: Ledger,
    catalog: Arc<RateCatalog>,
    allocator: AddressAllocator,
    transactions: TransactionStore,
    withdrawals: WithdrawalService,
    metrics: Arc<Metrics>,
    config: Config,
}

impl Exchange {
    /// Open the exchange, seeding the catalog from `config.catalog_path`
    pub async fn open(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => RateCatalog::from_file(path)?,
            None => RateCatalog::new(),
        };
        Self::with_catalog(config, Arc::new(catalog), notifier).await
    }

    /// Open the exchange around an existing catalog
    pub async fn with_catalog(
        config: Config,
        catalog: Arc<RateCatalog>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let ledger = Ledger::open(config.ledger.clone()).await?;
        let handle = ledger.handle().clone();
        let storage = ledger.storage().clone();
        let metrics = Arc::new(Metrics::new()?);

        let referrals = ReferralCascade::new(storage.clone(), config.referral.bonus_percentage)?;
        let engine = SettlementEngine::new(referrals);

        let allocator = AddressAllocator::new(handle.clone(), storage.clone(), catalog.clone());
        let transactions = TransactionStore::new(
            handle.clone(),
            storage.clone(),
            catalog.clone(),
            engine,
            notifier.clone(),
            metrics.clone(),
            config.listing.max_page_size,
        );
        let withdrawals = WithdrawalService::new(handle, storage, notifier, metrics.clone());

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            bonus_percentage = %config.referral.bonus_percentage,
            tradable_assets = catalog.list_tradable().len(),
            "Exchange ready"
        );

        Ok(Self {
            ledger,
            catalog,
            allocator,
            transactions,
            withdrawals,
            metrics,
            config,
        })
    }

    // Sell transactions

    /// Validate and record a sell request; returns the pending transaction
    pub async fn create_sell_transaction(
        &self,
        user_id: UserId,
        request: SellRequest,
    ) -> Result<Transaction> {
        self.transactions.create(user_id, request).await
    }

    /// Cancel a pending transaction owned by `user_id`
    pub async fn cancel_transaction(&self, transaction_id: Uuid, user_id: UserId) -> Result<Transaction> {
        self.transactions.cancel(transaction_id, user_id).await
    }

    /// Complete or reject a pending transaction
    pub async fn settle_transaction(
        &self,
        transaction_id: Uuid,
        target: SettlementTarget,
        settled_by: &str,
    ) -> Result<SettlementOutcome> {
        self.transactions
            .settle(transaction_id, target, settled_by)
            .await
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: Uuid) -> Result<Transaction> {
        self.transactions.get(transaction_id)
    }

    /// A user's transactions, newest first
    pub fn list_user_transactions(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.transactions.list_user(user_id, limit, offset)
    }

    /// Review queue, oldest first
    pub fn list_pending_transactions(&self) -> Result<Vec<Transaction>> {
        self.transactions.list_pending()
    }

    /// Transaction statistics for one user or everyone
    pub fn transaction_stats(&self, user_id: Option<UserId>) -> Result<TransactionStats> {
        self.transactions.stats(user_id)
    }

    // Wallets and users

    /// Register a user, optionally with a referral code
    pub async fn register_user(&self, referral_code: Option<&str>) -> Result<User> {
        Ok(self
            .ledger
            .register_user(referral_code.map(str::to_string))
            .await?)
    }

    /// Current balance
    pub fn get_balance(&self, user_id: UserId) -> Result<Decimal> {
        Ok(self.ledger.get_balance(user_id)?)
    }

    /// Wallet movements, newest first
    pub fn movements(&self, user_id: UserId, limit: usize, offset: usize) -> Result<Vec<LedgerMovement>> {
        Ok(self
            .ledger
            .movements(user_id, limit.min(self.config.listing.max_page_size), offset)?)
    }

    /// Deposit address for (user, crypto asset)
    pub async fn deposit_address(&self, user_id: UserId, asset_id: u32) -> Result<String> {
        self.allocator.allocate(user_id, asset_id).await
    }

    /// Referral bonuses earned by a user, newest first
    pub fn referral_bonuses(&self, referrer_id: UserId) -> Result<Vec<ReferralBonus>> {
        self.transactions.engine().referrals().bonuses_for(referrer_id)
    }

    /// Total referral bonus earned by a user
    pub fn referral_total(&self, referrer_id: UserId) -> Result<Decimal> {
        self.transactions.engine().referrals().total_bonus(referrer_id)
    }

    // Withdrawals

    /// Debit a wallet and open a withdrawal
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        destination: &str,
    ) -> Result<Withdrawal> {
        self.withdrawals.request(user_id, amount, destination).await
    }

    /// Cancel and refund a pending withdrawal owned by `user_id`
    pub async fn cancel_withdrawal(&self, withdrawal_id: Uuid, user_id: UserId) -> Result<Withdrawal> {
        self.withdrawals.cancel(withdrawal_id, user_id).await
    }

    /// Mark a pending withdrawal as paid
    pub async fn complete_withdrawal(&self, withdrawal_id: Uuid, processed_by: &str) -> Result<Withdrawal> {
        self.withdrawals.complete(withdrawal_id, processed_by).await
    }

    /// A user's withdrawals, newest first
    pub fn list_withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.withdrawals.list_user(user_id)
    }

    // Components

    /// Ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Rate catalog, for administrative changes
    pub fn catalog(&self) -> &Arc<RateCatalog> {
        &self.catalog
    }

    /// Address allocator
    pub fn allocator(&self) -> &AddressAllocator {
        &self.allocator
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the ledger writer
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down exchange");
        Ok(self.ledger.shutdown().await?)
    }
}
