//! Metrics collection for observability
//!
//! Prometheus metrics on a private registry, one per [`Metrics`] instance.
//!
//! # Metrics
//!
//! - `exchange_transactions_created_total{kind}` - Sell requests accepted
//! - `exchange_settlements_total{outcome}` - Settlement attempts by outcome
//! - `exchange_ledger_movements_total{kind}` - Movements committed by this service
//! - `exchange_referral_bonuses_total` - Referral bonuses paid
//! - `exchange_withdrawals_total{status}` - Withdrawal transitions
//! - `exchange_settlement_duration_seconds` - Settlement latency, queueing included

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Sell requests accepted, by kind
    pub transactions_created: IntCounterVec,

    /// Settlement attempts, by outcome
    pub settlements: IntCounterVec,

    /// Movements committed, by kind
    pub movements: IntCounterVec,

    /// Referral bonuses paid
    pub referral_bonuses: IntCounter,

    /// Withdrawal transitions, by status
    pub withdrawals: IntCounterVec,

    /// Settlement duration histogram
    pub settlement_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("referral_bonuses", &self.referral_bonuses.get())
            .field("settlements_observed", &self.settlement_duration.get_sample_count())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_created = IntCounterVec::new(
            Opts::new("exchange_transactions_created_total", "Sell requests accepted"),
            &["kind"],
        )?;
        registry.register(Box::new(transactions_created.clone()))?;

        let settlements = IntCounterVec::new(
            Opts::new("exchange_settlements_total", "Settlement attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(settlements.clone()))?;

        let movements = IntCounterVec::new(
            Opts::new("exchange_ledger_movements_total", "Ledger movements committed"),
            &["kind"],
        )?;
        registry.register(Box::new(movements.clone()))?;

        let referral_bonuses = IntCounter::new(
            "exchange_referral_bonuses_total",
            "Referral bonuses paid",
        )?;
        registry.register(Box::new(referral_bonuses.clone()))?;

        let withdrawals = IntCounterVec::new(
            Opts::new("exchange_withdrawals_total", "Withdrawal transitions by status"),
            &["status"],
        )?;
        registry.register(Box::new(withdrawals.clone()))?;

        let settlement_duration = Histogram::with_opts(
            HistogramOpts::new(
                "exchange_settlement_duration_seconds",
                "Histogram of settlement latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(settlement_duration.clone()))?;

        Ok(Self {
            transactions_created,
            settlements,
            movements,
            referral_bonuses,
            withdrawals,
            settlement_duration,
            registry,
        })
    }

    /// Record accepted sell request
    pub fn record_transaction_created(&self, kind: &str) {
        self.transactions_created.with_label_values(&[kind]).inc();
    }

    /// Record settlement attempt
    pub fn record_settlement(&self, outcome: &str, duration_seconds: f64) {
        self.settlements.with_label_values(&[outcome]).inc();
        self.settlement_duration.observe(duration_seconds);
    }

    /// Record committed movement
    pub fn record_movement(&self, kind: &str) {
        self.movements.with_label_values(&[kind]).inc();
    }

    /// Record paid referral bonus
    pub fn record_referral_bonus(&self) {
        self.referral_bonuses.inc();
    }

    /// Record withdrawal transition
    pub fn record_withdrawal(&self, status: &str) {
        self.withdrawals.with_label_values(&[status]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
