//! Configuration for the exchange

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger store configuration
    pub ledger: ledger_core::Config,

    /// Referral commission configuration
    pub referral: ReferralConfig,

    /// Listing configuration
    pub listing: ListingConfig,

    /// Notification dispatch configuration
    pub notifications: NotificationConfig,

    /// Catalog seed file (TOML), loaded at boot
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "exchange-node".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger: ledger_core::Config::default(),
            referral: ReferralConfig::default(),
            listing: ListingConfig::default(),
            notifications: NotificationConfig::default(),
            catalog_path: None,
        }
    }
}

/// Referral commission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Percentage of each payout credited to the seller's referrer
    pub bonus_percentage: Decimal,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            bonus_percentage: Decimal::from(5),
        }
    }
}

/// Listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Upper bound on page size for transaction listings
    pub max_page_size: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self { max_page_size: 100 }
    }
}

/// Notification dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Buffered notifications before new ones are dropped
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 512,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            ledger: ledger_core::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(percentage) = std::env::var("REFERRAL_BONUS_PERCENTAGE") {
            config.referral.bonus_percentage = percentage.trim().parse().map_err(|e| {
                crate::Error::Config(format!("Invalid REFERRAL_BONUS_PERCENTAGE: {}", e))
            })?;
        }

        if let Ok(path) = std::env::var("EXCHANGE_CATALOG_PATH") {
            config.catalog_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.referral.bonus_percentage < Decimal::ZERO {
            return Err(crate::Error::Config(format!(
                "referral.bonus_percentage must not be negative, got {}",
                self.referral.bonus_percentage
            )));
        }
        if self.listing.max_page_size == 0 {
            return Err(crate::Error::Config(
                "listing.max_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
