//! Rate catalog: tradable assets, their rates and amount bounds
//!
//! The catalog is held in memory and seeded from an optional TOML file.
//! Administrators change rates and flags at runtime; sell requests read the
//! current values once, at creation, and freeze the rate into the transaction.
//!
//! A gift card's effective rate for a subcategory is the base rate plus the
//! subcategory adjustment. Adjustments may be negative, but every write is
//! rejected if it would leave any effective rate at or below zero.

use crate::{
    error::{Error, Result, ValidationError},
    types::{AssetDefinition, AssetKind, AssetRef},
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Crypto asset definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoAsset {
    /// Catalog ID
    pub id: u32,
    /// Display name
    pub name: String,
    /// Ticker symbol, used as deposit address prefix
    pub symbol: String,
    /// Credit per coin
    pub rate: Decimal,
    /// Smallest sellable amount
    pub min_amount: Decimal,
    /// Largest sellable amount, zero means unbounded
    #[serde(default)]
    pub max_amount: Decimal,
    /// Listed for new sales
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Gift card definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCard {
    /// Catalog ID
    pub id: u32,
    /// Display name
    pub name: String,
    /// Grouping shown to users
    #[serde(default)]
    pub category: String,
    /// Credit per card unit
    pub rate: Decimal,
    /// Smallest sellable amount
    pub min_amount: Decimal,
    /// Largest sellable amount, zero means unbounded
    #[serde(default)]
    pub max_amount: Decimal,
    /// Listed for new sales
    #[serde(default = "default_active")]
    pub active: bool,
    /// Variants with their own rate adjustment
    #[serde(default)]
    pub subcategories: Vec<GiftCardSubcategory>,
}

/// Gift card variant (region, card type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCardSubcategory {
    /// ID, unique within the card
    pub id: u32,
    /// Display name
    pub name: String,
    /// Added to the card's base rate
    #[serde(default)]
    pub rate_adjustment: Decimal,
}

fn default_active() -> bool {
    true
}

/// Seed file layout
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CatalogFile {
    crypto: Vec<CryptoAsset>,
    gift_cards: Vec<GiftCard>,
}

/// In-memory asset catalog
#[derive(Debug, Default)]
pub struct RateCatalog {
    crypto: RwLock<BTreeMap<u32, CryptoAsset>>,
    gift_cards: RwLock<BTreeMap<u32, GiftCard>>,
}

impl RateCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a TOML seed file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_toml(&content)?;

        tracing::info!(
            path = ?path.as_ref(),
            crypto = catalog.crypto.read().len(),
            gift_cards = catalog.gift_cards.read().len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse a catalog from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse catalog: {}", e)))?;

        let catalog = Self::new();
        for asset in file.crypto {
            catalog.upsert_crypto(asset)?;
        }
        for card in file.gift_cards {
            catalog.upsert_gift_card(card)?;
        }
        Ok(catalog)
    }

    // Lookups

    /// Resolve an asset reference, inactive entries included.
    ///
    /// Missing crypto assets and gift cards fail with [`Error::AssetNotFound`];
    /// a missing subcategory on an existing card is a validation failure.
    pub fn get_asset(&self, asset: &AssetRef) -> Result<AssetDefinition> {
        match *asset {
            AssetRef::Crypto { asset_id } => {
                let crypto = self.crypto.read();
                let entry = crypto.get(&asset_id).ok_or(Error::AssetNotFound(*asset))?;
                Ok(AssetDefinition {
                    asset: *asset,
                    name: entry.name.clone(),
                    symbol: Some(entry.symbol.clone()),
                    rate: entry.rate,
                    min_amount: entry.min_amount,
                    max_amount: entry.max_amount,
                    active: entry.active,
                })
            }
            AssetRef::GiftCard {
                card_id,
                subcategory_id,
            } => {
                let cards = self.gift_cards.read();
                let card = cards.get(&card_id).ok_or(Error::AssetNotFound(*asset))?;

                let (name, adjustment) = match subcategory_id {
                    Some(sub_id) => {
                        let sub = card
                            .subcategories
                            .iter()
                            .find(|s| s.id == sub_id)
                            .ok_or(ValidationError::UnknownSubcategory {
                                card_id,
                                subcategory_id: sub_id,
                            })?;
                        (format!("{} ({})", card.name, sub.name), sub.rate_adjustment)
                    }
                    None => (card.name.clone(), Decimal::ZERO),
                };

                Ok(AssetDefinition {
                    asset: *asset,
                    name,
                    symbol: None,
                    rate: effective_rate(card.rate, adjustment)?,
                    min_amount: card.min_amount,
                    max_amount: card.max_amount,
                    active: card.active,
                })
            }
        }
    }

    /// Check an amount against the asset bounds
    pub fn validate_amount(
        &self,
        asset: &AssetDefinition,
        amount: Decimal,
    ) -> std::result::Result<(), ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        if amount < asset.min_amount {
            return Err(ValidationError::BelowMinimum {
                amount,
                min: asset.min_amount,
            });
        }
        if asset.max_amount > Decimal::ZERO && amount > asset.max_amount {
            return Err(ValidationError::AboveMaximum {
                amount,
                max: asset.max_amount,
            });
        }
        Ok(())
    }

    /// Crypto asset by ID
    pub fn crypto(&self, asset_id: u32) -> Option<CryptoAsset> {
        self.crypto.read().get(&asset_id).cloned()
    }

    /// Gift card by ID
    pub fn gift_card(&self, card_id: u32) -> Option<GiftCard> {
        self.gift_cards.read().get(&card_id).cloned()
    }

    /// Active crypto assets, sorted by name
    pub fn list_tradable_crypto(&self) -> Vec<CryptoAsset> {
        let mut assets: Vec<_> = self
            .crypto
            .read()
            .values()
            .filter(|a| a.active)
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        assets
    }

    /// Active gift cards, sorted by category then name
    pub fn list_tradable_gift_cards(&self) -> Vec<GiftCard> {
        let mut cards: Vec<_> = self
            .gift_cards
            .read()
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        cards.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        cards
    }

    /// Every active asset at its base rate, sorted by name
    pub fn list_tradable(&self) -> Vec<AssetDefinition> {
        let mut listed = Vec::new();
        for asset in self.crypto.read().values().filter(|a| a.active) {
            listed.push(AssetDefinition {
                asset: AssetRef::Crypto { asset_id: asset.id },
                name: asset.name.clone(),
                symbol: Some(asset.symbol.clone()),
                rate: asset.rate,
                min_amount: asset.min_amount,
                max_amount: asset.max_amount,
                active: true,
            });
        }
        for card in self.gift_cards.read().values().filter(|c| c.active) {
            listed.push(AssetDefinition {
                asset: AssetRef::GiftCard {
                    card_id: card.id,
                    subcategory_id: None,
                },
                name: card.name.clone(),
                symbol: None,
                rate: card.rate,
                min_amount: card.min_amount,
                max_amount: card.max_amount,
                active: true,
            });
        }
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        listed
    }

    // Administration

    /// Add or replace a crypto asset
    pub fn upsert_crypto(&self, asset: CryptoAsset) -> Result<()> {
        if asset.symbol.trim().is_empty() || !asset.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidDefinition(format!(
                "crypto asset {} needs an alphanumeric symbol",
                asset.id
            ))
            .into());
        }
        check_bounds(asset.rate, asset.min_amount, asset.max_amount)?;

        tracing::info!(
            asset_id = asset.id,
            symbol = %asset.symbol,
            rate = %asset.rate,
            "Crypto asset saved"
        );
        self.crypto.write().insert(asset.id, asset);
        Ok(())
    }

    /// Add or replace a gift card with its subcategories
    pub fn upsert_gift_card(&self, card: GiftCard) -> Result<()> {
        check_bounds(card.rate, card.min_amount, card.max_amount)?;
        check_adjustments(card.rate, &card.subcategories)?;

        let mut seen = std::collections::BTreeSet::new();
        if let Some(dup) = card.subcategories.iter().find(|s| !seen.insert(s.id)) {
            return Err(ValidationError::InvalidDefinition(format!(
                "gift card {} repeats subcategory {}",
                card.id, dup.id
            ))
            .into());
        }

        tracing::info!(
            card_id = card.id,
            name = %card.name,
            rate = %card.rate,
            subcategories = card.subcategories.len(),
            "Gift card saved"
        );
        self.gift_cards.write().insert(card.id, card);
        Ok(())
    }

    /// Change a base rate. Existing transactions keep their frozen rate.
    pub fn set_rate(&self, kind: AssetKind, id: u32, rate: Decimal) -> Result<()> {
        match kind {
            AssetKind::Crypto => {
                let mut crypto = self.crypto.write();
                let asset = crypto
                    .get_mut(&id)
                    .ok_or(Error::AssetNotFound(AssetRef::Crypto { asset_id: id }))?;
                if rate <= Decimal::ZERO {
                    return Err(ValidationError::NonPositiveRate(rate).into());
                }
                asset.rate = rate;
            }
            AssetKind::GiftCard => {
                let mut cards = self.gift_cards.write();
                let card = cards.get_mut(&id).ok_or(Error::AssetNotFound(AssetRef::GiftCard {
                    card_id: id,
                    subcategory_id: None,
                }))?;
                if rate <= Decimal::ZERO {
                    return Err(ValidationError::NonPositiveRate(rate).into());
                }
                check_adjustments(rate, &card.subcategories)?;
                card.rate = rate;
            }
        }

        tracing::info!(kind = %kind, id, rate = %rate, "Rate updated");
        Ok(())
    }

    /// Change one subcategory's rate adjustment
    pub fn set_subcategory_adjustment(
        &self,
        card_id: u32,
        subcategory_id: u32,
        adjustment: Decimal,
    ) -> Result<()> {
        let mut cards = self.gift_cards.write();
        let card = cards.get_mut(&card_id).ok_or(Error::AssetNotFound(AssetRef::GiftCard {
            card_id,
            subcategory_id: Some(subcategory_id),
        }))?;

        let effective = effective_rate(card.rate, adjustment)?;
        if effective <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveRate(effective).into());
        }

        let sub = card
            .subcategories
            .iter_mut()
            .find(|s| s.id == subcategory_id)
            .ok_or(ValidationError::UnknownSubcategory {
                card_id,
                subcategory_id,
            })?;
        sub.rate_adjustment = adjustment;

        tracing::info!(card_id, subcategory_id, adjustment = %adjustment, "Rate adjustment updated");
        Ok(())
    }

    /// List or delist an asset. Delisted assets stay resolvable by ID.
    pub fn set_active(&self, kind: AssetKind, id: u32, active: bool) -> Result<()> {
        let found = match kind {
            AssetKind::Crypto => self.crypto.write().get_mut(&id).map(|a| a.active = active),
            AssetKind::GiftCard => self.gift_cards.write().get_mut(&id).map(|c| c.active = active),
        };
        if found.is_none() {
            let asset = match kind {
                AssetKind::Crypto => AssetRef::Crypto { asset_id: id },
                AssetKind::GiftCard => AssetRef::GiftCard {
                    card_id: id,
                    subcategory_id: None,
                },
            };
            return Err(Error::AssetNotFound(asset));
        }

        tracing::info!(kind = %kind, id, active, "Asset status updated");
        Ok(())
    }
}

fn check_bounds(rate: Decimal, min: Decimal, max: Decimal) -> Result<()> {
    if rate <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveRate(rate).into());
    }
    if min < Decimal::ZERO || max < Decimal::ZERO {
        return Err(ValidationError::InvalidDefinition(format!(
            "amount bounds must not be negative (min {}, max {})",
            min, max
        ))
        .into());
    }
    if max > Decimal::ZERO && max < min {
        return Err(ValidationError::InvalidDefinition(format!(
            "max_amount {} is below min_amount {}",
            max, min
        ))
        .into());
    }
    Ok(())
}

fn effective_rate(base: Decimal, adjustment: Decimal) -> Result<Decimal> {
    base.checked_add(adjustment).ok_or_else(|| {
        ValidationError::InvalidDefinition(format!(
            "rate {} with adjustment {} overflows",
            base, adjustment
        ))
        .into()
    })
}

fn check_adjustments(base: Decimal, subcategories: &[GiftCardSubcategory]) -> Result<()> {
    for sub in subcategories {
        let effective = effective_rate(base, sub.rate_adjustment)?;
        if effective <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveRate(effective).into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> CryptoAsset {
        CryptoAsset {
            id: 1,
            name: "Bitcoin".to_string(),
            symbol: "BTC".to_string(),
            rate: Decimal::from(60000),
            min_amount: Decimal::new(1, 3),
            max_amount: Decimal::ONE,
            active: true,
        }
    }

    fn amazon() -> GiftCard {
        GiftCard {
            id: 10,
            name: "Amazon".to_string(),
            category: "Retail".to_string(),
            rate: Decimal::new(75, 2),
            min_amount: Decimal::from(25),
            max_amount: Decimal::ZERO,
            active: true,
            subcategories: vec![
                GiftCardSubcategory {
                    id: 1,
                    name: "USA".to_string(),
                    rate_adjustment: Decimal::new(5, 2),
                },
                GiftCardSubcategory {
                    id: 2,
                    name: "UK".to_string(),
                    rate_adjustment: Decimal::new(-10, 2),
                },
            ],
        }
    }

    #[test]
    fn test_amount_bounds() {
        let catalog = RateCatalog::new();
        catalog.upsert_crypto(btc()).unwrap();
        let def = catalog.get_asset(&AssetRef::Crypto { asset_id: 1 }).unwrap();

        assert!(catalog.validate_amount(&def, Decimal::new(5, 1)).is_ok());
        assert!(catalog.validate_amount(&def, Decimal::new(1, 3)).is_ok());
        assert!(catalog.validate_amount(&def, Decimal::ONE).is_ok());
        assert!(matches!(
            catalog.validate_amount(&def, Decimal::new(1, 4)),
            Err(ValidationError::BelowMinimum { .. })
        ));
        assert!(matches!(
            catalog.validate_amount(&def, Decimal::new(11, 1)),
            Err(ValidationError::AboveMaximum { .. })
        ));
        assert!(matches!(
            catalog.validate_amount(&def, Decimal::ZERO),
            Err(ValidationError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn test_zero_max_is_unbounded() {
        let catalog = RateCatalog::new();
        catalog.upsert_gift_card(amazon()).unwrap();
        let def = catalog
            .get_asset(&AssetRef::GiftCard {
                card_id: 10,
                subcategory_id: None,
            })
            .unwrap();
        assert!(catalog.validate_amount(&def, Decimal::from(1_000_000)).is_ok());
    }

    #[test]
    fn test_subcategory_effective_rate() {
        let catalog = RateCatalog::new();
        catalog.upsert_gift_card(amazon()).unwrap();

        let usa = catalog
            .get_asset(&AssetRef::GiftCard {
                card_id: 10,
                subcategory_id: Some(1),
            })
            .unwrap();
        assert_eq!(usa.rate, Decimal::new(80, 2));
        assert_eq!(usa.name, "Amazon (USA)");

        let uk = catalog
            .get_asset(&AssetRef::GiftCard {
                card_id: 10,
                subcategory_id: Some(2),
            })
            .unwrap();
        assert_eq!(uk.rate, Decimal::new(65, 2));

        let missing = catalog.get_asset(&AssetRef::GiftCard {
            card_id: 10,
            subcategory_id: Some(9),
        });
        assert!(matches!(
            missing,
            Err(Error::Validation(ValidationError::UnknownSubcategory { .. }))
        ));
    }

    #[test]
    fn test_adjustment_cannot_zero_the_rate() {
        let catalog = RateCatalog::new();

        let mut card = amazon();
        card.subcategories[1].rate_adjustment = Decimal::new(-75, 2);
        assert!(matches!(
            catalog.upsert_gift_card(card),
            Err(Error::Validation(ValidationError::NonPositiveRate(_)))
        ));

        catalog.upsert_gift_card(amazon()).unwrap();
        // UK adjustment is -0.10, so the base cannot drop to 0.10
        assert!(catalog
            .set_rate(AssetKind::GiftCard, 10, Decimal::new(10, 2))
            .is_err());
        assert!(catalog
            .set_subcategory_adjustment(10, 1, Decimal::from(-1))
            .is_err());
        catalog
            .set_subcategory_adjustment(10, 1, Decimal::new(-50, 2))
            .unwrap();
        assert_eq!(
            catalog
                .get_asset(&AssetRef::GiftCard {
                    card_id: 10,
                    subcategory_id: Some(1)
                })
                .unwrap()
                .rate,
            Decimal::new(25, 2)
        );
    }

    #[test]
    fn test_inactive_assets_resolve_but_are_not_listed() {
        let catalog = RateCatalog::new();
        catalog.upsert_crypto(btc()).unwrap();
        let mut eth = btc();
        eth.id = 2;
        eth.name = "Ethereum".to_string();
        eth.symbol = "ETH".to_string();
        catalog.upsert_crypto(eth).unwrap();
        catalog.upsert_gift_card(amazon()).unwrap();

        catalog.set_active(AssetKind::Crypto, 1, false).unwrap();

        let listed: Vec<_> = catalog.list_tradable().into_iter().map(|a| a.name).collect();
        assert_eq!(listed, vec!["Amazon".to_string(), "Ethereum".to_string()]);
        assert_eq!(catalog.list_tradable_crypto().len(), 1);

        let btc = catalog.get_asset(&AssetRef::Crypto { asset_id: 1 }).unwrap();
        assert!(!btc.active);

        assert!(matches!(
            catalog.set_active(AssetKind::Crypto, 99, true),
            Err(Error::AssetNotFound(_))
        ));
    }

    #[test]
    fn test_from_toml() {
        let catalog = RateCatalog::from_toml(
            r#"
            [[crypto]]
            id = 1
            name = "Bitcoin"
            symbol = "BTC"
            rate = "60000"
            min_amount = "0.001"
            max_amount = "1"

            [[gift_cards]]
            id = 10
            name = "Steam"
            category = "Gaming"
            rate = "0.8"
            min_amount = "10"

            [[gift_cards.subcategories]]
            id = 1
            name = "EU"
            rate_adjustment = "-0.05"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.crypto(1).unwrap().rate, Decimal::from(60000));
        let steam = catalog.gift_card(10).unwrap();
        assert!(steam.active);
        assert_eq!(steam.max_amount, Decimal::ZERO);
        assert_eq!(steam.subcategories[0].rate_adjustment, Decimal::new(-5, 2));
    }

    #[test]
    fn test_rejects_malformed_definitions() {
        let catalog = RateCatalog::new();

        let mut asset = btc();
        asset.max_amount = Decimal::new(1, 4);
        assert!(catalog.upsert_crypto(asset).is_err());

        let mut asset = btc();
        asset.symbol = "B T C".to_string();
        assert!(catalog.upsert_crypto(asset).is_err());

        let mut card = amazon();
        card.subcategories[1].id = 1;
        assert!(catalog.upsert_gift_card(card).is_err());
    }

    #[test]
    fn test_adjustment_overflow_is_rejected() {
        let catalog = RateCatalog::new();
        catalog.upsert_gift_card(amazon()).unwrap();
        catalog.set_rate(AssetKind::GiftCard, 10, Decimal::from(2)).unwrap();

        assert!(matches!(
            catalog.set_subcategory_adjustment(10, 1, Decimal::MAX),
            Err(Error::Validation(ValidationError::InvalidDefinition(_)))
        ));

        catalog.set_subcategory_adjustment(10, 1, Decimal::ONE).unwrap();
        assert!(matches!(
            catalog.set_rate(AssetKind::GiftCard, 10, Decimal::MAX),
            Err(Error::Validation(ValidationError::InvalidDefinition(_)))
        ));

        let usa = catalog
            .get_asset(&AssetRef::GiftCard {
                card_id: 10,
                subcategory_id: Some(1),
            })
            .unwrap();
        assert_eq!(usa.rate, Decimal::from(3));

        let mut card = amazon();
        card.rate = Decimal::from(60000);
        card.subcategories[0].rate_adjustment = Decimal::MAX;
        assert!(matches!(
            catalog.upsert_gift_card(card),
            Err(Error::Validation(ValidationError::InvalidDefinition(_)))
        ));

        let seed = r#"
            [[gift_cards]]
            id = 20
            name = "Steam"
            rate = "60000"
            min_amount = "10"

            [[gift_cards.subcategories]]
            id = 1
            name = "EU"
            rate_adjustment = "79228162514264337593543950335"
        "#;
        assert!(RateCatalog::from_toml(seed).is_err());
    }
}
