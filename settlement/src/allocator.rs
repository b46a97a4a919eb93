//! Deposit address allocation
//!
//! One address per (user, crypto asset) pair, generated on first request and
//! returned unchanged afterwards. Allocation runs inside a unit of work on the
//! ledger writer, so concurrent first requests for the same pair observe each
//! other: the second finds the first's address and returns it.
//!
//! Addresses are stand-ins (`<symbol>1<40 hex chars>`); nothing here talks
//! to a chain.

use crate::{
    catalog::RateCatalog,
    error::{Error, Result},
    types::AssetRef,
};
use ledger_core::{accounts, cf, LedgerHandle, Storage, UnitOfWork, UserId};
use rand::Rng;
use std::sync::Arc;

/// Key prefix: user_id || asset_id -> address
const PAIR_PREFIX: u8 = b'p';
/// Key prefix: address -> (user_id, asset_id)
const ADDRESS_PREFIX: u8 = b'a';

const MAX_ALLOCATION_ATTEMPTS: usize = 8;

fn pair_key(user_id: UserId, asset_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PAIR_PREFIX);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&asset_id.to_be_bytes());
    key
}

fn address_key(address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + address.len());
    key.push(ADDRESS_PREFIX);
    key.extend_from_slice(address.as_bytes());
    key
}

/// Generate a fresh address for a ticker symbol
pub fn generate_address(symbol: &str) -> String {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    format!("{}1{}", symbol.to_ascii_lowercase(), hex::encode(bytes))
}

/// Return the pair's address, allocating one inside the unit if needed
pub fn allocate_in(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    asset_id: u32,
    symbol: &str,
) -> Result<String> {
    let key = pair_key(user_id, asset_id);
    if let Some(existing) = uow.get::<String>(cf::ADDRESSES, &key)? {
        return Ok(existing);
    }

    accounts::get_user_in(uow, user_id)?;

    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let address = generate_address(symbol);
        let reverse = address_key(&address);
        if uow.contains(cf::ADDRESSES, &reverse)? {
            tracing::warn!(address = %address, "Generated address collides, retrying");
            continue;
        }

        uow.put(cf::ADDRESSES, &key, &address)?;
        uow.put(cf::ADDRESSES, &reverse, &(user_id, asset_id))?;

        tracing::debug!(
            user_id = %user_id,
            asset_id,
            address = %address,
            "Deposit address staged"
        );
        return Ok(address);
    }

    Err(ledger_core::Error::InvariantViolation(format!(
        "No unique address for {} after {} attempts",
        symbol, MAX_ALLOCATION_ATTEMPTS
    ))
    .into())
}

/// Issues and memoizes deposit addresses
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    handle: LedgerHandle,
    storage: Arc<Storage>,
    catalog: Arc<RateCatalog>,
}

impl AddressAllocator {
    /// Create allocator
    pub fn new(handle: LedgerHandle, storage: Arc<Storage>, catalog: Arc<RateCatalog>) -> Self {
        Self {
            handle,
            storage,
            catalog,
        }
    }

    /// Address for (user, asset), allocated and persisted on first call
    pub async fn allocate(&self, user_id: UserId, asset_id: u32) -> Result<String> {
        // Committed already: answer without queueing on the writer
        if let Some(address) = self.address_for(user_id, asset_id)? {
            return Ok(address);
        }

        let symbol = self
            .catalog
            .crypto(asset_id)
            .ok_or(Error::AssetNotFound(AssetRef::Crypto { asset_id }))?
            .symbol;

        let address = self
            .handle
            .transact(move |uow| allocate_in(uow, user_id, asset_id, &symbol))
            .await?;

        tracing::info!(user_id = %user_id, asset_id, address = %address, "Deposit address ready");
        Ok(address)
    }

    /// Previously allocated address, if any
    pub fn address_for(&self, user_id: UserId, asset_id: u32) -> Result<Option<String>> {
        Ok(self.storage.get(cf::ADDRESSES, &pair_key(user_id, asset_id))?)
    }

    /// Owner and asset of an allocated address
    pub fn owner_of(&self, address: &str) -> Result<Option<(UserId, u32)>> {
        Ok(self.storage.get(cf::ADDRESSES, &address_key(address))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_shape() {
        let address = generate_address("BTC");
        assert!(address.starts_with("btc1"));
        assert_eq!(address.len(), 4 + 40);
        assert!(address[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(address, generate_address("BTC"));
    }

    #[test]
    fn test_pair_keys_do_not_overlap_address_keys() {
        let user = UserId::generate();
        assert_eq!(pair_key(user, 1)[0], PAIR_PREFIX);
        assert_eq!(address_key("btc1ff")[0], ADDRESS_PREFIX);
        assert_ne!(pair_key(user, 1), pair_key(user, 2));
    }
}
