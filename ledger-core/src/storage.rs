//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `users` - Registered users (key: user_id)
//! - `referral_codes` - Referral code lookup (key: code, value: user_id)
//! - `wallets` - Wallet balances (key: user_id)
//! - `movements` - Append-only movement log (key: movement_id)
//! - `transactions` - Sell transactions (key: transaction_id)
//! - `addresses` - Deposit addresses (key: user_id || asset_id, plus address reverse keys)
//! - `referral_bonuses` - Paid referral bonuses (key: source transaction_id)
//! - `withdrawals` - Withdrawal requests (key: withdrawal_id)
//! - `indices` - Secondary indices, keys only (key: tag || parts)
//!
//! Writes never go through this type directly; they are staged in a
//! [`UnitOfWork`](crate::unit::UnitOfWork) and committed as a single `WriteBatch`.

use crate::{
    error::{Error, Result},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Column family names
pub mod cf {
    /// Registered users
    pub const USERS: &str = "users";
    /// Referral code -> user ID
    pub const REFERRAL_CODES: &str = "referral_codes";
    /// Wallet balances
    pub const WALLETS: &str = "wallets";
    /// Movement log
    pub const MOVEMENTS: &str = "movements";
    /// Sell transactions
    pub const TRANSACTIONS: &str = "transactions";
    /// Deposit addresses
    pub const ADDRESSES: &str = "addresses";
    /// Referral bonus records
    pub const REFERRAL_BONUSES: &str = "referral_bonuses";
    /// Withdrawal requests
    pub const WITHDRAWALS: &str = "withdrawals";
    /// Secondary indices
    pub const INDICES: &str = "indices";

    /// Every column family, in creation order
    pub const ALL: [&str; 9] = [
        USERS,
        REFERRAL_CODES,
        WALLETS,
        MOVEMENTS,
        TRANSACTIONS,
        ADDRESSES,
        REFERRAL_BONUSES,
        WITHDRAWALS,
        INDICES,
    ];
}

/// Index tags (first byte of every key in `indices`).
///
/// Tags are global; crates building on the ledger pick theirs from this list.
pub mod index {
    /// user_id || movement_id
    pub const USER_MOVEMENTS: u8 = b'm';
    /// referrer_id || user_id
    pub const REFERRALS: u8 = b'r';
    /// user_id || transaction_id
    pub const USER_TRANSACTIONS: u8 = b't';
    /// status || transaction_id
    pub const TRANSACTION_STATUS: u8 = b's';
    /// referrer_id || source transaction_id
    pub const REFERRER_BONUSES: u8 = b'b';
    /// user_id || withdrawal_id
    pub const USER_WITHDRAWALS: u8 = b'w';
}

/// Build an index key: tag followed by the concatenated parts
pub fn index_key(tag: u8, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(tag);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

/// Iteration order for index scans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Ascending key order (oldest first for UUIDv7 suffixes)
    Oldest,
    /// Descending key order (newest first)
    Newest,
}

/// A staged write: column family, key, and value (`None` deletes)
pub(crate) type StagedWrite = (&'static str, Vec<u8>, Option<Vec<u8>>);

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = cf::ALL
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = cf::ALL.len(),
            "Opened RocksDB"
        );

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options(name: &str) -> Options {
        let mut opts = Options::default();
        match name {
            // Append-only, rarely read back
            cf::MOVEMENTS => {
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            cf::INDICES => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            _ => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Reads

    /// Raw value lookup
    pub fn get_raw(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let handle = self.cf_handle(cf)?;
        Ok(self.db.get_cf(&handle, key)?)
    }

    /// Typed value lookup
    pub fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(cf, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan the `indices` family for keys starting with `prefix`.
    ///
    /// Returns the remainder of each key after the prefix.
    pub fn scan_index(&self, prefix: &[u8], order: ScanOrder) -> Result<Vec<Vec<u8>>> {
        let handle = self.cf_handle(cf::INDICES)?;
        let iter = self
            .db
            .iterator_cf(&handle, IteratorMode::From(prefix, Direction::Forward));

        let mut suffixes = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            suffixes.push(key[prefix.len()..].to_vec());
        }

        if order == ScanOrder::Newest {
            suffixes.reverse();
        }
        Ok(suffixes)
    }

    // Writes

    /// Commit staged writes atomically
    pub(crate) fn write_staged(&self, staged: Vec<StagedWrite>) -> Result<usize> {
        let mut batch = WriteBatch::default();
        let count = staged.len();

        for (cf, key, value) in staged {
            let handle = self.cf_handle(cf)?;
            match value {
                Some(value) => batch.put_cf(&handle, &key, &value),
                None => batch.delete_cf(&handle, &key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(writes = count, "Unit of work committed");
        Ok(count)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            users: self.approximate_count(cf::USERS)?,
            movements: self.approximate_count(cf::MOVEMENTS)?,
            transactions: self.approximate_count(cf::TRANSACTIONS)?,
        })
    }

    fn approximate_count(&self, cf: &str) -> Result<u64> {
        let handle = self.cf_handle(cf)?;
        let prop = self
            .db
            .property_int_value_cf(&handle, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics (approximate)
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Registered users
    pub users: u64,
    /// Movement records
    pub movements: u64,
    /// Sell transactions
    pub transactions: u64,
}
