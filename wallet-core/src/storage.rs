//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `users` - User rows (key: user_id)
//! - `emails` - Email uniqueness index (key: lowercased email, value: user_id)
//! - `wallets` - Wallet rows (key: wallet_id)
//! - `owners` - Owner index (key: user_id, value: wallet_id)
//! - `transactions` - Append-only ledger entries (key: transaction_id)
//! - `tx_index` - Per-wallet index (key: wallet_id || transaction_id)
//!
//! Writes are staged into a [`UnitOfWork`] and become visible only when
//! [`Storage::commit`] writes the whole batch atomically. Dropping an
//! uncommitted unit of work discards every staged write.

use crate::{
    error::{Error, Result},
    types::{TransactionRecord, User, UserId, Wallet, WalletId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_USERS: &str = "users";
const CF_EMAILS: &str = "emails";
const CF_WALLETS: &str = "wallets";
const CF_OWNERS: &str = "owners";
const CF_TRANSACTIONS: &str = "transactions";
const CF_TX_INDEX: &str = "tx_index";

/// A bounded set of staged writes that commit or roll back as one
///
/// Obtained from [`Storage::begin`]; rollback is simply dropping the value
/// without committing.
pub struct UnitOfWork {
    batch: WriteBatch,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_EMAILS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_OWNERS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_TX_INDEX, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened wallet store");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are frequently re-read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Unit of work

    /// Start a new unit of work
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork {
            batch: WriteBatch::default(),
        }
    }

    /// Atomically commit every staged write
    pub fn commit(&self, uow: UnitOfWork) -> Result<()> {
        let writes = uow.batch.len();
        self.db.write(uow.batch)?;

        tracing::debug!(writes, "Unit of work committed");

        Ok(())
    }

    // User operations

    /// Look up a user ID by email (uniqueness index)
    pub fn user_id_by_email(&self, email: &str) -> Result<Option<UserId>> {
        let cf = self.cf_handle(CF_EMAILS)?;
        let key = email.to_lowercase().into_bytes();

        match self.db.get_cf(cf, key)? {
            Some(value) => {
                let id = Uuid::from_slice(&value)
                    .map_err(|_| Error::Storage("Corrupt email index entry".to_string()))?;
                Ok(Some(UserId::from_uuid(id)))
            }
            None => Ok(None),
        }
    }

    /// Get a user row by ID
    pub fn user(&self, id: UserId) -> Result<Option<User>> {
        let cf = self.cf_handle(CF_USERS)?;

        match self.db.get_cf(cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Stage a user row plus its email index entry
    pub fn stage_user(&self, uow: &mut UnitOfWork, user: &User) -> Result<()> {
        let cf_users = self.cf_handle(CF_USERS)?;
        let cf_emails = self.cf_handle(CF_EMAILS)?;

        let value = bincode::serialize(user)?;
        uow.batch.put_cf(cf_users, user.id.as_bytes(), &value);
        uow.batch.put_cf(
            cf_emails,
            user.email.to_lowercase().into_bytes(),
            user.id.as_bytes(),
        );

        Ok(())
    }

    // Wallet operations

    /// Resolve the wallet ID for an owner
    pub fn wallet_id_for_owner(&self, owner: UserId) -> Result<WalletId> {
        let cf = self.cf_handle(CF_OWNERS)?;

        let value = self
            .db
            .get_cf(cf, owner.as_bytes())?
            .ok_or_else(|| Error::WalletNotFound(owner.to_string()))?;

        let id = Uuid::from_slice(&value)
            .map_err(|_| Error::Storage("Corrupt owner index entry".to_string()))?;
        Ok(WalletId::from_uuid(id))
    }

    /// Get a wallet row by ID
    pub fn wallet(&self, id: WalletId) -> Result<Wallet> {
        let cf = self.cf_handle(CF_WALLETS)?;

        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| Error::WalletNotFound(id.to_string()))?;

        let wallet: Wallet = bincode::deserialize(&value)?;
        Ok(wallet)
    }

    /// Get a wallet row by owner
    pub fn wallet_by_owner(&self, owner: UserId) -> Result<Wallet> {
        let id = self.wallet_id_for_owner(owner)?;
        self.wallet(id)
    }

    /// Stage a new wallet row plus its owner index entry
    pub fn stage_wallet_create(&self, uow: &mut UnitOfWork, wallet: &Wallet) -> Result<()> {
        let cf_wallets = self.cf_handle(CF_WALLETS)?;
        let cf_owners = self.cf_handle(CF_OWNERS)?;

        let value = bincode::serialize(wallet)?;
        uow.batch.put_cf(cf_wallets, wallet.id.as_bytes(), &value);
        uow.batch
            .put_cf(cf_owners, wallet.owner.as_bytes(), wallet.id.as_bytes());

        Ok(())
    }

    /// Stage an updated wallet row
    ///
    /// The caller has already validated `balance_minor >= 0` and holds the
    /// wallet's exclusive lock.
    pub fn stage_wallet_update(&self, uow: &mut UnitOfWork, wallet: &Wallet) -> Result<()> {
        let cf = self.cf_handle(CF_WALLETS)?;

        let value = bincode::serialize(wallet)?;
        uow.batch.put_cf(cf, wallet.id.as_bytes(), &value);

        tracing::debug!(
            wallet = %wallet.id,
            balance_minor = wallet.balance_minor,
            "Balance update staged"
        );

        Ok(())
    }

    // Transaction log operations

    /// Stage one immutable ledger entry plus its per-wallet index entry
    ///
    /// The log is write-once: no update or delete exists.
    pub fn stage_transaction(&self, uow: &mut UnitOfWork, record: &TransactionRecord) -> Result<()> {
        let cf_tx = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_index = self.cf_handle(CF_TX_INDEX)?;

        let value = bincode::serialize(record)?;
        uow.batch.put_cf(cf_tx, record.id.as_bytes(), &value);

        let index_key = Self::index_key_wallet_tx(record.wallet_id, record.id);
        uow.batch.put_cf(cf_index, &index_key, &[]);

        tracing::debug!(
            transaction = %record.id,
            wallet = %record.wallet_id,
            kind = %record.kind,
            amount_minor = record.amount_minor,
            "Ledger entry staged"
        );

        Ok(())
    }

    /// List a wallet's ledger entries, newest first
    pub fn transactions_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<TransactionRecord>> {
        let cf_index = self.cf_handle(CF_TX_INDEX)?;
        let prefix = wallet_id.as_bytes().as_slice();

        let iter = self
            .db
            .iterator_cf(cf_index, IteratorMode::From(prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, _) = item?;

            if !key.starts_with(prefix) {
                break;
            }
            if key.len() < 32 {
                continue;
            }

            let tx_id = Uuid::from_slice(&key[16..32])
                .map_err(|_| Error::Storage("Corrupt transaction index entry".to_string()))?;
            records.push(self.transaction(tx_id)?);
        }

        // Newest first; v7 ids break ties within one timestamp
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    fn transaction(&self, id: Uuid) -> Result<TransactionRecord> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(cf, id.as_bytes())?
            .ok_or_else(|| Error::Storage(format!("Transaction {} missing for index entry", id)))?;

        let record: TransactionRecord = bincode::deserialize(&value)?;
        Ok(record)
    }

    fn index_key_wallet_tx(wallet_id: WalletId, tx_id: Uuid) -> Vec<u8> {
        let mut key = wallet_id.as_bytes().to_vec();
        key.extend_from_slice(tx_id.as_bytes());
        key
    }
}
