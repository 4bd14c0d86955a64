//! Ledger operations engine
//!
//! Orchestrates atomic fund/withdraw/transfer operations against the wallet
//! store and transaction log. Each operation runs as one unit of work:
//! amount validation happens before any lock is taken, balance sufficiency
//! is checked only under the wallet's exclusive lock, and every failure
//! path returns before anything is committed, so partial states are never
//! observable.
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use wallet_core::{Config, Ledger, NewUser};
//!
//! fn main() -> wallet_core::Result<()> {
//!     let ledger = Ledger::open(Config::default())?;
//!
//!     let (user, _wallet) = ledger.create_user(NewUser {
//!         email: "ada@example.com".to_string(),
//!         first_name: "Ada".to_string(),
//!         last_name: "Lovelace".to_string(),
//!         password_hash: "<hashed by the caller>".to_string(),
//!     })?;
//!
//!     let balance = ledger.fund(user.id, Decimal::new(10000, 2))?;
//!     assert_eq!(balance, Decimal::new(10000, 2));
//!
//!     Ok(())
//! }
//! ```

use crate::{
    lock::LockTable,
    metrics::Metrics,
    money,
    storage::UnitOfWork,
    types::{
        Metadata, NewUser, TransactionKind, TransactionRecord, User, UserId, Wallet,
        META_FROM_USER, META_TO_USER,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Updated balances after a transfer
///
/// The external contract needs at least the sender's balance; the receiver's
/// is included for callers that want it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Sender's balance after the debit
    pub from_balance: Decimal,

    /// Receiver's balance after the credit
    pub to_balance: Decimal,
}

/// Main ledger interface
pub struct Ledger {
    /// Wallet store and transaction log
    storage: Arc<Storage>,

    /// Per-wallet exclusive locks
    locks: LockTable,

    /// Operation metrics
    metrics: Metrics,
}

impl Ledger {
    /// Open the ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let locks = LockTable::new(Duration::from_millis(config.lock.acquire_timeout_ms));
        let metrics = Metrics::new()?;

        Ok(Self {
            storage,
            locks,
            metrics,
        })
    }

    /// Direct storage access, for read paths in the embedding service
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Operation metrics, for scraping by the embedding service
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start a unit of work for a caller-driven atomic sequence
    pub fn begin(&self) -> UnitOfWork {
        self.storage.begin()
    }

    /// Commit a caller-driven unit of work
    pub fn commit(&self, uow: UnitOfWork) -> Result<()> {
        self.commit_timed(uow)
    }

    // Account creation

    /// Create a user and their zero-balance wallet in one unit of work
    ///
    /// User and wallet are created-or-neither. Fails with
    /// [`Error::EmailTaken`] when the email is already registered. External
    /// checks on the applicant (e.g. a blacklist lookup) belong to the
    /// caller and run before this call.
    pub fn create_user(&self, new_user: NewUser) -> Result<(User, Wallet)> {
        if self.storage.user_id_by_email(&new_user.email)?.is_some() {
            return Err(Error::EmailTaken(new_user.email));
        }

        let user = User::from_new(new_user);

        let mut uow = self.storage.begin();
        self.storage.stage_user(&mut uow, &user)?;
        let wallet = self.create_wallet(user.id, &mut uow)?;
        self.commit_timed(uow)?;

        tracing::info!(user = %user.id, wallet = %wallet.id, "User created with wallet");

        Ok((user, wallet))
    }

    /// Stage a zero-balance wallet for an owner inside the caller's unit of
    /// work
    ///
    /// Collaborator contract for user-creation flows that insert the user
    /// row themselves: staging into the same unit of work makes user and
    /// wallet commit or roll back together.
    pub fn create_wallet(&self, owner: UserId, uow: &mut UnitOfWork) -> Result<Wallet> {
        match self.storage.wallet_id_for_owner(owner) {
            Ok(_) => return Err(Error::WalletExists(owner.to_string())),
            Err(Error::WalletNotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let wallet = Wallet::new(owner);
        self.storage.stage_wallet_create(uow, &wallet)?;
        Ok(wallet)
    }

    // Reads

    /// Current balance in major units
    pub fn balance(&self, owner: UserId) -> Result<Decimal> {
        let wallet = self.storage.wallet_by_owner(owner)?;
        Ok(money::from_minor_units(wallet.balance_minor))
    }

    /// The wallet's ledger entries, newest first
    pub fn history(&self, owner: UserId) -> Result<Vec<TransactionRecord>> {
        let wallet = self.storage.wallet_by_owner(owner)?;
        self.storage.transactions_by_wallet(wallet.id)
    }

    /// Check that the stored balance equals the sum of the wallet's log
    ///
    /// The transaction log is the provable audit trail of the balance; this
    /// verifies that invariant for one wallet.
    pub fn audit_balance(&self, owner: UserId) -> Result<bool> {
        let wallet = self.storage.wallet_by_owner(owner)?;
        let records = self.storage.transactions_by_wallet(wallet.id)?;

        let logged: i64 = records.iter().map(|r| r.amount_minor).sum();
        Ok(logged == wallet.balance_minor)
    }

    // Ledger operations

    /// Deposit `amount` (major units) into the owner's wallet
    ///
    /// Returns the new balance in major units.
    pub fn fund(&self, owner: UserId, amount: Decimal) -> Result<Decimal> {
        let result = self.fund_inner(owner, amount);
        match &result {
            Ok(_) => self.metrics.record_fund(),
            Err(e) if !e.is_retryable() => self.metrics.record_rejection(),
            Err(_) => {}
        }
        result
    }

    /// Withdraw `amount` (major units) from the owner's wallet
    ///
    /// Fails with [`Error::InsufficientFunds`] when the balance does not
    /// cover the debit; nothing is persisted on failure.
    pub fn withdraw(&self, owner: UserId, amount: Decimal) -> Result<Decimal> {
        let result = self.withdraw_inner(owner, amount);
        match &result {
            Ok(_) => self.metrics.record_withdraw(),
            Err(e) if !e.is_retryable() => self.metrics.record_rejection(),
            Err(_) => {}
        }
        result
    }

    /// Move `amount` (major units) between two owners' wallets
    ///
    /// Appends exactly two ledger entries (`transfer_out` on the sender,
    /// `transfer_in` on the receiver, equal and opposite) or none at all.
    pub fn transfer(&self, from: UserId, to: UserId, amount: Decimal) -> Result<TransferOutcome> {
        let result = self.transfer_inner(from, to, amount);
        match &result {
            Ok(_) => self.metrics.record_transfer(),
            Err(e) if !e.is_retryable() => self.metrics.record_rejection(),
            Err(_) => {}
        }
        result
    }

    fn fund_inner(&self, owner: UserId, amount: Decimal) -> Result<Decimal> {
        let amount_minor = money::to_minor_units(amount)?;

        let wallet_id = self.storage.wallet_id_for_owner(owner)?;
        let _lock = self.acquire_timed(wallet_id)?;

        // Authoritative re-read under the lock
        let mut wallet = self.storage.wallet(wallet_id)?;
        let new_balance = wallet
            .balance_minor
            .checked_add(amount_minor)
            .ok_or_else(|| Error::InvalidAmount("Balance overflow".to_string()))?;
        wallet.balance_minor = new_balance;
        wallet.updated_at = Utc::now();

        let record =
            TransactionRecord::new(wallet.id, TransactionKind::Fund, amount_minor, Metadata::new());

        let mut uow = self.storage.begin();
        self.storage.stage_wallet_update(&mut uow, &wallet)?;
        self.storage.stage_transaction(&mut uow, &record)?;
        self.commit_timed(uow)?;

        tracing::debug!(owner = %owner, wallet = %wallet.id, amount_minor, new_balance, "Wallet funded");

        Ok(money::from_minor_units(new_balance))
    }

    fn withdraw_inner(&self, owner: UserId, amount: Decimal) -> Result<Decimal> {
        let amount_minor = money::to_minor_units(amount)?;

        let wallet_id = self.storage.wallet_id_for_owner(owner)?;
        let _lock = self.acquire_timed(wallet_id)?;

        let mut wallet = self.storage.wallet(wallet_id)?;
        if wallet.balance_minor < amount_minor {
            return Err(Error::InsufficientFunds {
                available: wallet.balance_minor,
                requested: amount_minor,
            });
        }

        let new_balance = wallet.balance_minor - amount_minor;
        wallet.balance_minor = new_balance;
        wallet.updated_at = Utc::now();

        let record = TransactionRecord::new(
            wallet.id,
            TransactionKind::Withdraw,
            amount_minor,
            Metadata::new(),
        );

        let mut uow = self.storage.begin();
        self.storage.stage_wallet_update(&mut uow, &wallet)?;
        self.storage.stage_transaction(&mut uow, &record)?;
        self.commit_timed(uow)?;

        tracing::debug!(owner = %owner, wallet = %wallet.id, amount_minor, new_balance, "Wallet debited");

        Ok(money::from_minor_units(new_balance))
    }

    fn transfer_inner(&self, from: UserId, to: UserId, amount: Decimal) -> Result<TransferOutcome> {
        let amount_minor = money::to_minor_units(amount)?;
        if from == to {
            return Err(Error::SelfTransfer);
        }

        let from_wallet_id = self.storage.wallet_id_for_owner(from)?;
        let to_wallet_id = self.storage.wallet_id_for_owner(to)?;

        let wait_started = Instant::now();
        let _locks = self.locks.acquire_pair(from_wallet_id, to_wallet_id)?;
        self.metrics
            .observe_lock_wait(wait_started.elapsed().as_secs_f64());

        let mut from_wallet = self.storage.wallet(from_wallet_id)?;
        let mut to_wallet = self.storage.wallet(to_wallet_id)?;

        if from_wallet.balance_minor < amount_minor {
            return Err(Error::InsufficientFunds {
                available: from_wallet.balance_minor,
                requested: amount_minor,
            });
        }

        let new_from = from_wallet.balance_minor - amount_minor;
        let new_to = to_wallet
            .balance_minor
            .checked_add(amount_minor)
            .ok_or_else(|| Error::InvalidAmount("Balance overflow".to_string()))?;

        let now = Utc::now();
        from_wallet.balance_minor = new_from;
        from_wallet.updated_at = now;
        to_wallet.balance_minor = new_to;
        to_wallet.updated_at = now;

        let mut out_meta = Metadata::new();
        out_meta.insert(META_TO_USER.to_string(), to.to_string());
        let out_record = TransactionRecord::new(
            from_wallet.id,
            TransactionKind::TransferOut,
            amount_minor,
            out_meta,
        );

        let mut in_meta = Metadata::new();
        in_meta.insert(META_FROM_USER.to_string(), from.to_string());
        let in_record = TransactionRecord::new(
            to_wallet.id,
            TransactionKind::TransferIn,
            amount_minor,
            in_meta,
        );

        let mut uow = self.storage.begin();
        self.storage.stage_wallet_update(&mut uow, &from_wallet)?;
        self.storage.stage_wallet_update(&mut uow, &to_wallet)?;
        self.storage.stage_transaction(&mut uow, &out_record)?;
        self.storage.stage_transaction(&mut uow, &in_record)?;
        self.commit_timed(uow)?;

        tracing::debug!(
            from = %from,
            to = %to,
            amount_minor,
            from_balance = new_from,
            to_balance = new_to,
            "Transfer committed"
        );

        Ok(TransferOutcome {
            from_balance: money::from_minor_units(new_from),
            to_balance: money::from_minor_units(new_to),
        })
    }

    fn acquire_timed(&self, wallet_id: crate::types::WalletId) -> Result<crate::lock::WalletLock> {
        let started = Instant::now();
        let lock = self.locks.acquire(wallet_id)?;
        self.metrics
            .observe_lock_wait(started.elapsed().as_secs_f64());
        Ok(lock)
    }

    fn commit_timed(&self, uow: UnitOfWork) -> Result<()> {
        let started = Instant::now();
        self.storage.commit(uow)?;
        self.metrics
            .observe_commit(started.elapsed().as_secs_f64());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_ledger() -> (Ledger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).unwrap(), temp_dir)
    }

    fn test_user(ledger: &Ledger, email: &str) -> UserId {
        let (user, _wallet) = ledger
            .create_user(NewUser {
                email: email.to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                password_hash: "hash".to_string(),
            })
            .unwrap();
        user.id
    }

    #[test]
    fn test_create_user_makes_empty_wallet() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");

        assert_eq!(ledger.balance(owner).unwrap(), Decimal::ZERO);
        assert!(ledger.history(owner).unwrap().is_empty());
    }

    #[test]
    fn test_create_user_duplicate_email() {
        let (ledger, _temp) = test_ledger();
        test_user(&ledger, "a@example.com");

        let err = ledger
            .create_user(NewUser {
                email: "a@example.com".to_string(),
                first_name: "Other".to_string(),
                last_name: "User".to_string(),
                password_hash: "hash".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::EmailTaken(_)));
    }

    #[test]
    fn test_create_wallet_twice_rejected() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");

        let mut uow = ledger.begin();
        let err = ledger.create_wallet(owner, &mut uow).unwrap_err();
        assert!(matches!(err, Error::WalletExists(_)));
    }

    #[test]
    fn test_fund_returns_new_balance() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");

        let balance = ledger.fund(owner, Decimal::new(10000, 2)).unwrap();
        assert_eq!(balance, Decimal::new(10000, 2));

        let balance = ledger.fund(owner, Decimal::new(2550, 2)).unwrap();
        assert_eq!(balance, Decimal::new(12550, 2));
        assert_eq!(ledger.metrics().funds_total.get(), 2);
    }

    #[test]
    fn test_fund_unknown_owner() {
        let (ledger, _temp) = test_ledger();
        let err = ledger.fund(UserId::new(), Decimal::ONE).unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(_)));
    }

    #[test]
    fn test_fund_rejects_non_positive_amount() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");

        assert!(matches!(
            ledger.fund(owner, Decimal::ZERO),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.fund(owner, Decimal::new(-100, 2)),
            Err(Error::InvalidAmount(_))
        ));
        assert_eq!(ledger.metrics().rejections_total.get(), 2);
    }

    #[test]
    fn test_withdraw_happy_path() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");

        ledger.fund(owner, Decimal::new(10000, 2)).unwrap();
        let balance = ledger.withdraw(owner, Decimal::new(4000, 2)).unwrap();
        assert_eq!(balance, Decimal::new(6000, 2));

        let history = ledger.history(owner).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransactionKind::Withdraw);
        assert_eq!(history[0].amount_minor, -4000);
    }

    #[test]
    fn test_withdraw_insufficient_funds() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");
        ledger.fund(owner, Decimal::new(5000, 2)).unwrap();

        let err = ledger.withdraw(owner, Decimal::new(10000, 2)).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds {
                available: 5000,
                requested: 10000
            }
        ));

        // No mutation: balance and log unchanged
        assert_eq!(ledger.balance(owner).unwrap(), Decimal::new(5000, 2));
        assert_eq!(ledger.history(owner).unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_happy_path() {
        let (ledger, _temp) = test_ledger();
        let alice = test_user(&ledger, "alice@example.com");
        let bob = test_user(&ledger, "bob@example.com");

        ledger.fund(alice, Decimal::new(10000, 2)).unwrap();
        let outcome = ledger.transfer(alice, bob, Decimal::new(3000, 2)).unwrap();
        assert_eq!(outcome.from_balance, Decimal::new(7000, 2));
        assert_eq!(outcome.to_balance, Decimal::new(3000, 2));

        let out = &ledger.history(alice).unwrap()[0];
        assert_eq!(out.kind, TransactionKind::TransferOut);
        assert_eq!(out.amount_minor, -3000);
        assert_eq!(
            out.metadata.get(META_TO_USER),
            Some(&bob.to_string())
        );

        let incoming = &ledger.history(bob).unwrap()[0];
        assert_eq!(incoming.kind, TransactionKind::TransferIn);
        assert_eq!(incoming.amount_minor, 3000);
        assert_eq!(
            incoming.metadata.get(META_FROM_USER),
            Some(&alice.to_string())
        );
    }

    #[test]
    fn test_transfer_to_self_rejected() {
        let (ledger, _temp) = test_ledger();
        let owner = test_user(&ledger, "a@example.com");
        ledger.fund(owner, Decimal::new(10000, 2)).unwrap();

        let err = ledger
            .transfer(owner, owner, Decimal::new(1000, 2))
            .unwrap_err();
        assert!(matches!(err, Error::SelfTransfer));
        assert_eq!(ledger.history(owner).unwrap().len(), 1);
    }

    #[test]
    fn test_transfer_insufficient_funds_mutates_nothing() {
        let (ledger, _temp) = test_ledger();
        let alice = test_user(&ledger, "alice@example.com");
        let bob = test_user(&ledger, "bob@example.com");
        ledger.fund(alice, Decimal::new(2000, 2)).unwrap();

        let err = ledger
            .transfer(alice, bob, Decimal::new(5000, 2))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));

        assert_eq!(ledger.balance(alice).unwrap(), Decimal::new(2000, 2));
        assert_eq!(ledger.balance(bob).unwrap(), Decimal::ZERO);
        assert!(ledger.history(bob).unwrap().is_empty());
    }

    #[test]
    fn test_transfer_missing_receiver() {
        let (ledger, _temp) = test_ledger();
        let alice = test_user(&ledger, "alice@example.com");
        ledger.fund(alice, Decimal::new(2000, 2)).unwrap();

        let err = ledger
            .transfer(alice, UserId::new(), Decimal::new(1000, 2))
            .unwrap_err();
        assert!(matches!(err, Error::WalletNotFound(_)));
        assert_eq!(ledger.balance(alice).unwrap(), Decimal::new(2000, 2));
    }

    #[test]
    fn test_audit_balance_holds() {
        let (ledger, _temp) = test_ledger();
        let alice = test_user(&ledger, "alice@example.com");
        let bob = test_user(&ledger, "bob@example.com");

        ledger.fund(alice, Decimal::new(10000, 2)).unwrap();
        ledger.withdraw(alice, Decimal::new(2500, 2)).unwrap();
        ledger.transfer(alice, bob, Decimal::new(3000, 2)).unwrap();

        assert!(ledger.audit_balance(alice).unwrap());
        assert!(ledger.audit_balance(bob).unwrap());
    }
}
