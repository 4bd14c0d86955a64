//! Error types for the wallet ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Validation failures (`InvalidAmount`, `WalletNotFound`, `InsufficientFunds`,
/// `SelfTransfer`, `EmailTaken`, `WalletExists`) are terminal for the given
/// input. The remaining variants cover infrastructure faults and are the only
/// ones worth retrying; see [`Error::is_retryable`].
#[derive(Error, Debug)]
pub enum Error {
    /// Amount is non-positive or not representable in minor units
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Owner has no wallet
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Debit exceeds the wallet balance
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance in minor units at the time of the check
        available: i64,
        /// Requested debit in minor units
        requested: i64,
    },

    /// Source and destination are the same wallet
    #[error("Cannot transfer to self")]
    SelfTransfer,

    /// Email is already registered to another user
    #[error("Email already registered: {0}")]
    EmailTaken(String),

    /// Owner already has a wallet
    #[error("Wallet already exists for owner: {0}")]
    WalletExists(String),

    /// Lock acquisition timed out; safe to retry
    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the operation may be retried unchanged.
    ///
    /// Only infrastructure faults qualify; a validation failure will fail
    /// again for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable(_) | Error::Storage(_) | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
