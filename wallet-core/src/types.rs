//! Core types for the wallet ledger
//!
//! All persisted types serialize deterministically with bincode. Money is
//! carried as `i64` minor units; decimal conversion happens at the API
//! boundary only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// User identifier, the owner of exactly one wallet
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh user ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet identifier
///
/// `Ord` gives the canonical lock-acquisition order for two-wallet
/// operations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct WalletId(Uuid);

impl WalletId {
    /// Generate a fresh wallet ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw key bytes for storage
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user row
///
/// The ledger core stores users only so that user and wallet creation can
/// share one unit of work. Credential hashing and authentication belong to
/// the caller; `password_hash` is opaque here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: UserId,

    /// Unique email address
    pub email: String,

    /// First name
    pub first_name: String,

    /// Last name
    pub last_name: String,

    /// Opaque credential hash supplied by the caller
    pub password_hash: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a user (and their wallet)
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique email address
    pub email: String,

    /// First name
    pub first_name: String,

    /// Last name
    pub last_name: String,

    /// Opaque credential hash supplied by the caller
    pub password_hash: String,
}

impl User {
    /// Build a user row from creation input
    pub fn from_new(new_user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A wallet row: one balance per owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID
    pub id: WalletId,

    /// Owning user (unique, one wallet per user)
    pub owner: UserId,

    /// Balance in minor units; never negative after any ledger operation
    pub balance_minor: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a zero-balance wallet for an owner
    pub fn new(owner: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            owner,
            balance_minor: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Deposit into a wallet
    Fund,
    /// Withdrawal from a wallet
    Withdraw,
    /// Debit side of a transfer
    TransferOut,
    /// Credit side of a transfer
    TransferIn,
}

impl TransactionKind {
    /// Stable string tag
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Fund => "fund",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::TransferIn => "transfer_in",
        }
    }

    /// Whether this kind credits the wallet (positive amount)
    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Fund | TransactionKind::TransferIn)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Schema-less key/value payload attached to a ledger entry
///
/// No core logic inspects its contents; transfers record the counterparty
/// user ID under [`META_TO_USER`] / [`META_FROM_USER`].
pub type Metadata = HashMap<String, String>;

/// Metadata key carrying the receiver's user ID on a `transfer_out` entry
pub const META_TO_USER: &str = "to_user_id";

/// Metadata key carrying the sender's user ID on a `transfer_in` entry
pub const META_FROM_USER: &str = "from_user_id";

/// Immutable ledger entry recording a single balance change
///
/// Append-only: no update or delete surface exists anywhere in the crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique entry ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Wallet this entry belongs to
    pub wallet_id: WalletId,

    /// Kind tag
    pub kind: TransactionKind,

    /// Signed amount in minor units: positive for credits, negative for
    /// debits
    pub amount_minor: i64,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Create a new entry with a fresh time-ordered ID
    ///
    /// Takes the amount as a positive magnitude; the stored sign is derived
    /// from the kind ([`TransactionKind::is_credit`]).
    pub fn new(
        wallet_id: WalletId,
        kind: TransactionKind,
        magnitude_minor: i64,
        metadata: Metadata,
    ) -> Self {
        let amount_minor = if kind.is_credit() {
            magnitude_minor
        } else {
            -magnitude_minor
        };

        Self {
            id: Uuid::now_v7(),
            wallet_id,
            kind,
            amount_minor,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(TransactionKind::Fund.as_str(), "fund");
        assert_eq!(TransactionKind::Withdraw.as_str(), "withdraw");
        assert_eq!(TransactionKind::TransferOut.as_str(), "transfer_out");
        assert_eq!(TransactionKind::TransferIn.as_str(), "transfer_in");
    }

    #[test]
    fn test_kind_credit_sign() {
        assert!(TransactionKind::Fund.is_credit());
        assert!(TransactionKind::TransferIn.is_credit());
        assert!(!TransactionKind::Withdraw.is_credit());
        assert!(!TransactionKind::TransferOut.is_credit());
    }

    #[test]
    fn test_record_sign_follows_kind() {
        let wallet_id = WalletId::new();
        let fund = TransactionRecord::new(wallet_id, TransactionKind::Fund, 500, Metadata::new());
        assert_eq!(fund.amount_minor, 500);

        let withdraw =
            TransactionRecord::new(wallet_id, TransactionKind::Withdraw, 500, Metadata::new());
        assert_eq!(withdraw.amount_minor, -500);

        let out =
            TransactionRecord::new(wallet_id, TransactionKind::TransferOut, 500, Metadata::new());
        assert_eq!(out.amount_minor, -500);

        let incoming =
            TransactionRecord::new(wallet_id, TransactionKind::TransferIn, 500, Metadata::new());
        assert_eq!(incoming.amount_minor, 500);
    }

    #[test]
    fn test_new_wallet_is_empty() {
        let wallet = Wallet::new(UserId::new());
        assert_eq!(wallet.balance_minor, 0);
    }

    #[test]
    fn test_record_ids_are_time_ordered() {
        let wallet_id = WalletId::new();
        let a = TransactionRecord::new(wallet_id, TransactionKind::Fund, 100, Metadata::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TransactionRecord::new(wallet_id, TransactionKind::Fund, 100, Metadata::new());
        assert!(a.id < b.id);
    }
}
