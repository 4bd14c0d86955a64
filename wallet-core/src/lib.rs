//! Wallet Ledger Core
//!
//! Invariant-preserving state machine for wallet balances with an
//! append-only transaction log.
//!
//! # Architecture
//!
//! - **Minor units**: balances and amounts are `i64` cents internally;
//!   decimal conversion happens only at the API boundary
//! - **One wallet per user**: created atomically with the owning user
//! - **Unit of work**: every operation commits its balance mutation and
//!   ledger entries in one atomic batch, or not at all
//! - **Per-wallet locking**: exclusive row locks with bounded acquisition
//!   and canonical two-wallet ordering
//!
//! # Invariants
//!
//! - A wallet's balance always equals the sum of its ledger entries
//! - No operation drives a balance below zero
//! - A transfer appends exactly two entries (equal, opposite) or none
//! - Self-transfer is rejected before any mutation

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod lock;
pub mod metrics;
pub mod money;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{Ledger, TransferOutcome};
pub use metrics::Metrics;
pub use storage::{Storage, UnitOfWork};
pub use types::{
    Metadata, NewUser, TransactionKind, TransactionRecord, User, UserId, Wallet, WalletId,
};
