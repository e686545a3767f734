//! Per-user point balances with an audited, reversible mutation core
//!
//! Every balance change is tied to a [`TransactionId`] and recorded in the
//! [`AuditLog`]; any committed change can be rolled back exactly once.

pub mod account;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
mod locks;
mod ranking;
pub mod store;
pub mod transaction;

pub use account::{Account, RankEntry};
pub use audit::AuditLog;
pub use config::EngineConfig;
pub use engine::{OperationResult, PointEngine};
pub use error::{PointError, StoreError};
pub use ledger::{
    BalanceChange, EntryFilter, LedgerEntry, OperationType, StatusCode, TransactionStatus,
};
pub use store::{AccountStore, LedgerStore, MemoryStore};
pub use transaction::TransactionId;
