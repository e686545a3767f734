//! Audit record types
//!
//! Every operation attempt, accepted or rejected, produces one [`LedgerEntry`].
//! Which optional fields are populated depends on the operation and its outcome:
//!
//! - `transaction_id`: set for `set`/`add`/`reduce` once the presented identifier
//!   passed validation, and for a successful `rollback` (the fresh identifier of
//!   the reversal itself). Absent for reads and `updateUserName`.
//! - `change`: set only when a balance write happened.
//! - `comment`: set on rejection and internal failure, and on rollback entries.
//! - `rollback_transaction`: on an original entry, the identifier of the rollback
//!   that reversed it; on a rollback entry, the identifier it reversed.

use crate::transaction::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation that produced a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Get,
    GetUserName,
    Set,
    Add,
    Reduce,
    Rollback,
    UpdateUserName,
    GetTopN,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::GetUserName => "getUserName",
            Self::Set => "set",
            Self::Add => "add",
            Self::Reduce => "reduce",
            Self::Rollback => "rollback",
            Self::UpdateUserName => "updateUserName",
            Self::GetTopN => "getTopN",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result classification of an operation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum StatusCode {
    /// 200
    Success,
    /// 204, zero-amount add or reduce
    NoOp,
    /// 304, balance lower than the requested reduction
    InsufficientBalance,
    /// 400
    InvalidInput,
    /// 500, record store failure
    Internal,
}

impl StatusCode {
    pub const fn code(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::NoOp => 204,
            Self::InsufficientBalance => 304,
            Self::InvalidInput => 400,
            Self::Internal => 500,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::NoOp)
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            200 => Ok(Self::Success),
            204 => Ok(Self::NoOp),
            304 => Ok(Self::InsufficientBalance),
            400 => Ok(Self::InvalidInput),
            500 => Ok(Self::Internal),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Balance before and after a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub old_value: i64,
    pub new_value: i64,
}

impl BalanceChange {
    pub const fn new(old_value: i64, new_value: i64) -> Self {
        Self {
            old_value,
            new_value,
        }
    }

    pub const fn delta(&self) -> i64 {
        self.new_value - self.old_value
    }

    /// The same change seen from the reversing side
    pub const fn reversed(&self) -> Self {
        Self::new(self.new_value, self.old_value)
    }
}

/// Audit record of one operation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub transaction_id: Option<TransactionId>,
    pub userid: String,
    pub operation_type: OperationType,
    pub status_code: StatusCode,
    pub change: Option<BalanceChange>,
    pub plugin_name: Option<String>,
    pub comment: Option<String>,
    pub is_rollback: bool,
    pub rollback_transaction: Option<TransactionId>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(operation_type: OperationType, userid: &str, status_code: StatusCode) -> Self {
        Self {
            transaction_id: None,
            userid: userid.to_owned(),
            operation_type,
            status_code,
            change: None,
            plugin_name: None,
            comment: None,
            is_rollback: false,
            rollback_transaction: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_transaction(mut self, transaction_id: Option<TransactionId>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_change(mut self, change: Option<BalanceChange>) -> Self {
        self.change = change;
        self
    }

    pub fn with_plugin(mut self, plugin_name: Option<&str>) -> Self {
        self.plugin_name = plugin_name.map(str::to_owned);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_rollback_of(mut self, original: Option<TransactionId>) -> Self {
        self.rollback_transaction = original;
        self
    }

    /// Whether this entry recorded an actual balance write
    pub const fn is_mutation(&self) -> bool {
        self.change.is_some()
    }
}

/// Selection of ledger entries by user and/or transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub userid: Option<String>,
    pub transaction_id: Option<TransactionId>,
}

impl EntryFilter {
    pub fn by_transaction(transaction_id: &TransactionId) -> Self {
        Self {
            userid: None,
            transaction_id: Some(transaction_id.clone()),
        }
    }

    pub fn for_user(mut self, userid: &str) -> Self {
        self.userid = Some(userid.to_owned());
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.userid.as_ref().map_or(true, |u| *u == entry.userid)
            && self
                .transaction_id
                .as_ref()
                .map_or(true, |t| entry.transaction_id.as_ref() == Some(t))
    }
}

/// Rollback state of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionStatus {
    pub is_rollback: bool,
    pub rollback_transaction: Option<TransactionId>,
    pub rollback_time: Option<DateTime<Utc>>,
}
