use anyhow::{anyhow, bail, Result};
use point_service::{LedgerEntry, PointEngine, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Name recorded as the caller of every replayed operation
pub const PLUGIN_NAME: &str = env!("CARGO_PKG_NAME");

/// Operation kind column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Get,
    Set,
    Add,
    Reduce,
    Rollback,
    Rename,
    Status,
}

/// Operation record from CSV
///
/// `tx` is a label chosen by the file author; the first mutating row that uses a
/// label gets a freshly issued transaction id, later rows refer back to it.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRow {
    pub op: OperationKind,
    pub user: String,
    #[serde(default)]
    pub tx: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Applies CSV rows to an engine
pub struct Replayer<'a> {
    engine: &'a PointEngine,
    labels: HashMap<String, TransactionId>,
}

impl<'a> Replayer<'a> {
    pub fn new(engine: &'a PointEngine) -> Self {
        Self {
            engine,
            labels: HashMap::new(),
        }
    }

    pub fn apply(&mut self, row: OperationRow) -> Result<()> {
        let plugin = Some(PLUGIN_NAME);
        let user = row.user.as_str();

        let result = match row.op {
            OperationKind::Get => {
                let points = self.engine.get(user, plugin)?;
                info!(user, ?points, "Balance");
                return Ok(());
            }
            OperationKind::Status => {
                let tx = self.resolve(row.tx.as_deref())?;
                let status = self.engine.transaction_status(&tx)?;
                info!(%tx, is_rollback = status.is_rollback, "Transaction status");
                return Ok(());
            }
            OperationKind::Set => {
                let tx = self.issue(row.tx.as_deref())?;
                self.engine.set(user, &tx, required_amount(&row)?, plugin)
            }
            OperationKind::Add => {
                let tx = self.issue(row.tx.as_deref())?;
                self.engine.add(user, &tx, required_amount(&row)?, plugin)
            }
            OperationKind::Reduce => {
                let tx = self.issue(row.tx.as_deref())?;
                self.engine.reduce(user, &tx, required_amount(&row)?, plugin)
            }
            OperationKind::Rollback => {
                let tx = self.resolve(row.tx.as_deref())?;
                self.engine.rollback(user, &tx, plugin)
            }
            OperationKind::Rename => {
                let name = row
                    .name
                    .as_deref()
                    .ok_or_else(|| anyhow!("Rename requires name"))?;
                self.engine.update_user_name(user, name, plugin)
            }
        };

        if !result.is_success() {
            bail!("{} {}", result.code(), result.message);
        }

        Ok(())
    }

    /// Transaction id for a mutating row, issued on first use of the label
    fn issue(&mut self, label: Option<&str>) -> Result<TransactionId> {
        let label = label.ok_or_else(|| anyhow!("Operation requires tx"))?;

        Ok(self
            .labels
            .entry(label.to_owned())
            .or_insert_with(TransactionId::generate)
            .clone())
    }

    /// Transaction id a row refers to; unknown labels are passed through verbatim
    fn resolve(&self, label: Option<&str>) -> Result<TransactionId> {
        let label = label.ok_or_else(|| anyhow!("Operation requires tx"))?;

        Ok(self
            .labels
            .get(label)
            .cloned()
            .unwrap_or_else(|| TransactionId::from(label)))
    }
}

fn required_amount(row: &OperationRow) -> Result<i64> {
    row.amount
        .ok_or_else(|| anyhow!("{:?} requires amount", row.op))
}

/// Flattened ledger entry for CSV output
#[derive(Debug, Serialize)]
pub struct AuditRow<'a> {
    timestamp: String,
    operation: &'static str,
    userid: &'a str,
    status: u16,
    transaction_id: Option<&'a str>,
    old_value: Option<i64>,
    new_value: Option<i64>,
    plugin: Option<&'a str>,
    is_rollback: bool,
    rollback_transaction: Option<&'a str>,
    comment: Option<&'a str>,
}

impl<'a> From<&'a LedgerEntry> for AuditRow<'a> {
    fn from(entry: &'a LedgerEntry) -> Self {
        Self {
            timestamp: entry.timestamp.to_rfc3339(),
            operation: entry.operation_type.as_str(),
            userid: &entry.userid,
            status: entry.status_code.code(),
            transaction_id: entry.transaction_id.as_ref().map(TransactionId::as_str),
            old_value: entry.change.map(|c| c.old_value),
            new_value: entry.change.map(|c| c.new_value),
            plugin: entry.plugin_name.as_deref(),
            is_rollback: entry.is_rollback,
            rollback_transaction: entry.rollback_transaction.as_ref().map(TransactionId::as_str),
            comment: entry.comment.as_deref(),
        }
    }
}
