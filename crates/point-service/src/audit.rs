use crate::{
    error::StoreError,
    ledger::{EntryFilter, LedgerEntry},
    store::LedgerStore,
    transaction::TransactionId,
};
use std::sync::Arc;
use tracing::error;

/// Append-only audit trail over a [`LedgerStore`]
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn LedgerStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn append(&self, entry: LedgerEntry) -> Result<(), StoreError> {
        self.store.append(entry)
    }

    /// Append after the operation has taken effect. A failure here must not
    /// change the result reported to the caller, so it is logged instead.
    pub(crate) fn record(&self, entry: LedgerEntry) {
        let operation = entry.operation_type;
        let userid = entry.userid.clone();
        let status = entry.status_code;

        if let Err(e) = self.append(entry) {
            error!(%operation, %userid, %status, "Failed to append audit entry: {e}");
        }
    }

    pub fn query(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        self.store.query(filter)
    }

    /// First entry matching the filter that recorded a balance write
    pub fn find_mutation(&self, filter: &EntryFilter) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .query(filter)?
            .into_iter()
            .find(LedgerEntry::is_mutation))
    }

    pub(crate) fn mark_rolled_back(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        rollback_id: &TransactionId,
    ) -> Result<(), StoreError> {
        self.store
            .mark_rolled_back(userid, transaction_id, rollback_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::{BalanceChange, OperationType, StatusCode},
        store::MemoryStore,
    };

    #[test]
    fn test_find_mutation_skips_rejected_attempts() {
        let audit = AuditLog::new(Arc::new(MemoryStore::new()));
        let tx = TransactionId::generate();

        audit
            .append(
                LedgerEntry::new(OperationType::Reduce, "alice", StatusCode::InsufficientBalance)
                    .with_transaction(Some(tx.clone())),
            )
            .unwrap();
        audit
            .append(
                LedgerEntry::new(OperationType::Add, "alice", StatusCode::Success)
                    .with_transaction(Some(tx.clone()))
                    .with_change(Some(BalanceChange::new(0, 5))),
            )
            .unwrap();

        let found = audit
            .find_mutation(&EntryFilter::by_transaction(&tx))
            .unwrap()
            .unwrap();

        assert_eq!(found.operation_type, OperationType::Add);
        assert_eq!(audit.query(&EntryFilter::by_transaction(&tx)).unwrap().len(), 2);
    }

    #[test]
    fn test_find_mutation_none_for_unknown_transaction() {
        let audit = AuditLog::new(Arc::new(MemoryStore::new()));

        let found = audit
            .find_mutation(&EntryFilter::by_transaction(&TransactionId::generate()))
            .unwrap();

        assert!(found.is_none());
    }
}
