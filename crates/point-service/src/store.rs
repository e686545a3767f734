//! Record store contract and an in-memory implementation
//!
//! The engine only talks to storage through [`AccountStore`] and [`LedgerStore`],
//! so any keyed record store (SQL table, document collection, ...) can back it.

use crate::{
    account::Account,
    error::StoreError,
    ledger::{EntryFilter, LedgerEntry},
    transaction::TransactionId,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Account rows keyed by userid
pub trait AccountStore: Send + Sync {
    fn find(&self, userid: &str) -> Result<Option<Account>, StoreError>;

    /// Insert a new row; fails with [`StoreError::Conflict`] if the userid exists
    fn create(&self, account: Account) -> Result<(), StoreError>;

    /// Update the balance of an existing row
    fn set_points(&self, userid: &str, points: i64) -> Result<(), StoreError>;

    /// Update the balance, creating the row when absent
    fn upsert_points(&self, userid: &str, points: i64) -> Result<(), StoreError>;

    fn set_username(&self, userid: &str, username: &str) -> Result<(), StoreError>;

    /// Rows ordered by points descending, at most `limit` of them
    fn top(&self, limit: usize) -> Result<Vec<Account>, StoreError>;
}

/// Append-mostly ledger entry rows
pub trait LedgerStore: Send + Sync {
    fn append(&self, entry: LedgerEntry) -> Result<(), StoreError>;

    /// Entries matching the filter, in append order
    fn query(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Flag the mutation entry of `(userid, transaction_id)` as rolled back by
    /// `rollback_id`. Refuses with [`StoreError::AlreadyRolledBack`] when the flag
    /// is already set.
    fn mark_rolled_back(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        rollback_id: &TransactionId,
    ) -> Result<(), StoreError>;
}

/// Process-local record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    entries: RwLock<Vec<LedgerEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

impl AccountStore for MemoryStore {
    fn find(&self, userid: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().get(userid).cloned())
    }

    fn create(&self, account: Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();

        if accounts.contains_key(&account.userid) {
            return Err(StoreError::Conflict(account.userid));
        }

        accounts.insert(account.userid.clone(), account);

        Ok(())
    }

    fn set_points(&self, userid: &str, points: i64) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(userid)
            .ok_or_else(|| StoreError::Missing(userid.to_owned()))?;

        account.points = points;

        Ok(())
    }

    fn upsert_points(&self, userid: &str, points: i64) -> Result<(), StoreError> {
        self.accounts
            .write()
            .entry(userid.to_owned())
            .or_insert_with(|| Account::new(userid, points))
            .points = points;

        Ok(())
    }

    fn set_username(&self, userid: &str, username: &str) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(userid)
            .ok_or_else(|| StoreError::Missing(userid.to_owned()))?;

        username.clone_into(&mut account.username);

        Ok(())
    }

    fn top(&self, limit: usize) -> Result<Vec<Account>, StoreError> {
        let mut rows: Vec<Account> = self.accounts.read().values().cloned().collect();

        // userid breaks ties so equal balances rank the same way on every call
        rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.userid.cmp(&b.userid)));
        rows.truncate(limit);

        Ok(rows)
    }
}

impl LedgerStore for MemoryStore {
    fn append(&self, entry: LedgerEntry) -> Result<(), StoreError> {
        self.entries.write().push(entry);

        Ok(())
    }

    fn query(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }

    fn mark_rolled_back(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        rollback_id: &TransactionId,
    ) -> Result<(), StoreError> {
        let filter = EntryFilter::by_transaction(transaction_id).for_user(userid);
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.is_mutation() && filter.matches(entry))
            .ok_or_else(|| StoreError::Missing(transaction_id.to_string()))?;

        if entry.is_rollback {
            return Err(StoreError::AlreadyRolledBack(transaction_id.to_string()));
        }

        entry.is_rollback = true;
        entry.rollback_transaction = Some(rollback_id.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BalanceChange, OperationType, StatusCode};

    fn account(userid: &str, points: i64) -> Account {
        Account::new(userid, points)
    }

    #[test]
    fn test_create_rejects_duplicate_userid() {
        let store = MemoryStore::new();

        store.create(account("alice", 10)).unwrap();
        let result = store.create(account("alice", 20));

        assert_eq!(result, Err(StoreError::Conflict("alice".to_string())));
        assert_eq!(store.find("alice").unwrap().unwrap().points, 10);
    }

    #[test]
    fn test_set_points_requires_existing_row() {
        let store = MemoryStore::new();

        assert!(store.set_points("ghost", 5).is_err());
        assert!(store.find("ghost").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_username() {
        let store = MemoryStore::new();

        store.upsert_points("alice", 5).unwrap();
        store.set_username("alice", "Alice").unwrap();
        store.upsert_points("alice", 7).unwrap();

        let row = store.find("alice").unwrap().unwrap();
        assert_eq!(row.points, 7);
        assert_eq!(row.username, "Alice");
    }

    #[test]
    fn test_top_orders_by_points_then_userid() {
        let store = MemoryStore::new();

        store.create(account("carol", 50)).unwrap();
        store.create(account("bob", 80)).unwrap();
        store.create(account("alice", 50)).unwrap();

        let top: Vec<_> = store
            .top(10)
            .unwrap()
            .into_iter()
            .map(|a| a.userid)
            .collect();

        assert_eq!(top, vec!["bob", "alice", "carol"]);
        assert_eq!(store.top(1).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_rolled_back_only_once() {
        let store = MemoryStore::new();
        let tx = TransactionId::generate();
        let first = TransactionId::generate();
        let second = TransactionId::generate();

        store
            .append(
                LedgerEntry::new(OperationType::Add, "alice", StatusCode::Success)
                    .with_transaction(Some(tx.clone()))
                    .with_change(Some(BalanceChange::new(0, 10))),
            )
            .unwrap();

        store.mark_rolled_back("alice", &tx, &first).unwrap();
        let again = store.mark_rolled_back("alice", &tx, &second);

        assert_eq!(again, Err(StoreError::AlreadyRolledBack(tx.to_string())));

        let entries = store.query(&EntryFilter::by_transaction(&tx)).unwrap();
        assert!(entries[0].is_rollback);
        assert_eq!(entries[0].rollback_transaction, Some(first));
    }

    #[test]
    fn test_mark_rolled_back_ignores_rejected_attempts() {
        let store = MemoryStore::new();
        let tx = TransactionId::generate();

        store
            .append(
                LedgerEntry::new(OperationType::Reduce, "alice", StatusCode::InsufficientBalance)
                    .with_transaction(Some(tx.clone())),
            )
            .unwrap();

        let result = store.mark_rolled_back("alice", &tx, &TransactionId::generate());

        assert!(matches!(result, Err(StoreError::Missing(_))));
    }
}
