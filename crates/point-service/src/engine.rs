use crate::{
    account::Account,
    audit::AuditLog,
    config::EngineConfig,
    error::{PointError, Result, StoreError},
    ledger::{
        BalanceChange, EntryFilter, LedgerEntry, OperationType, StatusCode, TransactionStatus,
    },
    locks::KeyedLocks,
    store::{AccountStore, LedgerStore},
    transaction::TransactionId,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Caller-facing result of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub status: StatusCode,
    pub message: String,
    /// Identifier of the write that was recorded. For `rollback` this is the
    /// fresh identifier issued for the reversal.
    pub transaction_id: Option<TransactionId>,
}

impl OperationResult {
    pub const fn code(&self) -> u16 {
        self.status.code()
    }

    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Write that an operation performed
struct Applied {
    status: StatusCode,
    message: String,
    change: Option<BalanceChange>,
    transaction_id: Option<TransactionId>,
    rollback_of: Option<TransactionId>,
}

impl Applied {
    fn success(message: &str, change: BalanceChange, transaction_id: &TransactionId) -> Self {
        Self {
            status: StatusCode::Success,
            message: message.to_owned(),
            change: Some(change),
            transaction_id: Some(transaction_id.clone()),
            rollback_of: None,
        }
    }

    fn no_op(message: &str) -> Self {
        Self {
            status: StatusCode::NoOp,
            message: message.to_owned(),
            change: None,
            transaction_id: None,
            rollback_of: None,
        }
    }
}

/// Why an operation did not write
struct Rejection {
    status: StatusCode,
    message: String,
}

impl Rejection {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::InvalidInput,
            message: message.into(),
        }
    }

    fn insufficient_balance() -> Self {
        Self {
            status: StatusCode::InsufficientBalance,
            message: "Insufficient balance".to_owned(),
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(e: StoreError) -> Self {
        Self {
            status: StatusCode::Internal,
            message: e.to_string(),
        }
    }
}

type Outcome = std::result::Result<Applied, Rejection>;

/// Who asked for what; turned into the ledger entry once the outcome is known
pub(crate) struct Attempt<'a> {
    operation: OperationType,
    userid: &'a str,
    plugin: Option<&'a str>,
    transaction_id: Option<&'a TransactionId>,
}

impl<'a> Attempt<'a> {
    pub(crate) const fn new(
        operation: OperationType,
        userid: &'a str,
        plugin: Option<&'a str>,
    ) -> Self {
        Self {
            operation,
            userid,
            plugin,
            transaction_id: None,
        }
    }

    /// Attach the presented identifier, but only once it is known to be well formed
    fn with_transaction(mut self, transaction_id: &'a TransactionId) -> Self {
        self.transaction_id = transaction_id.is_valid().then_some(transaction_id);
        self
    }

    pub(crate) fn entry(&self, status: StatusCode) -> LedgerEntry {
        LedgerEntry::new(self.operation, self.userid, status)
            .with_transaction(self.transaction_id.cloned())
            .with_plugin(self.plugin)
    }
}

/// Point balance mutator
///
/// Every mutating call takes the per-user lock for the whole
/// read-compute-write-audit sequence, so concurrent calls for one user are
/// serialized while calls for different users proceed independently.
/// Calls presenting a transaction id also take that id's lock, always after
/// the user lock, so one id can commit at most one balance change.
pub struct PointEngine {
    accounts: Arc<dyn AccountStore>,
    audit: AuditLog,
    user_locks: KeyedLocks,
    transaction_locks: KeyedLocks,
    config: EngineConfig,
}

impl PointEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        config: EngineConfig,
    ) -> Self {
        info!(initial_points = config.initial_points, "Point engine started");

        Self {
            accounts,
            audit: AuditLog::new(ledger),
            user_locks: KeyedLocks::default(),
            transaction_locks: KeyedLocks::default(),
            config,
        }
    }

    /// Engine over a single store that keeps both record kinds
    pub fn with_store<S>(store: Arc<S>, config: EngineConfig) -> Self
    where
        S: AccountStore + LedgerStore + 'static,
    {
        Self::new(store.clone(), store, config)
    }

    pub const fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub(crate) fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    /// Current balance, `None` when the user has no account
    pub fn get(&self, userid: &str, plugin: Option<&str>) -> Result<Option<i64>> {
        let attempt = Attempt::new(OperationType::Get, userid, plugin);

        match self.accounts.find(userid) {
            Ok(account) => {
                self.audit.record(attempt.entry(StatusCode::Success));
                Ok(account.map(|a| a.points))
            }
            Err(e) => Err(self.read_failed(&attempt, e)),
        }
    }

    /// Stored display name, `None` when the user has no account
    pub fn get_user_name(&self, userid: &str, plugin: Option<&str>) -> Result<Option<String>> {
        let attempt = Attempt::new(OperationType::GetUserName, userid, plugin);

        match self.accounts.find(userid) {
            Ok(account) => {
                self.audit.record(attempt.entry(StatusCode::Success));
                Ok(account.map(|a| a.username))
            }
            Err(e) => Err(self.read_failed(&attempt, e)),
        }
    }

    /// Overwrite the balance with an absolute value, creating the account if absent
    pub fn set(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        points: i64,
        plugin: Option<&str>,
    ) -> OperationResult {
        let attempt =
            Attempt::new(OperationType::Set, userid, plugin).with_transaction(transaction_id);
        let slot = self.user_locks.slot(userid);
        let _guard = slot.lock();
        let tx_slot = self.transaction_locks.slot(transaction_id.as_str());
        let _tx_guard = tx_slot.lock();

        let outcome = self.apply_set(userid, transaction_id, points);
        self.conclude(&attempt, outcome)
    }

    fn apply_set(&self, userid: &str, transaction_id: &TransactionId, points: i64) -> Outcome {
        validate_transaction(transaction_id)?;

        if points < 0 {
            return Err(Rejection::invalid("Points cannot be negative"));
        }

        self.ensure_unused(transaction_id)?;

        let old_value = self.accounts.find(userid)?.map_or(0, |a| a.points);
        self.accounts.upsert_points(userid, points)?;

        Ok(Applied::success(
            "Points set",
            BalanceChange::new(old_value, points),
            transaction_id,
        ))
    }

    /// Credit `points`; a first credit creates the account seeded with the
    /// configured initial balance
    pub fn add(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        points: i64,
        plugin: Option<&str>,
    ) -> OperationResult {
        let attempt =
            Attempt::new(OperationType::Add, userid, plugin).with_transaction(transaction_id);
        let slot = self.user_locks.slot(userid);
        let _guard = slot.lock();
        let tx_slot = self.transaction_locks.slot(transaction_id.as_str());
        let _tx_guard = tx_slot.lock();

        let outcome = self.apply_add(userid, transaction_id, points);
        self.conclude(&attempt, outcome)
    }

    fn apply_add(&self, userid: &str, transaction_id: &TransactionId, points: i64) -> Outcome {
        validate_transaction(transaction_id)?;

        if points < 0 {
            return Err(Rejection::invalid("Points cannot be negative"));
        }

        if points == 0 {
            return Ok(Applied::no_op("Nothing to add"));
        }

        self.ensure_unused(transaction_id)?;

        let change = match self.accounts.find(userid)? {
            None => {
                let new_value = i64::from(self.config.initial_points)
                    .checked_add(points)
                    .ok_or_else(|| Rejection::invalid("Balance overflow"))?;
                self.accounts.create(Account::new(userid, new_value))?;

                // A created account reports 0 as its previous balance
                BalanceChange::new(0, new_value)
            }
            Some(account) => {
                let new_value = account
                    .points
                    .checked_add(points)
                    .ok_or_else(|| Rejection::invalid("Balance overflow"))?;
                self.accounts.set_points(userid, new_value)?;

                BalanceChange::new(account.points, new_value)
            }
        };

        Ok(Applied::success("Points added", change, transaction_id))
    }

    /// Debit `points`; never drives a balance below zero
    pub fn reduce(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        points: i64,
        plugin: Option<&str>,
    ) -> OperationResult {
        let attempt =
            Attempt::new(OperationType::Reduce, userid, plugin).with_transaction(transaction_id);
        let slot = self.user_locks.slot(userid);
        let _guard = slot.lock();
        let tx_slot = self.transaction_locks.slot(transaction_id.as_str());
        let _tx_guard = tx_slot.lock();

        let outcome = self.apply_reduce(userid, transaction_id, points);
        self.conclude(&attempt, outcome)
    }

    fn apply_reduce(&self, userid: &str, transaction_id: &TransactionId, points: i64) -> Outcome {
        if points < 0 {
            return Err(Rejection::invalid("Points cannot be negative"));
        }

        if points == 0 {
            return Ok(Applied::no_op("Nothing to reduce"));
        }

        validate_transaction(transaction_id)?;
        self.ensure_unused(transaction_id)?;

        let account = self
            .accounts
            .find(userid)?
            .ok_or_else(|| Rejection::invalid("User not found"))?;

        if account.points < points {
            return Err(Rejection::insufficient_balance());
        }

        let new_value = account.points - points;
        self.accounts.set_points(userid, new_value)?;

        Ok(Applied::success(
            "Points reduced",
            BalanceChange::new(account.points, new_value),
            transaction_id,
        ))
    }

    /// Overwrite the stored display name of an existing account
    ///
    /// Accounts are only created by balance operations, so an unknown userid is
    /// rejected with 400 instead of creating a row without its initial balance.
    pub fn update_user_name(
        &self,
        userid: &str,
        username: &str,
        plugin: Option<&str>,
    ) -> OperationResult {
        let attempt = Attempt::new(OperationType::UpdateUserName, userid, plugin);
        let slot = self.user_locks.slot(userid);
        let _guard = slot.lock();

        let outcome = self.apply_update_user_name(userid, username);
        self.conclude(&attempt, outcome)
    }

    fn apply_update_user_name(&self, userid: &str, username: &str) -> Outcome {
        if self.accounts.find(userid)?.is_none() {
            return Err(Rejection::invalid("User not found"));
        }

        self.accounts.set_username(userid, username)?;

        Ok(Applied {
            status: StatusCode::Success,
            message: "Username updated".to_owned(),
            change: None,
            transaction_id: None,
            rollback_of: None,
        })
    }

    /// Reverse the balance change recorded under `transaction_id`
    ///
    /// The reversal is applied to the current balance (`current - delta`), so
    /// writes made after the original transaction are kept.
    pub fn rollback(
        &self,
        userid: &str,
        transaction_id: &TransactionId,
        plugin: Option<&str>,
    ) -> OperationResult {
        let attempt = Attempt::new(OperationType::Rollback, userid, plugin);
        let slot = self.user_locks.slot(userid);
        let _guard = slot.lock();

        let outcome = self.apply_rollback(userid, transaction_id);
        let outcome = match outcome {
            Err(rejection) => Err(Rejection {
                message: format!("{} (transaction {transaction_id})", rejection.message),
                ..rejection
            }),
            applied => applied,
        };

        self.conclude(&attempt, outcome)
    }

    fn apply_rollback(&self, userid: &str, transaction_id: &TransactionId) -> Outcome {
        validate_transaction(transaction_id)?;

        let original = self
            .audit
            .find_mutation(&EntryFilter::by_transaction(transaction_id).for_user(userid))?
            .ok_or_else(|| Rejection::invalid("Transaction not found"))?;

        if original.operation_type == OperationType::Rollback {
            return Err(Rejection::invalid("A rollback cannot be rolled back"));
        }

        if original.is_rollback {
            return Err(Rejection::invalid("Transaction already rolled back"));
        }

        let Some(change) = original.change else {
            return Err(Rejection::invalid("Transaction not found"));
        };

        let current = self
            .accounts
            .find(userid)?
            .ok_or_else(|| Rejection::invalid("User not found"))?
            .points;
        let restored = current
            .checked_sub(change.delta())
            .ok_or_else(|| Rejection::invalid("Balance overflow"))?;

        if restored < 0 {
            return Err(Rejection::insufficient_balance());
        }

        let rollback_id = TransactionId::generate();
        self.accounts.set_points(userid, restored)?;

        if let Err(e) = self
            .audit
            .mark_rolled_back(userid, transaction_id, &rollback_id)
        {
            // Put the balance back so the transaction stays reversible
            if let Err(restore) = self.accounts.set_points(userid, current) {
                error!(
                    %userid,
                    %transaction_id,
                    "Failed to restore balance after rollback: {restore}"
                );
            }

            return Err(e.into());
        }

        debug!(
            %userid,
            %transaction_id,
            %rollback_id,
            current,
            restored,
            "Transaction rolled back"
        );

        Ok(Applied {
            status: StatusCode::Success,
            message: format!(
                "Rolled back transaction {transaction_id}, balance {current} -> {restored}"
            ),
            change: Some(change.reversed()),
            transaction_id: Some(rollback_id),
            rollback_of: Some(transaction_id.clone()),
        })
    }

    /// Rollback state of a transaction
    pub fn transaction_status(&self, transaction_id: &TransactionId) -> Result<TransactionStatus> {
        if !transaction_id.is_valid() {
            return Err(PointError::InvalidTransactionId(transaction_id.to_string()));
        }

        let entries = self
            .audit
            .query(&EntryFilter::by_transaction(transaction_id))?;
        let entry = entries
            .iter()
            .find(|e| e.is_mutation())
            .or_else(|| entries.first())
            .ok_or_else(|| PointError::TransactionNotFound(transaction_id.to_string()))?;

        let rollback_time = match (&entry.rollback_transaction, entry.is_rollback) {
            (Some(rollback_id), true) => self
                .audit
                .query(&EntryFilter::by_transaction(rollback_id))?
                .into_iter()
                .find(|e| e.operation_type == OperationType::Rollback)
                .map(|e| e.timestamp),
            _ => None,
        };

        Ok(TransactionStatus {
            is_rollback: entry.is_rollback,
            rollback_transaction: entry.rollback_transaction.clone(),
            rollback_time,
        })
    }

    fn ensure_unused(&self, transaction_id: &TransactionId) -> std::result::Result<(), Rejection> {
        match self
            .audit
            .find_mutation(&EntryFilter::by_transaction(transaction_id))?
        {
            Some(_) => Err(Rejection::invalid("Transaction id already used")),
            None => Ok(()),
        }
    }

    fn conclude(&self, attempt: &Attempt<'_>, outcome: Outcome) -> OperationResult {
        let userid = attempt.userid;
        let operation = attempt.operation;

        match outcome {
            Ok(applied) => {
                let transaction_id = applied
                    .transaction_id
                    .or_else(|| attempt.transaction_id.cloned());
                let mut entry = attempt
                    .entry(applied.status)
                    .with_transaction(transaction_id.clone())
                    .with_change(applied.change)
                    .with_rollback_of(applied.rollback_of);

                if operation == OperationType::Rollback {
                    entry = entry.with_comment(applied.message.clone());
                }

                self.audit.record(entry);
                debug!(%operation, %userid, status = %applied.status, "{}", applied.message);

                OperationResult {
                    status: applied.status,
                    message: applied.message,
                    transaction_id,
                }
            }
            Err(rejection) => {
                if rejection.status == StatusCode::Internal {
                    error!(%operation, %userid, "Record store failure: {}", rejection.message);
                } else {
                    debug!(
                        %operation,
                        %userid,
                        status = %rejection.status,
                        "Rejected: {}",
                        rejection.message
                    );
                }

                self.audit.record(
                    attempt
                        .entry(rejection.status)
                        .with_comment(rejection.message.clone()),
                );

                OperationResult {
                    status: rejection.status,
                    message: rejection.message,
                    transaction_id: None,
                }
            }
        }
    }

    pub(crate) fn read_failed(&self, attempt: &Attempt<'_>, e: StoreError) -> PointError {
        error!(
            operation = %attempt.operation,
            userid = %attempt.userid,
            "Record store failure: {e}"
        );
        self.audit
            .record(attempt.entry(StatusCode::Internal).with_comment(e.to_string()));

        e.into()
    }
}

fn validate_transaction(transaction_id: &TransactionId) -> std::result::Result<(), Rejection> {
    if transaction_id.is_valid() {
        Ok(())
    } else {
        Err(Rejection::invalid("Invalid transaction id"))
    }
}
