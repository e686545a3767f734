use crate::{
    account::RankEntry,
    engine::{Attempt, PointEngine},
    error::{PointError, Result},
    ledger::{OperationType, StatusCode},
};
use tracing::debug;

impl PointEngine {
    /// Up to `n` accounts ordered by points, highest first
    ///
    /// Read-only: the audit log only sees the failures.
    pub fn top_n(&self, n: usize, plugin: Option<&str>) -> Result<Vec<RankEntry>> {
        let attempt = Attempt::new(OperationType::GetTopN, "", plugin);

        if n == 0 {
            let message = "Ranking size must be a positive integer";
            debug!(n, "Rejected: {message}");
            self.audit()
                .record(attempt.entry(StatusCode::InvalidInput).with_comment(message));

            return Err(PointError::InvalidInput(message.to_owned()));
        }

        match self.accounts().top(n) {
            Ok(rows) => Ok(rows.into_iter().map(RankEntry::from).collect()),
            Err(e) => Err(self.read_failed(&attempt, e)),
        }
    }
}
