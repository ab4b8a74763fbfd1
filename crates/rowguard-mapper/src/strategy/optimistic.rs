// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic conflict detection by last-update timestamp.

use async_trait::async_trait;
use rowguard_core::{Record, RowGuardError, Session, Timestamp, parse_timestamp};

use super::{ConflictStrategy, StrategyKind};
use crate::query::FetchTarget;

/// Takes no lock. At save time the rows are read again and compared against
/// the snapshot taken by `edit`: a row whose update timestamp moved, or that
/// disappeared, is an `OptimisticConflict`.
///
/// The re-read must happen inside a transaction, so that nothing can change
/// between the check and the caller's writes.
#[derive(Debug, Clone)]
pub struct Optimistic {
    id_column: String,
    updated_column: String,
}

impl Optimistic {
    pub fn new(id_column: impl Into<String>, updated_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            updated_column: updated_column.into(),
        }
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn updated_column(&self) -> &str {
        &self.updated_column
    }
}

impl Default for Optimistic {
    fn default() -> Self {
        Self::new("id", "updated_at")
    }
}

#[async_trait]
impl ConflictStrategy for Optimistic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimistic
    }

    async fn fetch_current_records_for_detect_conflict(
        &self,
        session: &mut dyn Session,
        target: &FetchTarget<'_>,
    ) -> Result<Option<Vec<Record>>, RowGuardError> {
        if !session.isolation_level().is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "conflict check on {} needs an open transaction; the session is in NOLOCK",
                target.table
            )));
        }
        let (sql, params) = target.select()?;
        session.fetch(&sql, &params).await.map(Some)
    }

    fn identifier(&self, record: &Record) -> Option<String> {
        record.get(&self.id_column).map(str::to_string)
    }

    fn last_update_time(&self, record: &Record) -> Option<Timestamp> {
        record.get(&self.updated_column).and_then(parse_timestamp)
    }

    /// Compares parsed instants when both sides parse, raw text otherwise.
    fn is_same_version(&self, snapshot: &Record, live: &Record) -> bool {
        match (self.last_update_time(snapshot), self.last_update_time(live)) {
            (Some(a), Some(b)) => a == b,
            _ => snapshot.get(&self.updated_column) == live.get(&self.updated_column),
        }
    }
}
