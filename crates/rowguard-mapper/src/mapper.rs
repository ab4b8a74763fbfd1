// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The record mapper: one edit session over a set of rows.

use futures::future::BoxFuture;
use rowguard_core::{
    IsolationLevel, Record, RowGuardError, Session, WhereSet, validate_identifier,
};
use tracing::{debug, info, warn};

use crate::query::FetchTarget;
use crate::strategy::{ConflictStrategy, Pessimistic};

/// Where a mapper is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    /// Constructed, or returned here after a failed `edit`.
    Idle,
    Editing,
    /// The session is closed; the mapper cannot be reused.
    Closed,
}

/// Fetches a set of rows for editing and guards them with a
/// [`ConflictStrategy`] until [`close`](Self::close).
///
/// The usual flow:
///
/// 1. [`edit`](Self::edit) acquires protection and reads the rows.
/// 2. The caller changes [`records_mut`](Self::records_mut).
/// 3. [`begin_save`](Self::begin_save) opens the write transaction and checks
///    for conflicting changes.
/// 4. The caller writes through [`session_mut`](Self::session_mut).
/// 5. [`commit`](Self::commit) commits and closes.
///
/// `close` must run on every path; [`run_edit`](Self::run_edit) wraps the
/// flow so that it does. A mapper dropped while editing logs a warning; a
/// pessimistic flag left behind that way stays set until forcibly released.
pub struct RecordMapper<S: ConflictStrategy> {
    session: Box<dyn Session>,
    table: String,
    filter: Option<Box<dyn WhereSet>>,
    order_by: Vec<String>,
    strategy: S,
    ignore_conflict_detection: bool,
    records: Vec<Record>,
    snapshot: Vec<Record>,
    state: EditState,
    began_transaction: bool,
}

impl<S: ConflictStrategy> RecordMapper<S> {
    pub fn new(
        session: Box<dyn Session>,
        table: &str,
        strategy: S,
    ) -> Result<Self, RowGuardError> {
        let table = validate_identifier(table)?.to_string();
        let ignore_conflict_detection = strategy.delegates_to_database();
        Ok(Self {
            session,
            table,
            filter: None,
            order_by: Vec::new(),
            strategy,
            ignore_conflict_detection,
            records: Vec::new(),
            snapshot: Vec::new(),
            state: EditState::Idle,
            began_transaction: false,
        })
    }

    /// Restricts the rows to those matching `filter`.
    pub fn with_filter(mut self, filter: impl WhereSet + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn with_order_by<I, T>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.order_by = terms.into_iter().map(Into::into).collect();
        self
    }

    /// Skips conflict detection regardless of strategy.
    pub fn ignore_conflict_detection(mut self, ignore: bool) -> Self {
        self.ignore_conflict_detection = ignore;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn is_editing(&self) -> bool {
        self.state == EditState::Editing
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Rows as they were when `edit` read them.
    pub fn snapshot(&self) -> &[Record] {
        &self.snapshot
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// The mapper's own session, for the caller's writes.
    pub fn session_mut(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    fn ensure_open(&self) -> Result<(), RowGuardError> {
        if self.state == EditState::Closed {
            return Err(RowGuardError::connection(format!(
                "mapper for {} is closed",
                self.table
            )));
        }
        Ok(())
    }

    fn ensure_editing(&self, operation: &str) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if self.state != EditState::Editing {
            return Err(RowGuardError::TransactionState(format!(
                "{operation} on {} before edit",
                self.table
            )));
        }
        Ok(())
    }

    /// Acquires the strategy's protection and reads the rows.
    ///
    /// Calling it again while editing is a no-op. On failure nothing stays
    /// acquired: a transaction begun here is rolled back, the strategy is
    /// released, and the mapper is back to `Idle`.
    pub async fn edit(&mut self) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if self.state == EditState::Editing {
            debug!(table = %self.table, "edit called while already editing");
            return Ok(());
        }

        let had_transaction = self.session.isolation_level().is_transaction();
        let target = FetchTarget::new(&self.table, self.filter.as_deref(), &self.order_by);
        if let Err(e) = self.strategy.prepare(self.session.as_mut(), &target).await {
            self.discard_own_transaction(had_transaction).await;
            return Err(e);
        }
        let fetched = self
            .strategy
            .fetch_records_for_edit(self.session.as_mut(), &target)
            .await;
        match fetched {
            Ok(records) => {
                self.began_transaction =
                    !had_transaction && self.session.isolation_level().is_transaction();
                self.snapshot = records.clone();
                self.records = records;
                self.state = EditState::Editing;
                info!(
                    table = %self.table,
                    strategy = %self.strategy.kind(),
                    rows = self.records.len(),
                    "editing started"
                );
                Ok(())
            }
            Err(e) => {
                self.discard_own_transaction(had_transaction).await;
                if let Err(release_err) = self.strategy.release().await {
                    warn!(table = %self.table, error = %release_err, "releasing after failed edit failed");
                }
                Err(e)
            }
        }
    }

    async fn discard_own_transaction(&mut self, had_transaction: bool) {
        if had_transaction || !self.session.isolation_level().is_transaction() {
            return;
        }
        if let Err(e) = self.session.rollback().await {
            warn!(table = %self.table, error = %e, "rollback after failed edit failed");
        }
    }

    /// Reads the rows through the strategy without touching mapper state.
    pub async fn fetch_records_for_edit(
        &mut self,
        order_by: &[String],
    ) -> Result<Vec<Record>, RowGuardError> {
        self.ensure_open()?;
        let target = FetchTarget::new(&self.table, self.filter.as_deref(), order_by);
        self.strategy
            .fetch_records_for_edit(self.session.as_mut(), &target)
            .await
    }

    /// Re-reads the rows for conflict detection; `None` if the strategy has
    /// nothing to compare.
    pub async fn fetch_current_records_for_detect_conflict(
        &mut self,
    ) -> Result<Option<Vec<Record>>, RowGuardError> {
        self.ensure_open()?;
        let target = FetchTarget::new(&self.table, self.filter.as_deref(), &self.order_by);
        self.strategy
            .fetch_current_records_for_detect_conflict(self.session.as_mut(), &target)
            .await
    }

    /// Fails with `OptimisticConflict` if any snapshot row changed or vanished.
    ///
    /// Rows without an identifier (new rows, or a strategy with no key) are
    /// not checked. A no-op when detection is ignored; `TransactionState`
    /// when the mapper is not editing.
    pub async fn detect_conflict(&mut self) -> Result<(), RowGuardError> {
        self.ensure_editing("detect_conflict")?;
        if self.ignore_conflict_detection {
            return Ok(());
        }
        let Some(current) = self.fetch_current_records_for_detect_conflict().await? else {
            return Ok(());
        };
        for snapshot in &self.snapshot {
            let Some(identifier) = self.strategy.identifier(snapshot) else {
                continue;
            };
            let live = current
                .iter()
                .find(|row| self.strategy.identifier(row).as_deref() == Some(identifier.as_str()));
            let unchanged = live.is_some_and(|live| self.strategy.is_same_version(snapshot, live));
            if !unchanged {
                info!(table = %self.table, %identifier, vanished = live.is_none(), "conflicting change detected");
                return Err(RowGuardError::OptimisticConflict {
                    table: self.table.clone(),
                    identifier,
                });
            }
        }
        Ok(())
    }

    /// Opens the write transaction (unless one is open) and runs
    /// [`detect_conflict`](Self::detect_conflict) inside it.
    ///
    /// On conflict the transaction begun here is rolled back and the mapper
    /// stays editing, so the caller can still `close`.
    pub async fn begin_save(&mut self, level: IsolationLevel) -> Result<(), RowGuardError> {
        self.ensure_editing("begin_save")?;
        let had_transaction = self.session.isolation_level().is_transaction();
        if !had_transaction {
            self.session.begin(level).await?;
        }
        if let Err(e) = self.detect_conflict().await {
            self.discard_own_transaction(had_transaction).await;
            return Err(e);
        }
        Ok(())
    }

    /// Commits the session's transaction, if any, and closes the mapper.
    ///
    /// When the commit fails the mapper stays editing; call `close`.
    pub async fn commit(&mut self) -> Result<(), RowGuardError> {
        self.ensure_editing("commit")?;
        if self.session.isolation_level().is_transaction() {
            self.session.commit().await?;
        }
        debug!(table = %self.table, "edit committed");
        self.close().await
    }

    /// Ends the edit: rolls back anything uncommitted, closes the session, then
    /// releases the strategy.
    ///
    /// Idempotent. Only a failed release is returned; session cleanup failures
    /// are logged.
    pub async fn close(&mut self) -> Result<(), RowGuardError> {
        let was_editing = self.close_session().await;
        if was_editing {
            self.strategy.release().await?;
            info!(table = %self.table, strategy = %self.strategy.kind(), "editing finished");
        }
        Ok(())
    }

    /// Closes the session and marks the mapper closed. Returns whether it was
    /// editing.
    async fn close_session(&mut self) -> bool {
        if self.state == EditState::Closed {
            return false;
        }
        let was_editing = self.state == EditState::Editing;
        if self.session.isolation_level().is_transaction() {
            if let Err(e) = self.session.rollback().await {
                warn!(table = %self.table, error = %e, "rollback during close failed");
            }
        }
        if let Err(e) = self.session.close().await {
            warn!(table = %self.table, error = %e, "closing session failed");
        }
        self.state = EditState::Closed;
        self.began_transaction = false;
        self.records.clear();
        self.snapshot.clear();
        was_editing
    }

    /// Undoes a successful `edit` without closing the session.
    pub(crate) async fn abort_edit(&mut self) {
        if self.state != EditState::Editing {
            return;
        }
        if self.began_transaction {
            if let Err(e) = self.session.rollback().await {
                warn!(table = %self.table, error = %e, "rollback while aborting edit failed");
            }
        }
        if let Err(e) = self.strategy.release().await {
            warn!(table = %self.table, error = %e, "release while aborting edit failed");
        }
        self.began_transaction = false;
        self.records.clear();
        self.snapshot.clear();
        self.state = EditState::Idle;
    }

    /// Replaces the working rows, keeping the snapshot.
    pub(crate) fn replace_records(&mut self, records: Vec<Record>) {
        self.records = records;
    }

    /// Runs `body` inside an edit and always closes.
    ///
    /// `edit` runs first; if `body` succeeds the mapper commits, otherwise it
    /// closes. The mapper is consumed.
    pub async fn run_edit<T, F>(mut self, body: F) -> Result<T, RowGuardError>
    where
        F: for<'m> FnOnce(&'m mut Self) -> BoxFuture<'m, Result<T, RowGuardError>>,
    {
        let outcome = match self.edit().await {
            Ok(()) => match body(&mut self).await {
                Ok(value) => self.commit().await.map(|()| value),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if self.state != EditState::Closed {
            if let Err(e) = self.close().await {
                if outcome.is_ok() {
                    return Err(e);
                }
                warn!(table = %self.table, error = %e, "close after failed edit failed");
            }
        }
        outcome
    }
}

impl RecordMapper<Pessimistic> {
    /// Closes the mapper and clears the editing flag without checking who
    /// holds it.
    ///
    /// Works whether or not this mapper ever called `edit`, which makes it
    /// the way to clear a flag stranded by a crashed editor.
    pub async fn forcibly_close(&mut self) -> Result<(), RowGuardError> {
        self.close_session().await;
        self.strategy.forcibly_release().await
    }
}

impl<S: ConflictStrategy> Drop for RecordMapper<S> {
    fn drop(&mut self) {
        if self.state == EditState::Editing {
            warn!(
                table = %self.table,
                strategy = %self.strategy.kind(),
                "record mapper dropped while editing; close was never called"
            );
        }
    }
}
