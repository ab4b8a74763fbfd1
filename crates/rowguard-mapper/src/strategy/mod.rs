// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conflict strategies.
//!
//! A strategy decides how a mapper protects the rows it hands out for
//! editing:
//!
//! - [`Optimistic`] takes no lock and compares `updated_at` at save time.
//! - [`Pessimistic`] checks an application-level "editing" flag out through a
//!   separate locking session and clears it on close.
//! - [`Physical`] holds server row or table locks for the whole edit.

pub mod optimistic;
pub mod pessimistic;
pub mod physical;

use async_trait::async_trait;
use rowguard_core::{Record, RowGuardError, Session, Timestamp};
use strum::Display;

use crate::query::FetchTarget;

pub use optimistic::Optimistic;
pub use pessimistic::Pessimistic;
pub use physical::Physical;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StrategyKind {
    Optimistic,
    Pessimistic,
    Physical,
}

/// The hooks a [`RecordMapper`](crate::RecordMapper) drives through one edit.
///
/// `prepare` runs first and may acquire whatever the strategy protects the
/// rows with; `fetch_records_for_edit` reads them; `release` undoes
/// `prepare` after the mapper's own session has been closed. Every hook that
/// touches the database receives the mapper's session.
#[async_trait]
pub trait ConflictStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// True when the database itself excludes concurrent writers, making
    /// conflict detection pointless.
    fn delegates_to_database(&self) -> bool {
        false
    }

    /// Acquires protection before the rows are read.
    async fn prepare(
        &self,
        _session: &mut dyn Session,
        _target: &FetchTarget<'_>,
    ) -> Result<(), RowGuardError> {
        Ok(())
    }

    /// Reads the rows to be edited.
    async fn fetch_records_for_edit(
        &self,
        session: &mut dyn Session,
        target: &FetchTarget<'_>,
    ) -> Result<Vec<Record>, RowGuardError> {
        let (sql, params) = target.select()?;
        session.fetch(&sql, &params).await
    }

    /// Re-reads the rows for comparison against the edit snapshot.
    ///
    /// `None` means the strategy has nothing to compare.
    async fn fetch_current_records_for_detect_conflict(
        &self,
        _session: &mut dyn Session,
        _target: &FetchTarget<'_>,
    ) -> Result<Option<Vec<Record>>, RowGuardError> {
        Ok(None)
    }

    /// Gives up whatever `prepare` acquired.
    async fn release(&self) -> Result<(), RowGuardError> {
        Ok(())
    }

    /// Key pairing a snapshot row with its live counterpart.
    fn identifier(&self, _record: &Record) -> Option<String> {
        None
    }

    fn last_update_time(&self, _record: &Record) -> Option<Timestamp> {
        None
    }

    /// Whether `live` is the same version of the row as `snapshot`.
    fn is_same_version(&self, snapshot: &Record, live: &Record) -> bool {
        self.last_update_time(snapshot) == self.last_update_time(live)
    }
}
