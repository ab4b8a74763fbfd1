// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-side row and table locks.

use async_trait::async_trait;
use rowguard_core::{
    Backend, IsolationLevel, Record, RowGuardError, Session, TableLockMode,
};
use tracing::debug;

use super::{ConflictStrategy, StrategyKind};
use crate::query::FetchTarget;

/// Holds database locks on the edited rows until the mapper's transaction
/// ends.
///
/// With a filter the rows are read `FOR UPDATE NOWAIT`; without one the whole
/// table is locked `EXCLUSIVE NOWAIT` first. A lock held elsewhere surfaces
/// immediately as `LockUnavailable`. Only the server backend has these locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Physical;

impl Physical {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConflictStrategy for Physical {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Physical
    }

    fn delegates_to_database(&self) -> bool {
        true
    }

    async fn prepare(
        &self,
        session: &mut dyn Session,
        target: &FetchTarget<'_>,
    ) -> Result<(), RowGuardError> {
        if session.backend() != Backend::Server {
            return Err(RowGuardError::Unsupported(format!(
                "physical locking of {} needs the server backend",
                target.table
            )));
        }
        if !session.isolation_level().is_transaction() {
            session.begin(IsolationLevel::Deferred).await?;
        }
        Ok(())
    }

    async fn fetch_records_for_edit(
        &self,
        session: &mut dyn Session,
        target: &FetchTarget<'_>,
    ) -> Result<Vec<Record>, RowGuardError> {
        let (sql, params) = target.select()?;
        if target.filter.is_some() {
            debug!(table = target.table, "locking rows for update");
            session.fetch(&format!("{sql} FOR UPDATE NOWAIT"), &params).await
        } else {
            debug!(table = target.table, "locking whole table");
            session.lock_table(target.table, TableLockMode::Exclusive).await?;
            session.fetch(&sql, &params).await
        }
    }
}
