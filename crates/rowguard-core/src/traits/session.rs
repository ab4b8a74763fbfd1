// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The database session abstraction both backends implement.

use async_trait::async_trait;

use crate::error::RowGuardError;
use crate::types::{Backend, IsolationLevel, Record, SqlValue, TableLockMode, Timestamp};

/// A single database connection.
///
/// A session is either in autocommit mode (`IsolationLevel::NoLock`) or inside
/// exactly one transaction started by [`Session::begin`]. `commit`, `rollback`
/// and `close` always return the session to `NoLock`. After `close` every
/// statement fails with `RowGuardError::Connection`.
#[async_trait]
pub trait Session: Send {
    /// The engine this session talks to; selects placeholder and lock dialect.
    fn backend(&self) -> Backend;

    /// The isolation level of the transaction this session currently holds.
    fn isolation_level(&self) -> IsolationLevel;

    /// Whether [`Session::close`] has run.
    fn is_closed(&self) -> bool;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, RowGuardError>;

    /// Runs a query and renders every row as a [`Record`].
    async fn fetch(&mut self, sql: &str, params: &[SqlValue])
    -> Result<Vec<Record>, RowGuardError>;

    /// Opens a transaction. Fails with `TransactionState` when one is already
    /// open. `NoLock` is a no-op.
    async fn begin(&mut self, level: IsolationLevel) -> Result<(), RowGuardError>;

    async fn commit(&mut self) -> Result<(), RowGuardError>;

    async fn rollback(&mut self) -> Result<(), RowGuardError>;

    /// Rolls back any open transaction and releases the connection.
    ///
    /// Idempotent. Cleanup failures are logged rather than returned.
    async fn close(&mut self) -> Result<(), RowGuardError>;

    /// Catalog probe for a table.
    async fn table_exists(&mut self, table: &str) -> Result<bool, RowGuardError>;

    /// The database's notion of "now".
    async fn current_time(&mut self) -> Result<Timestamp, RowGuardError>;

    /// Takes a table-wide NOWAIT lock for the rest of the current transaction.
    async fn lock_table(&mut self, table: &str, _mode: TableLockMode) -> Result<(), RowGuardError> {
        Err(RowGuardError::Unsupported(format!(
            "table locks are not available on the {} backend (table `{table}`)",
            self.backend()
        )))
    }
}

/// Opens fresh sessions against one database.
///
/// The pessimistic strategy uses it to create the short-lived locking session
/// that negotiates the editing flag independently of the caller's session.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_database_for_editing(&self) -> Result<Box<dyn Session>, RowGuardError>;
}
