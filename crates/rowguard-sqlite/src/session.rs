// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File sessions: one SQLite connection on tokio-rusqlite's background thread.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rowguard_core::{
    Backend, IsolationLevel, Record, RowGuardError, Session, SqlValue, Timestamp, parse_timestamp,
};
use tracing::{debug, warn};

use crate::database::{map_sqlite_err, map_tr_err, query_records, to_sqlite_values};
use crate::gate::{GateToken, IsolationGate};

/// A session against a SQLite database file.
///
/// Transactions are admitted through the shared [`IsolationGate`]; a `BEGIN`
/// while another session of the same gate is inside a transaction fails with
/// `TransactionState` before SQLite is asked for its lock.
pub struct FileSession {
    conn: Option<tokio_rusqlite::Connection>,
    gate: Arc<IsolationGate>,
    token: GateToken,
    level: IsolationLevel,
    path: String,
}

impl FileSession {
    /// Opens `path`, creating the file if needed.
    ///
    /// `busy_timeout` is how long SQLite waits on a file lock held by another
    /// connection before reporting `LockUnavailable`. Zero means never wait.
    pub async fn open(
        path: &str,
        gate: Arc<IsolationGate>,
        busy_timeout: Duration,
    ) -> Result<Self, RowGuardError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| RowGuardError::Connection {
                message: format!("cannot open sqlite database {path}"),
                source: Some(Box::new(e)),
            })?;
        let resource = path.to_string();
        conn.call(move |conn| Ok::<_, rusqlite::Error>(conn.busy_timeout(busy_timeout)))
            .await
            .map_err(map_tr_err)?
            .map_err(|e| map_sqlite_err(e, &resource))?;

        let token = gate.register();
        debug!(path, session = ?token, "sqlite session opened");
        Ok(Self {
            conn: Some(conn),
            gate,
            token,
            level: IsolationLevel::NoLock,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Runs `f` on the connection thread.
    ///
    /// The closure's own error travels back inside the outer `Ok` so it can be
    /// classified here instead of being flattened into a thread error.
    async fn run<R, F>(&self, f: F) -> Result<R, RowGuardError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.as_ref().ok_or_else(|| {
            RowGuardError::connection(format!("sqlite session for {} is closed", self.path))
        })?;
        conn.call(move |conn| Ok::<_, rusqlite::Error>(f(conn)))
            .await
            .map_err(map_tr_err)?
            .map_err(|e| map_sqlite_err(e, &self.path))
    }

    async fn batch(&self, sql: &'static str) -> Result<(), RowGuardError> {
        self.run(move |conn| conn.execute_batch(sql)).await
    }

    /// Ends the transaction with `sql` and resets the gate whatever happens.
    async fn finish(&mut self, sql: &'static str) -> Result<(), RowGuardError> {
        let result = self.batch(sql).await;
        if result.is_err() && sql == "COMMIT" {
            // A failed COMMIT leaves SQLite inside the transaction.
            if let Err(e) = self.batch("ROLLBACK").await {
                warn!(path = %self.path, error = %e, "rollback after failed commit also failed");
            }
        }
        debug!(path = %self.path, level = %self.level, statement = sql, ok = result.is_ok(), "transaction finished");
        self.level = IsolationLevel::NoLock;
        self.gate.release(self.token);
        result
    }
}

#[async_trait]
impl Session for FileSession {
    fn backend(&self) -> Backend {
        Backend::File
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, RowGuardError> {
        let sql = sql.to_string();
        let values = to_sqlite_values(params);
        let changed = self
            .run(move |conn| conn.execute(&sql, rusqlite::params_from_iter(values.iter())))
            .await?;
        Ok(changed as u64)
    }

    async fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Record>, RowGuardError> {
        let sql = sql.to_string();
        let values = to_sqlite_values(params);
        self.run(move |conn| query_records(conn, &sql, &values)).await
    }

    async fn begin(&mut self, level: IsolationLevel) -> Result<(), RowGuardError> {
        if self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "{} already has an open {} transaction",
                self.path, self.level
            )));
        }
        if !level.is_transaction() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(RowGuardError::connection(format!(
                "sqlite session for {} is closed",
                self.path
            )));
        }
        self.gate.try_acquire(self.token, level)?;
        let sql = match level {
            IsolationLevel::Exclusive => "BEGIN EXCLUSIVE",
            IsolationLevel::Immediate => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        };
        if let Err(e) = self.batch(sql).await {
            self.gate.release(self.token);
            return Err(e);
        }
        self.level = level;
        debug!(path = %self.path, %level, "transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RowGuardError> {
        if !self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "no transaction to commit on {}",
                self.path
            )));
        }
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), RowGuardError> {
        if !self.level.is_transaction() {
            return Ok(());
        }
        self.finish("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<(), RowGuardError> {
        if self.is_closed() {
            return Ok(());
        }
        if self.level.is_transaction() {
            if let Err(e) = self.finish("ROLLBACK").await {
                warn!(path = %self.path, error = %e, "rollback during close failed");
            }
        }
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(path = %self.path, error = %e, "sqlite connection did not close cleanly");
            }
        }
        debug!(path = %self.path, "sqlite session closed");
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, RowGuardError> {
        let table = table.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn current_time(&mut self) -> Result<Timestamp, RowGuardError> {
        let raw: String = self
            .run(|conn| {
                conn.query_row("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [], |row| {
                    row.get(0)
                })
            })
            .await?;
        parse_timestamp(&raw).ok_or_else(|| RowGuardError::Decode {
            column: "now".to_string(),
            detail: format!("unexpected sqlite time `{raw}`"),
        })
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        if self.level.is_transaction() {
            // The connection rolls back when its thread shuts down; the gate
            // has to be reset here or every other session stays locked out.
            warn!(path = %self.path, level = %self.level, "sqlite session dropped inside a transaction");
            self.gate.release(self.token);
        }
    }
}
