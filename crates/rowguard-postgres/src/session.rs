// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server sessions: one dedicated PostgreSQL connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rowguard_core::{
    Backend, IsolationLevel, Record, RowGuardError, Session, SqlValue, TableLockMode, Timestamp,
    validate_identifier,
};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection};
use sqlx::AssertSqlSafe;
use sqlx::query::Query;
use sqlx::{Connection, Postgres};
use tracing::{debug, warn};

use crate::decode::decode_row;
use crate::error::map_sqlx_err;

/// The `BEGIN` statement for each isolation level.
///
/// PostgreSQL has no deferred/immediate/exclusive transactions; the levels are
/// mapped onto its isolation levels in increasing strength.
pub fn begin_statement(level: IsolationLevel) -> Option<&'static str> {
    match level {
        IsolationLevel::NoLock => None,
        IsolationLevel::Deferred => Some("BEGIN ISOLATION LEVEL READ COMMITTED"),
        IsolationLevel::Immediate => Some("BEGIN ISOLATION LEVEL REPEATABLE READ"),
        IsolationLevel::Exclusive => Some("BEGIN ISOLATION LEVEL SERIALIZABLE"),
    }
}

/// `LOCK TABLE` with NOWAIT so a held lock fails immediately.
pub fn lock_table_statement(table: &str, mode: TableLockMode) -> Result<String, RowGuardError> {
    let table = validate_identifier(table)?;
    Ok(format!("LOCK TABLE {table} IN {mode} MODE NOWAIT"))
}

fn bind_all<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(AssertSqlSafe(sql)), |query, param| match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
        })
}

/// A session against a PostgreSQL server.
///
/// Row locks come from the server (`FOR UPDATE NOWAIT`, `LOCK TABLE ...
/// NOWAIT`); there is no process-side gate. A session's isolation level is
/// still tracked so nested `begin` calls are rejected the same way as on the
/// file backend.
pub struct ServerSession {
    conn: Option<PgConnection>,
    level: IsolationLevel,
    label: String,
}

impl ServerSession {
    pub async fn connect(url: &str) -> Result<Self, RowGuardError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e| map_sqlx_err(e, "postgres url"))?;
        Self::connect_with(&options).await
    }

    pub async fn connect_with(options: &PgConnectOptions) -> Result<Self, RowGuardError> {
        let label = format!(
            "{}@{}",
            options.get_database().unwrap_or("postgres"),
            options.get_host()
        );
        let conn = PgConnection::connect_with(options)
            .await
            .map_err(|e| map_sqlx_err(e, &label))?;
        debug!(server = %label, "postgres session opened");
        Ok(Self {
            conn: Some(conn),
            level: IsolationLevel::NoLock,
            label,
        })
    }

    /// `database@host`, used in logs and error messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn conn(&mut self) -> Result<&mut PgConnection, RowGuardError> {
        let label = &self.label;
        self.conn
            .as_mut()
            .ok_or_else(|| RowGuardError::connection(format!("postgres session for {label} is closed")))
    }

    async fn simple(&mut self, sql: &str) -> Result<(), RowGuardError> {
        let label = self.label.clone();
        let conn = self.conn()?;
        sqlx::raw_sql(AssertSqlSafe(sql))
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_err(e, &label))?;
        Ok(())
    }

    async fn finish(&mut self, sql: &str) -> Result<(), RowGuardError> {
        let result = self.simple(sql).await;
        debug!(server = %self.label, level = %self.level, statement = sql, ok = result.is_ok(), "transaction finished");
        self.level = IsolationLevel::NoLock;
        result
    }

    /// Takes an `ACCESS EXCLUSIVE` lock: no other session may even read.
    pub async fn lock_table_exclusive(&mut self, table: &str) -> Result<(), RowGuardError> {
        self.lock_table(table, TableLockMode::AccessExclusive).await
    }

    /// Takes an `EXCLUSIVE` lock: other sessions may read but not write.
    pub async fn lock_table_readonly(&mut self, table: &str) -> Result<(), RowGuardError> {
        self.lock_table(table, TableLockMode::Exclusive).await
    }
}

#[async_trait]
impl Session for ServerSession {
    fn backend(&self) -> Backend {
        Backend::Server
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, RowGuardError> {
        let label = self.label.clone();
        let conn = self.conn()?;
        let result = bind_all(sql, params)
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_err(e, &label))?;
        Ok(result.rows_affected())
    }

    async fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Record>, RowGuardError> {
        let label = self.label.clone();
        let conn = self.conn()?;
        let rows = bind_all(sql, params)
            .fetch_all(conn)
            .await
            .map_err(|e| map_sqlx_err(e, &label))?;
        rows.iter().map(decode_row).collect()
    }

    async fn begin(&mut self, level: IsolationLevel) -> Result<(), RowGuardError> {
        if self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "{} already has an open {} transaction",
                self.label, self.level
            )));
        }
        let Some(sql) = begin_statement(level) else {
            return Ok(());
        };
        self.simple(sql).await?;
        self.level = level;
        debug!(server = %self.label, %level, "transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RowGuardError> {
        if !self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "no transaction to commit on {}",
                self.label
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
                warn!(server = %self.label, error = %e, "rollback during close failed");
            }
        }
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(server = %self.label, error = %e, "postgres connection did not close cleanly");
            }
        }
        debug!(server = %self.label, "postgres session closed");
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, RowGuardError> {
        let label = self.label.clone();
        let conn = self.conn()?;
        sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_err(e, &label))
    }

    async fn current_time(&mut self) -> Result<Timestamp, RowGuardError> {
        let label = self.label.clone();
        let conn = self.conn()?;
        sqlx::query_scalar::<_, DateTime<Utc>>("SELECT CURRENT_TIMESTAMP")
            .fetch_one(conn)
            .await
            .map_err(|e| map_sqlx_err(e, &label))
    }

    async fn lock_table(&mut self, table: &str, mode: TableLockMode) -> Result<(), RowGuardError> {
        if !self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "LOCK TABLE {table} needs an open transaction"
            )));
        }
        let sql = lock_table_statement(table, mode)?;
        let conn = self.conn()?;
        sqlx::raw_sql(AssertSqlSafe(sql))
            .execute(conn)
            .await
            .map_err(|e| map_sqlx_err(e, table))?;
        debug!(server = %self.label, table, %mode, "table locked");
        Ok(())
    }
}

impl Drop for ServerSession {
    fn drop(&mut self) {
        if self.level.is_transaction() {
            warn!(server = %self.label, level = %self.level, "postgres session dropped inside a transaction");
        }
    }
}
