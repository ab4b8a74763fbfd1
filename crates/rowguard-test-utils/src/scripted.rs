// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted session for deterministic tests.
//!
//! `ScriptedSession` implements `Session` without a database. Every statement
//! it is asked to run is appended to the shared [`Script`] log, `fetch` pops
//! pre-loaded result sets in FIFO order, and statements matching a registered
//! needle fail with the configured error.
//!
//! Transaction control is logged as `BEGIN <LEVEL>`, `COMMIT`, `ROLLBACK`,
//! `LOCK TABLE ...` and `CLOSE`, so tests can assert exact ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rowguard_core::{
    Backend, IsolationLevel, Record, RowGuardError, Session, SessionFactory, SqlValue,
    TableLockMode, Timestamp,
};
use tracing::warn;

/// Error injected when a statement matches a failure needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    LockUnavailable,
    Connection,
    Query,
}

impl ScriptedFailure {
    fn to_error(self, statement: &str) -> RowGuardError {
        match self {
            Self::LockUnavailable => RowGuardError::LockUnavailable {
                resource: statement.to_string(),
                source: None,
            },
            Self::Connection => RowGuardError::connection(format!("scripted failure: {statement}")),
            Self::Query => RowGuardError::Query {
                source: format!("scripted failure: {statement}").into(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    log: Vec<String>,
    rows: VecDeque<Vec<Record>>,
    failures: Vec<(String, ScriptedFailure)>,
    tables: Vec<String>,
    affected: u64,
}

/// Shared script: statement log, queued rows, and failure rules.
///
/// Cloning yields another handle to the same script, so a test can keep one
/// while the session is owned by a mapper.
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a result set for the next `fetch`.
    pub fn push_rows(&self, rows: Vec<Record>) -> &Self {
        self.lock().rows.push_back(rows);
        self
    }

    /// Make every statement containing `needle` fail.
    pub fn fail_on(&self, needle: &str, failure: ScriptedFailure) -> &Self {
        self.lock().failures.push((needle.to_string(), failure));
        self
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Tables reported by `table_exists`.
    pub fn add_table(&self, table: &str) -> &Self {
        self.lock().tables.push(table.to_string());
        self
    }

    /// Row count returned by every `execute`.
    pub fn set_affected(&self, affected: u64) -> &Self {
        self.lock().affected = affected;
        self
    }

    /// Every statement recorded so far.
    pub fn statements(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of recorded statements containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.lock().log.iter().filter(|s| s.contains(needle)).count()
    }

    /// Index of the first recorded statement containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lock().log.iter().position(|s| s.contains(needle))
    }

    /// Records `statement` and returns the scripted failure, if any.
    fn record(&self, statement: &str) -> Result<(), RowGuardError> {
        let mut state = self.lock();
        state.log.push(statement.to_string());
        match state
            .failures
            .iter()
            .find(|(needle, _)| statement.contains(needle.as_str()))
        {
            Some((_, failure)) => Err(failure.to_error(statement)),
            None => Ok(()),
        }
    }
}

/// A database-free session driven by a [`Script`].
pub struct ScriptedSession {
    backend: Backend,
    level: IsolationLevel,
    closed: bool,
    script: Script,
}

impl ScriptedSession {
    pub fn new(backend: Backend) -> Self {
        Self::with_script(backend, Script::new())
    }

    pub fn with_script(backend: Backend, script: Script) -> Self {
        Self {
            backend,
            level: IsolationLevel::NoLock,
            closed: false,
            script,
        }
    }

    /// Handle to this session's script.
    pub fn script(&self) -> Script {
        self.script.clone()
    }

    fn ensure_open(&self) -> Result<(), RowGuardError> {
        if self.closed {
            return Err(RowGuardError::connection("scripted session is closed"));
        }
        Ok(())
    }

    fn end_transaction(&mut self, statement: &str) -> Result<(), RowGuardError> {
        let result = self.script.record(statement);
        self.level = IsolationLevel::NoLock;
        result
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.level
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64, RowGuardError> {
        self.ensure_open()?;
        self.script.record(sql)?;
        Ok(self.script.lock().affected)
    }

    async fn fetch(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<Vec<Record>, RowGuardError> {
        self.ensure_open()?;
        self.script.record(sql)?;
        Ok(self.script.lock().rows.pop_front().unwrap_or_default())
    }

    async fn begin(&mut self, level: IsolationLevel) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "scripted session already holds {}",
                self.level
            )));
        }
        if !level.is_transaction() {
            return Ok(());
        }
        self.script.record(&format!("BEGIN {level}"))?;
        self.level = level;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if !self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(
                "no transaction to commit".to_string(),
            ));
        }
        self.end_transaction("COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if !self.level.is_transaction() {
            return Ok(());
        }
        self.end_transaction("ROLLBACK")
    }

    async fn close(&mut self) -> Result<(), RowGuardError> {
        if self.closed {
            return Ok(());
        }
        if self.level.is_transaction() {
            if let Err(e) = self.end_transaction("ROLLBACK") {
                warn!(error = %e, "rollback during close failed");
            }
        }
        if let Err(e) = self.script.record("CLOSE") {
            warn!(error = %e, "close failed");
        }
        self.closed = true;
        Ok(())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, RowGuardError> {
        self.ensure_open()?;
        Ok(self.script.lock().tables.iter().any(|t| t == table))
    }

    async fn current_time(&mut self) -> Result<Timestamp, RowGuardError> {
        self.ensure_open()?;
        Ok(Utc::now())
    }

    async fn lock_table(&mut self, table: &str, mode: TableLockMode) -> Result<(), RowGuardError> {
        self.ensure_open()?;
        if self.backend != Backend::Server {
            return Err(RowGuardError::Unsupported(format!(
                "table locks are not available on the {} backend (table `{table}`)",
                self.backend
            )));
        }
        if !self.level.is_transaction() {
            return Err(RowGuardError::TransactionState(format!(
                "LOCK TABLE {table} needs an open transaction"
            )));
        }
        self.script
            .record(&format!("LOCK TABLE {table} IN {mode} MODE NOWAIT"))
    }
}

/// Hands out [`ScriptedSession`]s sharing one [`Script`].
///
/// Each session opened is logged as `OPEN`, so the statements of successive
/// locking sessions read as `OPEN`, `BEGIN EXCLUSIVE`, ..., `CLOSE`.
#[derive(Debug, Clone)]
pub struct ScriptedFactory {
    backend: Backend,
    script: Script,
}

impl ScriptedFactory {
    pub fn new(backend: Backend) -> Self {
        Self::with_script(backend, Script::new())
    }

    pub fn with_script(backend: Backend, script: Script) -> Self {
        Self { backend, script }
    }

    pub fn script(&self) -> Script {
        self.script.clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn create_database_for_editing(&self) -> Result<Box<dyn Session>, RowGuardError> {
        self.script.record("OPEN")?;
        Ok(Box::new(ScriptedSession::with_script(
            self.backend,
            self.script.clone(),
        )))
    }
}
