// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp SQLite database for integration tests.

use std::sync::Arc;

use rowguard_core::{RowGuardError, Session, SqlValue};
use rowguard_sqlite::{FileSession, IsolationGate, SqliteConnector};
use tempfile::TempDir;

/// A database file in a temp directory with one process gate.
///
/// `seed_items` creates `items (id, name, qty, updated_at, editing_owner)`.
/// The directory is removed when the fixture is dropped.
pub struct SqliteFixture {
    pub connector: SqliteConnector,
    pub gate: Arc<IsolationGate>,
    _dir: TempDir,
}

impl SqliteFixture {
    pub fn new() -> Result<Self, RowGuardError> {
        let dir = tempfile::tempdir().map_err(|e| RowGuardError::Internal(e.to_string()))?;
        let path = dir.path().join("rowguard-test.db");
        let gate = Arc::new(IsolationGate::new());
        let connector = SqliteConnector::new(path.to_string_lossy().into_owned(), gate.clone());
        Ok(Self {
            connector,
            gate,
            _dir: dir,
        })
    }

    pub async fn open(&self) -> Result<FileSession, RowGuardError> {
        self.connector.open().await
    }

    /// Boxed session, the form mappers take.
    pub async fn session(&self) -> Result<Box<dyn Session>, RowGuardError> {
        Ok(Box::new(self.open().await?))
    }

    /// Creates `items` and inserts `(id, name, qty)` rows stamped with a
    /// fixed `updated_at`.
    pub async fn seed_items(&self, rows: &[(i64, &str, i64)]) -> Result<(), RowGuardError> {
        let mut session = self.open().await?;
        session
            .execute(
                "CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    qty INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    editing_owner TEXT
                )",
                &[],
            )
            .await?;
        for (id, name, qty) in rows {
            session
                .execute(
                    "INSERT INTO items (id, name, qty, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    &[
                        SqlValue::from(*id),
                        SqlValue::from(*name),
                        SqlValue::from(*qty),
                        SqlValue::from("2026-01-01T00:00:00.000Z"),
                    ],
                )
                .await?;
        }
        session.close().await
    }

    /// Sets `updated_at` on one row from an independent session.
    pub async fn touch_item(&self, id: i64, updated_at: &str) -> Result<u64, RowGuardError> {
        let mut session = self.open().await?;
        let changed = session
            .execute(
                "UPDATE items SET updated_at = ?1 WHERE id = ?2",
                &[SqlValue::from(updated_at), SqlValue::from(id)],
            )
            .await?;
        session.close().await?;
        Ok(changed)
    }
}
