// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Editing flag storage.
//!
//! [`LockTableFlag`] keeps one row per checked-out entity in a side table and
//! works for any entity table. [`ColumnFlag`] stores the holder in a column of
//! the entity row itself. Any set flag means the entity is checked out,
//! whoever holds it: two mappers sharing an owner label still exclude each
//! other. The owner is recorded for `rowguard locks list` only.
//!
//! The SQL is plain enough to run on both backends; placeholders follow the
//! session's dialect.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rowguard_config::model::EditingConfig;
use rowguard_core::{
    Backend, EditingFlag, Record, RowGuardError, Session, SqlValue, TableLockMode,
    validate_identifier,
};
use tracing::debug;

/// Generates an owner label for editors that were not given one.
pub fn generate_owner() -> String {
    format!("editor-{}", uuid::Uuid::new_v4())
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One row of the lock table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditingEntry {
    pub table: String,
    pub identifier: String,
    pub owner: String,
    pub locked_at: String,
}

impl EditingEntry {
    fn from_record(record: &Record) -> Result<Self, RowGuardError> {
        let field = |column: &str| {
            record
                .get(column)
                .map(str::to_string)
                .ok_or_else(|| RowGuardError::Decode {
                    column: column.to_string(),
                    detail: "unexpected NULL in lock table".to_string(),
                })
        };
        Ok(Self {
            table: field("table_name")?,
            identifier: field("identifier")?,
            owner: field("owner")?,
            locked_at: field("locked_at")?,
        })
    }
}

/// Editing flag stored as a row of a dedicated lock table.
#[derive(Debug, Clone)]
pub struct LockTableFlag {
    lock_table: String,
    table: String,
    identifier: String,
    owner: String,
}

impl LockTableFlag {
    pub fn new(
        lock_table: &str,
        table: &str,
        identifier: impl Into<String>,
        owner: impl Into<String>,
    ) -> Result<Self, RowGuardError> {
        Ok(Self {
            lock_table: validate_identifier(lock_table)?.to_string(),
            table: validate_identifier(table)?.to_string(),
            identifier: identifier.into(),
            owner: owner.into(),
        })
    }

    /// Uses `[editing]`: its lock table, and its owner or a generated one.
    pub fn from_config(
        config: &EditingConfig,
        table: &str,
        identifier: impl Into<String>,
    ) -> Result<Self, RowGuardError> {
        let owner = config.owner.clone().unwrap_or_else(generate_owner);
        Self::new(&config.lock_table, table, identifier, owner)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Creates the lock table if it is missing. Returns whether it was created.
    pub async fn ensure_schema(
        session: &mut dyn Session,
        lock_table: &str,
    ) -> Result<bool, RowGuardError> {
        let lock_table = validate_identifier(lock_table)?;
        if session.table_exists(lock_table).await? {
            return Ok(false);
        }
        session
            .execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {lock_table} (
                        table_name TEXT NOT NULL,
                        identifier TEXT NOT NULL,
                        owner TEXT NOT NULL,
                        locked_at TEXT NOT NULL,
                        PRIMARY KEY (table_name, identifier)
                    )"
                ),
                &[],
            )
            .await?;
        debug!(lock_table, "lock table created");
        Ok(true)
    }

    /// Every flag currently set, oldest first.
    pub async fn list(
        session: &mut dyn Session,
        lock_table: &str,
    ) -> Result<Vec<EditingEntry>, RowGuardError> {
        let lock_table = validate_identifier(lock_table)?;
        let rows = session
            .fetch(
                &format!(
                    "SELECT table_name, identifier, owner, locked_at FROM {lock_table} \
                     ORDER BY locked_at, table_name, identifier"
                ),
                &[],
            )
            .await?;
        rows.iter().map(EditingEntry::from_record).collect()
    }

    fn key_clause(&self, session: &dyn Session) -> String {
        let backend = session.backend();
        format!(
            "table_name = {} AND identifier = {}",
            backend.placeholder(1),
            backend.placeholder(2)
        )
    }

    fn key_params(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.table.as_str()),
            SqlValue::from(self.identifier.as_str()),
        ]
    }
}

#[async_trait]
impl EditingFlag for LockTableFlag {
    fn table(&self) -> &str {
        &self.table
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    /// On the server two locking sessions would otherwise both see no row,
    /// and the second insert would wait on the first. The table lock admits
    /// plain reads, so `list` keeps working.
    async fn lock_for_update(&self, session: &mut dyn Session) -> Result<(), RowGuardError> {
        if session.backend() == Backend::Server {
            session
                .lock_table(&self.lock_table, TableLockMode::Exclusive)
                .await?;
        }
        Ok(())
    }

    async fn is_editing_by_another(
        &self,
        session: &mut dyn Session,
    ) -> Result<bool, RowGuardError> {
        let sql = format!(
            "SELECT owner FROM {} WHERE {}",
            self.lock_table,
            self.key_clause(session)
        );
        let rows = session.fetch(&sql, &self.key_params()).await?;
        if let Some(holder) = rows.first().and_then(|row| row.get("owner")) {
            debug!(
                table = %self.table,
                identifier = %self.identifier,
                holder,
                "entity already checked out"
            );
            return Ok(true);
        }
        Ok(false)
    }

    async fn update_to_editing(&self, session: &mut dyn Session) -> Result<(), RowGuardError> {
        let backend = session.backend();
        let sql = format!(
            "INSERT INTO {} (table_name, identifier, owner, locked_at) VALUES ({}, {}, {}, {}) \
             ON CONFLICT (table_name, identifier) DO UPDATE SET owner = excluded.owner, \
             locked_at = excluded.locked_at",
            self.lock_table,
            backend.placeholder(1),
            backend.placeholder(2),
            backend.placeholder(3),
            backend.placeholder(4),
        );
        let mut params = self.key_params();
        params.push(SqlValue::from(self.owner.as_str()));
        params.push(SqlValue::from(now_text()));
        session.execute(&sql, &params).await?;
        Ok(())
    }

    async fn update_to_editing_finish(
        &self,
        session: &mut dyn Session,
    ) -> Result<(), RowGuardError> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.lock_table,
            self.key_clause(session)
        );
        session.execute(&sql, &self.key_params()).await?;
        Ok(())
    }
}

/// Editing flag stored in a nullable column of the entity row.
///
/// `NULL` or an empty string means nobody is editing. The entity must exist;
/// a missing row is `DataNotFound`.
#[derive(Debug, Clone)]
pub struct ColumnFlag {
    table: String,
    id_column: String,
    key: SqlValue,
    identifier: String,
    flag_column: String,
    owner: String,
}

impl ColumnFlag {
    pub fn new(
        table: &str,
        id_column: &str,
        key: impl Into<SqlValue>,
        flag_column: &str,
        owner: impl Into<String>,
    ) -> Result<Self, RowGuardError> {
        let key = key.into();
        let identifier = match &key {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::Real(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
        };
        Ok(Self {
            table: validate_identifier(table)?.to_string(),
            id_column: validate_identifier(id_column)?.to_string(),
            key,
            identifier,
            flag_column: validate_identifier(flag_column)?.to_string(),
            owner: owner.into(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn not_found(&self) -> RowGuardError {
        RowGuardError::DataNotFound {
            table: self.table.clone(),
        }
    }

    async fn set_flag(
        &self,
        session: &mut dyn Session,
        value: SqlValue,
    ) -> Result<u64, RowGuardError> {
        let backend = session.backend();
        let sql = format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.table,
            self.flag_column,
            backend.placeholder(1),
            self.id_column,
            backend.placeholder(2)
        );
        session.execute(&sql, &[value, self.key.clone()]).await
    }
}

#[async_trait]
impl EditingFlag for ColumnFlag {
    fn table(&self) -> &str {
        &self.table
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn lock_for_update(&self, session: &mut dyn Session) -> Result<(), RowGuardError> {
        if session.backend() != Backend::Server {
            return Ok(());
        }
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 FOR UPDATE NOWAIT",
            self.id_column, self.table, self.id_column
        );
        session.fetch(&sql, &[self.key.clone()]).await?;
        Ok(())
    }

    async fn is_editing_by_another(
        &self,
        session: &mut dyn Session,
    ) -> Result<bool, RowGuardError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.flag_column,
            self.table,
            self.id_column,
            session.backend().placeholder(1)
        );
        let rows = session.fetch(&sql, &[self.key.clone()]).await?;
        let Some(row) = rows.first() else {
            return Err(self.not_found());
        };
        Ok(row
            .get(&self.flag_column)
            .is_some_and(|holder| !holder.is_empty()))
    }

    async fn update_to_editing(&self, session: &mut dyn Session) -> Result<(), RowGuardError> {
        if self.set_flag(session, SqlValue::from(self.owner.as_str())).await? == 0 {
            return Err(self.not_found());
        }
        Ok(())
    }

    async fn update_to_editing_finish(
        &self,
        session: &mut dyn Session,
    ) -> Result<(), RowGuardError> {
        self.set_flag(session, SqlValue::Null).await?;
        Ok(())
    }
}
