// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for rowguard.

use thiserror::Error;

/// The error type shared by sessions, mappers, and conflict strategies.
///
/// Contention outcomes (`LockUnavailable`, `EditingConflict`,
/// `OptimisticConflict`) are ordinary results of concurrent editing and are
/// expected to be shown to the user as "record is being edited elsewhere".
/// Use [`RowGuardError::is_contention`] to branch on them.
#[derive(Debug, Error)]
pub enum RowGuardError {
    /// The backend could not be reached, opened, or has already been closed.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A NOWAIT lock request (row, table, or file write lock) was denied.
    #[error("lock unavailable on {resource}")]
    LockUnavailable {
        resource: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The pessimistic editing flag is already held by another editor.
    #[error("{table}/{identifier} is being edited by another session")]
    EditingConflict { table: String, identifier: String },

    /// The row changed (or vanished) since it was fetched for editing.
    #[error("{table}/{identifier} was modified after it was fetched for editing")]
    OptimisticConflict { table: String, identifier: String },

    /// The isolation gate was violated or a check ran outside a transaction.
    #[error("transaction state error: {0}")]
    TransactionState(String),

    /// A single-record fetch found no row.
    #[error("no record found in {table}")]
    DataNotFound { table: String },

    /// A single-record fetch found more than one row.
    #[error("expected one record in {table}, found {count}")]
    AmbiguousRecord { table: String, count: usize },

    /// A genuine SQL failure (syntax, constraint, type mismatch).
    #[error("query failed: {source}")]
    Query {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A column value could not be rendered as a record value.
    #[error("cannot decode column `{column}`: {detail}")]
    Decode { column: String, detail: String },

    /// A table or column name failed identifier validation.
    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),

    /// The operation is not available on this backend or strategy.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RowGuardError {
    /// Builds a `Connection` error without an underlying cause.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for the expected outcomes of contended editing.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::LockUnavailable { .. }
                | Self::EditingConflict { .. }
                | Self::OptimisticConflict { .. }
        )
    }
}
