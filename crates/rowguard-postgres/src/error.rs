// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! sqlx error classification.

use rowguard_core::RowGuardError;

/// SQLSTATE raised when a NOWAIT row or table lock cannot be granted.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE raised when a SERIALIZABLE transaction lost a race.
pub const SERIALIZATION_FAILURE: &str = "40001";

pub const DEADLOCK_DETECTED: &str = "40P01";

/// Whether a SQLSTATE means another session got there first.
pub fn is_contention_code(code: &str) -> bool {
    matches!(
        code,
        LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    LockUnavailable,
    Connection,
    Query,
}

fn classify(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::Database(db) if db.code().is_some_and(|code| is_contention_code(&code)) => {
            ErrorClass::LockUnavailable
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorClass::Connection,
        _ => ErrorClass::Query,
    }
}

/// Convert a sqlx error into a `RowGuardError`.
///
/// `resource` names what was being locked or reached and ends up in the
/// message of `LockUnavailable` and `Connection` errors.
pub fn map_sqlx_err(err: sqlx::Error, resource: &str) -> RowGuardError {
    match classify(&err) {
        ErrorClass::LockUnavailable => RowGuardError::LockUnavailable {
            resource: resource.to_string(),
            source: Some(Box::new(err)),
        },
        ErrorClass::Connection => RowGuardError::Connection {
            message: format!("postgres connection to {resource} failed"),
            source: Some(Box::new(err)),
        },
        ErrorClass::Query => RowGuardError::Query {
            source: Box::new(err),
        },
    }
}
