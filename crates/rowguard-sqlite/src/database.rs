// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row conversion and error classification for the SQLite driver.

use rowguard_core::{Record, RowGuardError, SqlValue};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{ErrorCode, params_from_iter};

/// Convert a tokio-rusqlite error into `RowGuardError::Connection`.
///
/// Statement errors are returned inside the closure result and classified by
/// [`map_sqlite_err`]; what reaches this function is the background thread
/// itself failing.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> RowGuardError {
    RowGuardError::Connection {
        message: "sqlite connection thread is unavailable".to_string(),
        source: Some(Box::new(e)),
    }
}

/// Classify a rusqlite error.
///
/// `SQLITE_BUSY` and `SQLITE_LOCKED` mean another connection holds the file
/// lock; with a zero busy timeout that is the NOWAIT outcome.
pub(crate) fn map_sqlite_err(e: rusqlite::Error, resource: &str) -> RowGuardError {
    let code = e.sqlite_error_code();
    match code {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            RowGuardError::LockUnavailable {
                resource: resource.to_string(),
                source: Some(Box::new(e)),
            }
        }
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::PermissionDenied) => {
            RowGuardError::Connection {
                message: format!("cannot open sqlite database {resource}"),
                source: Some(Box::new(e)),
            }
        }
        _ => RowGuardError::Query {
            source: Box::new(e),
        },
    }
}

pub(crate) fn to_sqlite_values(params: &[SqlValue]) -> Vec<Value> {
    params
        .iter()
        .map(|param| match param {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(v) => Value::Integer(*v),
            SqlValue::Real(v) => Value::Real(*v),
            SqlValue::Text(v) => Value::Text(v.clone()),
        })
        .collect()
}

/// Renders one column value the way records carry it. Blobs become hex.
fn render_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(v.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Some(hex::encode(bytes)),
    }
}

/// Runs a query and collects every row, preserving column order.
pub(crate) fn query_records(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Record>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut fields = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            fields.push((column.clone(), render_value(row.get_ref(index)?)));
        }
        records.push(Record::from_pairs(fields));
    }
    Ok(records)
}
