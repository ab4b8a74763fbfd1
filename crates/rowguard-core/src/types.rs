// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row, value, and isolation types shared by every backend.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RowGuardError;

/// Point in time used for last-update comparisons.
pub type Timestamp = DateTime<Utc>;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One row snapshot: an ordered mapping from column name to string value.
///
/// Column order follows the result set. `None` is SQL `NULL`. Lookups try an
/// exact match first and then an ASCII case-insensitive one, since SQLite
/// preserves declared case and PostgreSQL folds to lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Option<String>)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record with the given columns, all `NULL`.
    pub fn blank<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: columns.into_iter().map(|c| (c.into(), None)).collect(),
        }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: Into<String>,
    {
        Self {
            fields: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(name, _)| name == column)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|(name, _)| name.eq_ignore_ascii_case(column))
            })
    }

    /// Value of `column`; `None` when the column is absent or `NULL`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.position(column)
            .and_then(|i| self.fields[i].1.as_deref())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Replaces the value of an existing column or appends a new one.
    pub fn set(&mut self, column: &str, value: Option<String>) {
        match self.position(column) {
            Some(i) => self.fields[i].1 = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which kind of engine a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// Embedded single-writer file database (SQLite).
    File,
    /// Server database with native row and table locks (PostgreSQL).
    Server,
}

impl Backend {
    /// Positional placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::File => format!("?{index}"),
            Self::Server => format!("${index}"),
        }
    }
}

/// Transaction isolation requested through `Session::begin`.
///
/// The names follow SQLite's `BEGIN` modes. `NoLock` means autocommit, with no
/// transaction open. The server backend maps the other levels onto its own
/// isolation levels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum IsolationLevel {
    #[default]
    NoLock,
    Deferred,
    Immediate,
    Exclusive,
}

impl IsolationLevel {
    pub fn is_transaction(self) -> bool {
        self != Self::NoLock
    }
}

/// Table-wide lock strength on the server backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TableLockMode {
    /// `ACCESS EXCLUSIVE`: blocks every other access, reads included.
    #[strum(serialize = "ACCESS EXCLUSIVE")]
    AccessExclusive,
    /// `EXCLUSIVE`: other sessions may still read.
    #[strum(serialize = "EXCLUSIVE")]
    Exclusive,
}

/// Parses the timestamp renderings produced by both backends.
///
/// Accepts RFC 3339 (`2026-03-01T10:00:00.000Z`), PostgreSQL text output
/// (`2026-03-01 10:00:00.123+00`), SQLite `CURRENT_TIMESTAMP`
/// (`2026-03-01 10:00:00`, read as UTC), and bare dates.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Rejects anything but `[A-Za-z_][A-Za-z0-9_]*`, optionally schema-qualified.
///
/// Table and column names are spliced into SQL text, so they never come from
/// bound parameters.
pub fn validate_identifier(name: &str) -> Result<&str, RowGuardError> {
    let valid = !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(name)
    } else {
        Err(RowGuardError::InvalidIdentifier(name.to_string()))
    }
}

/// Validates an `ORDER BY` term: an identifier with optional `ASC`/`DESC`.
pub fn validate_order_term(term: &str) -> Result<&str, RowGuardError> {
    let mut parts = term.split_whitespace();
    let column = parts
        .next()
        .ok_or_else(|| RowGuardError::InvalidIdentifier(term.to_string()))?;
    validate_identifier(column).map_err(|_| RowGuardError::InvalidIdentifier(term.to_string()))?;
    match (parts.next(), parts.next()) {
        (None, None) => Ok(term),
        (Some(dir), None)
            if dir.eq_ignore_ascii_case("asc") || dir.eq_ignore_ascii_case("desc") =>
        {
            Ok(term)
        }
        _ => Err(RowGuardError::InvalidIdentifier(term.to_string())),
    }
}
