// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row filter produced by the statement builder.

use crate::types::SqlValue;

/// A filter clause with its bound parameters.
///
/// The clause uses the placeholder style of the session it will run on
/// (`?1` for SQLite, `$1` for PostgreSQL). Mappers splice it after `WHERE`
/// verbatim and never inspect it.
pub trait WhereSet: Send + Sync {
    fn build_placeholder_clause(&self) -> String;

    fn build_parameters(&self) -> Vec<SqlValue>;
}

/// A pre-built clause and parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawWhere {
    clause: String,
    params: Vec<SqlValue>,
}

impl RawWhere {
    pub fn new(clause: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }
}

impl WhereSet for RawWhere {
    fn build_placeholder_clause(&self) -> String {
        self.clause.clone()
    }

    fn build_parameters(&self) -> Vec<SqlValue> {
        self.params.clone()
    }
}
