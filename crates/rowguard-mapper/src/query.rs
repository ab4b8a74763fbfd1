// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! What a mapper fetches, and the `SELECT` it turns into.

use rowguard_core::{RowGuardError, SqlValue, WhereSet, validate_identifier, validate_order_term};

/// Table, optional filter, and ordering of a mapper's rows.
#[derive(Clone, Copy)]
pub struct FetchTarget<'a> {
    pub table: &'a str,
    pub filter: Option<&'a dyn WhereSet>,
    pub order_by: &'a [String],
}

impl<'a> FetchTarget<'a> {
    pub fn new(table: &'a str, filter: Option<&'a dyn WhereSet>, order_by: &'a [String]) -> Self {
        Self {
            table,
            filter,
            order_by,
        }
    }

    /// `SELECT * FROM table [WHERE ...] [ORDER BY ...]` and its parameters.
    pub fn select(&self) -> Result<(String, Vec<SqlValue>), RowGuardError> {
        let mut sql = format!("SELECT * FROM {}", validate_identifier(self.table)?);
        let mut params = Vec::new();
        if let Some(filter) = self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.build_placeholder_clause());
            params = filter.build_parameters();
        }
        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|term| validate_order_term(term))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        Ok((sql, params))
    }
}
