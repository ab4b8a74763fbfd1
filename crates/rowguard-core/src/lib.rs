// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for rowguard.
//!
//! Defines the session abstraction, the editing-flag hooks used by the
//! pessimistic strategy, row and value types, and the error type shared by
//! every backend and mapper crate.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RowGuardError;
pub use traits::{EditingFlag, RawWhere, Session, SessionFactory, WhereSet};
pub use types::{
    Backend, IsolationLevel, Record, SqlValue, TableLockMode, Timestamp, parse_timestamp,
    validate_identifier, validate_order_term,
};
