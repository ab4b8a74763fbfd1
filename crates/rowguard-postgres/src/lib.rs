// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PostgreSQL ("server") backend for rowguard.
//!
//! Sessions hold one dedicated connection each, never a pooled one: row and
//! table locks belong to the connection that took them and must outlive any
//! single statement.

pub mod connector;
pub mod decode;
pub mod error;
pub mod session;

pub use connector::PostgresConnector;
pub use error::{LOCK_NOT_AVAILABLE, map_sqlx_err};
pub use session::{ServerSession, begin_statement, lock_table_statement};
