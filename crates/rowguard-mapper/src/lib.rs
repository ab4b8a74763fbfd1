// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Record mappers and conflict strategies for rowguard.
//!
//! A [`RecordMapper`] owns one session, reads a set of rows for editing, and
//! protects them with a [`ConflictStrategy`]:
//!
//! - [`Optimistic`] detects changes made by others at save time.
//! - [`Pessimistic`] refuses a second editor up front through an editing flag
//!   ([`LockTableFlag`] or [`ColumnFlag`]).
//! - [`Physical`] holds PostgreSQL row or table locks for the whole edit.
//!
//! [`SingleRecordMapper`] narrows a mapper to exactly one row.

pub mod flag;
pub mod mapper;
pub mod query;
pub mod single;
pub mod strategy;

pub use flag::{ColumnFlag, EditingEntry, LockTableFlag, generate_owner};
pub use mapper::{EditState, RecordMapper};
pub use query::FetchTarget;
pub use single::SingleRecordMapper;
pub use strategy::{ConflictStrategy, Optimistic, Pessimistic, Physical, StrategyKind};
