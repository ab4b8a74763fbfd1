// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite ("file") backend for rowguard.
//!
//! Each [`FileSession`] owns one connection served by tokio-rusqlite's
//! background thread. Sessions created from one [`SqliteConnector`] share an
//! [`IsolationGate`], so at most one of them is inside a transaction at any
//! moment.

pub mod connector;
mod database;
pub mod gate;
pub mod session;

pub use connector::SqliteConnector;
pub use gate::{GateToken, IsolationGate};
pub use session::FileSession;
