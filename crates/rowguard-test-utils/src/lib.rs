// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for rowguard integration tests.
//!
//! # Components
//!
//! - [`ScriptedSession`] - In-memory session that records every statement and
//!   replays pre-loaded rows and failures
//! - [`ScriptedFactory`] - Session factory handing out scripted sessions that
//!   share one script
//! - [`MemoryFlag`] - Editing flag kept in process memory
//! - [`SqliteFixture`] - Temp SQLite database with a seeded `items` table

pub mod fixture;
pub mod memory_flag;
pub mod scripted;

pub use fixture::SqliteFixture;
pub use memory_flag::{FlagBoard, MemoryFlag};
pub use scripted::{Script, ScriptedFactory, ScriptedFailure, ScriptedSession};
