// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the mappers and the backends.

pub mod editing;
pub mod session;
pub mod where_set;

pub use editing::EditingFlag;
pub use session::{Session, SessionFactory};
pub use where_set::{RawWhere, WhereSet};
