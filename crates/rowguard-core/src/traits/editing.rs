// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage hooks for the pessimistic "editing" flag.

use async_trait::async_trait;

use crate::error::RowGuardError;
use crate::traits::session::Session;

/// Reads and writes the flag recording which entity is checked out.
///
/// Every hook receives the locking session, which is already inside an
/// `EXCLUSIVE` transaction. The hooks must only run statements; committing is
/// the caller's job, which is what keeps check-then-set atomic.
#[async_trait]
pub trait EditingFlag: Send + Sync {
    /// Table the flagged entity lives in.
    fn table(&self) -> &str;

    /// Identifier of the entity being checked out.
    fn identifier(&self) -> &str;

    /// Takes the lock that keeps check-then-set atomic against other locking
    /// sessions. Must fail rather than wait.
    ///
    /// Runs first in every locking transaction. The default does nothing: on
    /// the file backend the `EXCLUSIVE` transaction already serializes
    /// locking sessions.
    async fn lock_for_update(&self, _session: &mut dyn Session) -> Result<(), RowGuardError> {
        Ok(())
    }

    /// True when the flag is set, whoever set it.
    async fn is_editing_by_another(&self, session: &mut dyn Session)
    -> Result<bool, RowGuardError>;

    /// Marks the entity as being edited by this editor.
    async fn update_to_editing(&self, session: &mut dyn Session) -> Result<(), RowGuardError>;

    /// Clears the flag. Does not verify who holds it.
    async fn update_to_editing_finish(
        &self,
        session: &mut dyn Session,
    ) -> Result<(), RowGuardError>;
}
