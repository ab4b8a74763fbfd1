// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Editing flag kept in process memory.
//!
//! Each hook also runs a marker statement (`FLAG CHECK`, `FLAG SET`,
//! `FLAG CLEAR`) through the session it was handed, so a scripted session's
//! log shows where in the locking transaction the hook ran. Use it with
//! [`ScriptedSession`](crate::ScriptedSession) only; the markers are not SQL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rowguard_core::{EditingFlag, RowGuardError, Session};

/// Holders of every flag, keyed by `(table, identifier)`.
#[derive(Debug, Clone, Default)]
pub struct FlagBoard {
    holders: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl FlagBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), String>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current holder of the flag on `table/identifier`.
    pub fn holder(&self, table: &str, identifier: &str) -> Option<String> {
        self.lock()
            .get(&(table.to_string(), identifier.to_string()))
            .cloned()
    }
}

/// One editor's view of a flag on the shared [`FlagBoard`].
#[derive(Debug, Clone)]
pub struct MemoryFlag {
    table: String,
    identifier: String,
    owner: String,
    board: FlagBoard,
}

impl MemoryFlag {
    pub fn new(board: &FlagBoard, table: &str, identifier: &str, owner: &str) -> Self {
        Self {
            table: table.to_string(),
            identifier: identifier.to_string(),
            owner: owner.to_string(),
            board: board.clone(),
        }
    }

    fn key(&self) -> (String, String) {
        (self.table.clone(), self.identifier.clone())
    }

    fn marker(&self, step: &str) -> String {
        format!("FLAG {step} {}/{}", self.table, self.identifier)
    }
}

#[async_trait]
impl EditingFlag for MemoryFlag {
    fn table(&self) -> &str {
        &self.table
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn is_editing_by_another(
        &self,
        session: &mut dyn Session,
    ) -> Result<bool, RowGuardError> {
        session.execute(&self.marker("CHECK"), &[]).await?;
        Ok(self
            .board
            .lock()
            .contains_key(&self.key()))
    }

    async fn update_to_editing(&self, session: &mut dyn Session) -> Result<(), RowGuardError> {
        session.execute(&self.marker("SET"), &[]).await?;
        self.board.lock().insert(self.key(), self.owner.clone());
        Ok(())
    }

    async fn update_to_editing_finish(
        &self,
        session: &mut dyn Session,
    ) -> Result<(), RowGuardError> {
        session.execute(&self.marker("CLEAR"), &[]).await?;
        self.board.lock().remove(&self.key());
        Ok(())
    }
}
