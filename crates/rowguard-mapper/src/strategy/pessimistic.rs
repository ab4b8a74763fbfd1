// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pessimistic check-out through an application-level editing flag.

use std::sync::Arc;

use async_trait::async_trait;
use rowguard_core::{EditingFlag, IsolationLevel, RowGuardError, Session, SessionFactory};
use tracing::{debug, info, warn};

use super::{ConflictStrategy, StrategyKind};
use crate::query::FetchTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagStep {
    Acquire,
    Clear,
}

/// Marks an entity as "being edited" so that other editors are refused up
/// front instead of colliding at save time.
///
/// The flag is read and written through a short-lived locking session opened
/// from the factory, inside an `EXCLUSIVE` transaction, so check-then-set is
/// atomic across editors. The mapper's own session takes no part and stays
/// in autocommit mode for the whole edit.
///
/// The flag outlives the locking session: if the editing process dies the flag
/// stays set until someone calls [`Pessimistic::forcibly_release`].
#[derive(Clone)]
pub struct Pessimistic {
    flag: Arc<dyn EditingFlag>,
    factory: Arc<dyn SessionFactory>,
}

impl Pessimistic {
    pub fn new(flag: impl EditingFlag + 'static, factory: impl SessionFactory + 'static) -> Self {
        Self::from_shared(Arc::new(flag), Arc::new(factory))
    }

    pub fn from_shared(flag: Arc<dyn EditingFlag>, factory: Arc<dyn SessionFactory>) -> Self {
        Self { flag, factory }
    }

    pub fn flag(&self) -> &dyn EditingFlag {
        self.flag.as_ref()
    }

    /// Clears the flag whoever holds it.
    ///
    /// There is no ownership check: a live editor that still believes it holds
    /// the flag keeps editing, and its own close will later clear whatever flag
    /// is present then, including one taken by a newer editor.
    pub async fn forcibly_release(&self) -> Result<(), RowGuardError> {
        warn!(
            table = self.flag.table(),
            identifier = self.flag.identifier(),
            "forcibly clearing editing flag"
        );
        self.with_locking_session(FlagStep::Clear).await
    }

    async fn with_locking_session(&self, step: FlagStep) -> Result<(), RowGuardError> {
        let mut locking = self.factory.create_database_for_editing().await?;
        let outcome = self.run_step(locking.as_mut(), step).await;
        // Close rolls back whatever the failed step left open.
        if let Err(e) = locking.close().await {
            warn!(error = %e, "closing locking session failed");
        }
        outcome
    }

    async fn run_step(&self, locking: &mut dyn Session, step: FlagStep) -> Result<(), RowGuardError> {
        locking.begin(IsolationLevel::Exclusive).await?;
        self.flag.lock_for_update(locking).await?;
        match step {
            FlagStep::Acquire => {
                if self.flag.is_editing_by_another(locking).await? {
                    debug!(
                        table = self.flag.table(),
                        identifier = self.flag.identifier(),
                        "editing flag held by another editor"
                    );
                    return Err(RowGuardError::EditingConflict {
                        table: self.flag.table().to_string(),
                        identifier: self.flag.identifier().to_string(),
                    });
                }
                self.flag.update_to_editing(locking).await?;
            }
            FlagStep::Clear => self.flag.update_to_editing_finish(locking).await?,
        }
        locking.commit().await
    }
}

#[async_trait]
impl ConflictStrategy for Pessimistic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pessimistic
    }

    async fn prepare(
        &self,
        _session: &mut dyn Session,
        _target: &FetchTarget<'_>,
    ) -> Result<(), RowGuardError> {
        self.with_locking_session(FlagStep::Acquire).await?;
        info!(
            table = self.flag.table(),
            identifier = self.flag.identifier(),
            "editing flag acquired"
        );
        Ok(())
    }

    async fn release(&self) -> Result<(), RowGuardError> {
        self.with_locking_session(FlagStep::Clear).await?;
        info!(
            table = self.flag.table(),
            identifier = self.flag.identifier(),
            "editing flag released"
        );
        Ok(())
    }
}
