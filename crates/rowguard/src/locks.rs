// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rowguard locks` command implementation.
//!
//! Operator access to the lock table behind the pessimistic strategy. The
//! main use is clearing a flag stranded by an editor that crashed before
//! closing its mapper.

use std::sync::Arc;

use rowguard_config::model::RowGuardConfig;
use rowguard_core::{RowGuardError, Session, SessionFactory};
use rowguard_mapper::{EditingEntry, LockTableFlag, Pessimistic};
use rowguard_sqlite::IsolationGate;
use tracing::{info, warn};

use crate::backend::{self, BackendArg};

/// Owner recorded by flags this command would take; release never takes one.
const CLI_OWNER: &str = "rowguard-cli";

pub async fn init(
    config: &RowGuardConfig,
    backend: BackendArg,
    gate: Arc<IsolationGate>,
) -> Result<(), RowGuardError> {
    let factory = backend::factory(config, backend, gate)?;
    let created = ensure_lock_table(factory.as_ref(), &config.editing.lock_table).await?;
    if created {
        println!("created lock table `{}`", config.editing.lock_table);
    } else {
        println!("lock table `{}` already exists", config.editing.lock_table);
    }
    Ok(())
}

pub async fn list(
    config: &RowGuardConfig,
    backend: BackendArg,
    gate: Arc<IsolationGate>,
) -> Result<(), RowGuardError> {
    let factory = backend::factory(config, backend, gate)?;
    let entries = list_entries(factory.as_ref(), &config.editing.lock_table).await?;
    if entries.is_empty() {
        println!("no entities are being edited");
        return Ok(());
    }
    println!("{:<24} {:<24} {:<44} LOCKED AT", "TABLE", "IDENTIFIER", "OWNER");
    for entry in &entries {
        println!(
            "{:<24} {:<24} {:<44} {}",
            entry.table, entry.identifier, entry.owner, entry.locked_at
        );
    }
    Ok(())
}

pub async fn release(
    config: &RowGuardConfig,
    backend: BackendArg,
    gate: Arc<IsolationGate>,
    table: &str,
    identifier: &str,
) -> Result<(), RowGuardError> {
    let factory = backend::factory(config, backend, gate)?;
    release_entry(factory, &config.editing.lock_table, table, identifier).await?;
    println!("released {table}/{identifier}");
    Ok(())
}

async fn ensure_lock_table(
    factory: &dyn SessionFactory,
    lock_table: &str,
) -> Result<bool, RowGuardError> {
    let mut session = factory.create_database_for_editing().await?;
    let created = LockTableFlag::ensure_schema(session.as_mut(), lock_table).await;
    close_quietly(session.as_mut()).await;
    created
}

async fn list_entries(
    factory: &dyn SessionFactory,
    lock_table: &str,
) -> Result<Vec<EditingEntry>, RowGuardError> {
    let mut session = factory.create_database_for_editing().await?;
    let entries = read_entries(session.as_mut(), lock_table).await;
    close_quietly(session.as_mut()).await;
    entries
}

async fn read_entries(
    session: &mut dyn Session,
    lock_table: &str,
) -> Result<Vec<EditingEntry>, RowGuardError> {
    if !session.table_exists(lock_table).await? {
        return Ok(Vec::new());
    }
    LockTableFlag::list(session, lock_table).await
}

/// The command's result is what matters; a failed close is only logged.
async fn close_quietly(session: &mut dyn Session) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "closing command session failed");
    }
}

async fn release_entry(
    factory: Arc<dyn SessionFactory>,
    lock_table: &str,
    table: &str,
    identifier: &str,
) -> Result<(), RowGuardError> {
    let flag = LockTableFlag::new(lock_table, table, identifier, CLI_OWNER)?;
    Pessimistic::from_shared(Arc::new(flag), factory)
        .forcibly_release()
        .await?;
    info!(table, identifier, "editing flag released from the command line");
    Ok(())
}
