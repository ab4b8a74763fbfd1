// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend selection for the subcommands.

use std::sync::Arc;

use clap::ValueEnum;
use rowguard_config::model::RowGuardConfig;
use rowguard_core::{RowGuardError, Session, SessionFactory};
use rowguard_postgres::PostgresConnector;
use rowguard_sqlite::{IsolationGate, SqliteConnector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// The SQLite database at `[sqlite] database_path`.
    File,
    /// The PostgreSQL server at `[postgres] url`.
    Server,
}

/// Connector for the chosen backend.
pub fn factory(
    config: &RowGuardConfig,
    backend: BackendArg,
    gate: Arc<IsolationGate>,
) -> Result<Arc<dyn SessionFactory>, RowGuardError> {
    match backend {
        BackendArg::File => Ok(Arc::new(SqliteConnector::from_config(&config.sqlite, gate))),
        BackendArg::Server => {
            let connector = PostgresConnector::from_config(&config.postgres)?.ok_or_else(|| {
                RowGuardError::Config("[postgres] url is not set".to_string())
            })?;
            Ok(Arc::new(connector))
        }
    }
}

pub async fn open(
    config: &RowGuardConfig,
    backend: BackendArg,
    gate: Arc<IsolationGate>,
) -> Result<Box<dyn Session>, RowGuardError> {
    factory(config, backend, gate)?
        .create_database_for_editing()
        .await
}
