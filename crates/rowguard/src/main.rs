// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! rowguard - row-level concurrency control for SQLite and PostgreSQL.
//!
//! The binary is an operator tool: it checks the configured backends and
//! inspects or clears the pessimistic editing flags.

mod backend;
mod doctor;
mod locks;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rowguard_config::model::RowGuardConfig;
use rowguard_sqlite::IsolationGate;

use crate::backend::BackendArg;

/// rowguard - row-level concurrency control for SQLite and PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "rowguard", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the default hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check configuration and backend connectivity.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Inspect and manage pessimistic editing flags.
    Locks {
        /// Backend holding the lock table.
        #[arg(long, value_enum, default_value_t = BackendArg::File, global = true)]
        backend: BackendArg,

        #[command(subcommand)]
        action: LocksAction,
    },
}

#[derive(Subcommand, Debug)]
enum LocksAction {
    /// Create the lock table if it does not exist.
    Init,
    /// List every entity currently checked out.
    List,
    /// Clear a flag whoever holds it.
    Release {
        /// Table of the flagged entity.
        table: String,
        /// Identifier of the flagged entity.
        identifier: String,
    },
}

fn load_config(path: Option<&std::path::Path>) -> RowGuardConfig {
    let loaded = match path {
        Some(path) => rowguard_config::load_and_validate_path(path),
        None => rowguard_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            rowguard_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());
    init_tracing(&config.log.level);

    // One gate for the whole process; every SQLite session goes through it.
    let gate = Arc::new(IsolationGate::new());

    let result = match cli.command {
        Some(Commands::Doctor { plain }) => doctor::run_doctor(&config, gate, plain).await,
        Some(Commands::Locks { backend, action }) => match action {
            LocksAction::Init => locks::init(&config, backend, gate).await,
            LocksAction::List => locks::list(&config, backend, gate).await,
            LocksAction::Release { table, identifier } => {
                locks::release(&config, backend, gate, &table, &identifier).await
            }
        },
        None => {
            println!("rowguard: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("rowguard: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rowguard={log_level},rowguard_core={log_level},rowguard_sqlite={log_level},\
             rowguard_postgres={log_level},rowguard_mapper={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
