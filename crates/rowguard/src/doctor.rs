// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rowguard doctor` command implementation.
//!
//! Checks that the configuration loads and that each configured backend can
//! be opened, reports its clock, and has the lock table the pessimistic
//! strategy needs.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rowguard_config::model::RowGuardConfig;
use rowguard_core::{RowGuardError, Session};
use rowguard_postgres::PostgresConnector;
use rowguard_sqlite::{IsolationGate, SqliteConnector};

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `rowguard doctor` command. With `--plain`, disables colored output.
pub async fn run_doctor(
    config: &RowGuardConfig,
    gate: Arc<IsolationGate>,
    plain: bool,
) -> Result<(), RowGuardError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config(),
        check_sqlite(config, gate).await,
        check_postgres(config).await,
    ];

    println!();
    println!("  rowguard doctor");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", format_line(result, use_color));
    }
    println!();

    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

fn check_config() -> CheckResult {
    let start = Instant::now();
    match rowguard_config::load_and_validate() {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s) found", errors.len()),
            start,
        ),
    }
}

async fn check_sqlite(config: &RowGuardConfig, gate: Arc<IsolationGate>) -> CheckResult {
    let start = Instant::now();
    let connector = SqliteConnector::from_config(&config.sqlite, gate);
    let mut session = match connector.open().await {
        Ok(session) => session,
        Err(e) => {
            return CheckResult::new("SQLite", CheckStatus::Fail, e.to_string(), start);
        }
    };
    let result = probe_session(&mut session, &config.editing.lock_table, start, "SQLite").await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing doctor session failed");
    }
    result
}

async fn check_postgres(config: &RowGuardConfig) -> CheckResult {
    let start = Instant::now();
    let connector = match PostgresConnector::from_config(&config.postgres) {
        Ok(Some(connector)) => connector,
        Ok(None) => {
            return CheckResult::new("PostgreSQL", CheckStatus::Pass, "not configured", start);
        }
        Err(e) => {
            return CheckResult::new("PostgreSQL", CheckStatus::Fail, e.to_string(), start);
        }
    };
    let mut session = match connector.open().await {
        Ok(session) => session,
        Err(e) => {
            return CheckResult::new("PostgreSQL", CheckStatus::Fail, e.to_string(), start);
        }
    };
    let result = probe_session(&mut session, &config.editing.lock_table, start, "PostgreSQL").await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "closing doctor session failed");
    }
    result
}

/// Reads the clock and looks for the lock table on an open session.
async fn probe_session(
    session: &mut dyn Session,
    lock_table: &str,
    start: Instant,
    name: &str,
) -> CheckResult {
    let now = match session.current_time().await {
        Ok(now) => now,
        Err(e) => return CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    };
    match session.table_exists(lock_table).await {
        Ok(true) => CheckResult::new(
            name,
            CheckStatus::Pass,
            format!("reachable, clock {}", now.format("%Y-%m-%d %H:%M:%S")),
            start,
        ),
        Ok(false) => CheckResult::new(
            name,
            CheckStatus::Warn,
            format!("lock table `{lock_table}` missing; run `rowguard locks init`"),
            start,
        ),
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}
