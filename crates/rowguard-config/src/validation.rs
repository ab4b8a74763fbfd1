// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::RowGuardConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every failure.
pub fn validate_config(config: &RowGuardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.sqlite.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "sqlite.database_path must not be empty".to_string(),
        });
    }

    if let Some(url) = &config.postgres.url
        && !(url.starts_with("postgres://") || url.starts_with("postgresql://"))
    {
        errors.push(ConfigError::Validation {
            message: "postgres.url must start with postgres:// or postgresql://".to_string(),
        });
    }

    if config.postgres.connect_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "postgres.connect_timeout_secs must be at least 1".to_string(),
        });
    }

    if !is_identifier(&config.editing.lock_table) {
        errors.push(ConfigError::Validation {
            message: format!(
                "editing.lock_table `{}` is not a valid table name",
                config.editing.lock_table
            ),
        });
    }

    if let Some(owner) = &config.editing.owner
        && owner.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "editing.owner must not be blank when set".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` must be one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
