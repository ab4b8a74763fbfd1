// SPDX-FileCopyrightText: 2026 Rowguard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy (`./rowguard.toml`, then
//! `~/.config/rowguard/rowguard.toml`, then `/etc/rowguard/rowguard.toml`)
//! with environment variable overrides via the `ROWGUARD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RowGuardConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/rowguard/rowguard.toml`
/// 3. `~/.config/rowguard/rowguard.toml`
/// 4. `./rowguard.toml`
/// 5. `ROWGUARD_*` environment variables
pub fn load_config() -> Result<RowGuardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<RowGuardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RowGuardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RowGuardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RowGuardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RowGuardConfig::default()))
        .merge(Toml::file("/etc/rowguard/rowguard.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("rowguard/rowguard.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("rowguard.toml"))
        .merge(env_provider())
}

/// Maps `ROWGUARD_<SECTION>_<KEY>` onto `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys contain
/// underscores: `ROWGUARD_SQLITE_BUSY_TIMEOUT_MS` is `sqlite.busy_timeout_ms`.
/// Variables outside the four sections (such as `ROWGUARD_TEST_*`) are ignored.
fn env_provider() -> Env {
    Env::prefixed("ROWGUARD_")
        .filter(|key| section_key(key.as_str()).is_some())
        .map(|key| section_key(key.as_str()).unwrap_or_default().into())
}

fn section_key(key: &str) -> Option<String> {
    const SECTIONS: [&str; 4] = ["sqlite", "postgres", "editing", "log"];
    let key = key.to_ascii_lowercase();
    SECTIONS.iter().find_map(|section| {
        key.strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
            .map(|field| format!("{section}.{field}"))
    })
}
