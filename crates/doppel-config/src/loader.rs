// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order: `/etc/doppel/doppel.toml`, `~/.config/doppel/doppel.toml`,
//! `./doppel.toml`, then `DOPPEL_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::DoppelConfig;

/// Top-level sections that environment variables may target.
const SECTIONS: &[&str] = &[
    "agent",
    "storage",
    "ingest",
    "burst",
    "persona",
    "relationship",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/doppel/doppel.toml`
/// 3. `~/.config/doppel/doppel.toml`
/// 4. `./doppel.toml`
/// 5. `DOPPEL_*` environment variables
pub fn load_config() -> Result<DoppelConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DoppelConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DoppelConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DoppelConfig, figment::Error> {
    tracing::debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(DoppelConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DoppelConfig::default()))
        .merge(Toml::file("/etc/doppel/doppel.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("doppel/doppel.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("doppel.toml"))
        .merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env var name onto a dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `burst_max_parts` maps to `burst.max_parts`. Unknown sections pass through
/// unchanged and are rejected by `deny_unknown_fields`.
pub fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}

/// Create the environment variable provider using explicit `map()` for section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because field names
/// themselves contain underscores.
fn env_provider() -> Env {
    Env::prefixed("DOPPEL_").map(|key| env_key_to_path(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_first_section_boundary() {
        assert_eq!(env_key_to_path("burst_max_parts"), "burst.max_parts");
        assert_eq!(
            env_key_to_path("storage_min_tokens_to_store"),
            "storage.min_tokens_to_store"
        );
        assert_eq!(env_key_to_path("agent_log_level"), "agent.log_level");
    }

    #[test]
    fn unknown_env_sections_pass_through() {
        assert_eq!(env_key_to_path("telemetry_url"), "telemetry_url");
        assert_eq!(env_key_to_path("burst"), "burst");
    }
}
