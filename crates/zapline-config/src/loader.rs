// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./zapline.toml` > `~/.config/zapline/zapline.toml` >
//! `/etc/zapline/zapline.toml`, with environment variable overrides via the
//! `ZAPLINE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ZaplineConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG: &str = "/etc/zapline/zapline.toml";

/// Config file in the working directory.
pub const LOCAL_CONFIG: &str = "zapline.toml";

/// User config file under the XDG config dir, if one can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zapline/zapline.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/zapline/zapline.toml`
/// 3. `~/.config/zapline/zapline.toml`
/// 4. `./zapline.toml`
/// 5. `ZAPLINE_*` environment variables
pub fn load_config() -> Result<ZaplineConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ZaplineConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the layered Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ZaplineConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `ZAPLINE_INGEST_RECONCILE_WINDOW_SECS` must become
/// `ingest.reconcile_window_secs`.
fn env_provider() -> Env {
    Env::prefixed("ZAPLINE_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    key.replacen("server_", "server.", 1)
        .replacen("storage_", "storage.", 1)
        .replacen("ingest_", "ingest.", 1)
        .replacen("outbound_", "outbound.", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("server_webhook_token"), "server.webhook_token");
        assert_eq!(
            map_env_key("ingest_reconcile_window_secs"),
            "ingest.reconcile_window_secs"
        );
        assert_eq!(
            map_env_key("outbound_group_target_ttl_secs"),
            "outbound.group_target_ttl_secs"
        );
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
    }
}
