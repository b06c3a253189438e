// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Zapline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Zapline configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ZaplineConfig {
    /// HTTP listener and webhook authentication.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Ingestion pipeline tuning.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Outbound dispatch settings.
    #[serde(default)]
    pub outbound: OutboundConfig,

    /// Known tenants. Webhooks for tenants not listed here are still ingested,
    /// but without an own number or default department.
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

impl ZaplineConfig {
    /// Configuration for `tenant_id`, if it is declared.
    pub fn tenant(&self, tenant_id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|t| t.id == tenant_id)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Shared secret expected on webhook requests. `None` disables the check.
    #[serde(default)]
    pub webhook_token: Option<String>,

    /// Token echoed back during the cloud API subscription handshake.
    #[serde(default)]
    pub cloud_verify_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            webhook_token: None,
            cloud_verify_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3180
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("zapline").join("zapline.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("zapline.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// How incoming acknowledgements are applied to a stored status.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusPolicy {
    /// Only advance along pending, sent, delivered, read, played. `error`
    /// is terminal.
    #[default]
    MaxRank,
    /// Every non-empty status overwrites the previous one.
    LastWrite,
}

/// Ingestion pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// How far back a provider echo may match an unconfirmed local send.
    #[serde(default = "default_reconcile_window_secs")]
    pub reconcile_window_secs: u64,

    #[serde(default)]
    pub status_policy: StatusPolicy,

    /// Retry status lookups across all tenants when the tenant-scoped
    /// lookup finds nothing.
    #[serde(default)]
    pub status_tenant_fallback: bool,

    /// Messages fetched when a conversation is first created. `0` disables.
    #[serde(default = "default_history_backfill_limit")]
    pub history_backfill_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            reconcile_window_secs: default_reconcile_window_secs(),
            status_policy: StatusPolicy::default(),
            status_tenant_fallback: false,
            history_backfill_limit: default_history_backfill_limit(),
        }
    }
}

fn default_reconcile_window_secs() -> u64 {
    300
}

fn default_history_backfill_limit() -> usize {
    20
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutboundConfig {
    /// Maximum number of groups whose working send target is remembered.
    #[serde(default = "default_group_target_cache_capacity")]
    pub group_target_cache_capacity: usize,

    #[serde(default = "default_group_target_ttl_secs")]
    pub group_target_ttl_secs: u64,
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            group_target_cache_capacity: default_group_target_cache_capacity(),
            group_target_ttl_secs: default_group_target_ttl_secs(),
        }
    }
}

fn default_group_target_cache_capacity() -> usize {
    1024
}

fn default_group_target_ttl_secs() -> u64 {
    6 * 60 * 60
}

/// Per-tenant settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    pub id: String,

    /// The tenant's own connected number, used to tell self from contact
    /// when a provider reports both.
    #[serde(default)]
    pub own_number: Option<String>,

    /// Department new conversations are assigned to.
    #[serde(default)]
    pub department_id: Option<String>,
}
