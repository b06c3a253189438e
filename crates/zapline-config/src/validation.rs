// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Collects every failure instead of stopping at the first one.

use std::collections::HashSet;

use zapline_core::phone;

use crate::diagnostic::ConfigError;
use crate::model::ZaplineConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &ZaplineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::validation(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "server.log_level `{}` must be one of: {}",
            config.server.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if let Some(token) = &config.server.webhook_token {
        if token.trim().is_empty() {
            errors.push(ConfigError::validation(
                "server.webhook_token must not be blank; omit it to disable the check",
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.ingest.reconcile_window_secs == 0 {
        errors.push(ConfigError::validation(
            "ingest.reconcile_window_secs must be greater than 0",
        ));
    }

    if config.outbound.group_target_cache_capacity == 0 {
        errors.push(ConfigError::validation(
            "outbound.group_target_cache_capacity must be at least 1",
        ));
    }

    let mut seen = HashSet::new();
    for (i, tenant) in config.tenants.iter().enumerate() {
        if tenant.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "tenants[{i}].id must not be empty"
            )));
        } else if !seen.insert(tenant.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate tenant id `{}` in [[tenants]] array",
                tenant.id
            )));
        }

        if let Some(own) = &tenant.own_number {
            let key = phone::normalize(own);
            if key.is_empty() || phone::is_group_key(&key) {
                errors.push(ConfigError::validation(format!(
                    "tenants[{i}].own_number `{own}` is not a phone number"
                )));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
