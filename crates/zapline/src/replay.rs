// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline ingest`: replay saved webhook payloads.
//!
//! Replayed elements go through the same pipeline as live webhooks but
//! publish no realtime events and trigger no history backfill. Replaying
//! a file twice stores nothing new.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use zapline_config::ZaplineConfig;
use zapline_core::{ConversationStore, ProviderKind, ZaplineError};
use zapline_gateway::RoomHub;
use zapline_ingest::{DeliveryReport, IngestSource, IngestionCoordinator};
use zapline_storage::SqliteStore;

/// Parse a payload file: a single JSON document, or one document per line.
fn parse_deliveries(content: &str) -> Result<Vec<Value>, ZaplineError> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        return Ok(vec![value]);
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                ZaplineError::payload(format!("line {}: invalid JSON: {e}", n + 1))
            })
        })
        .collect()
}

/// Replay every delivery in `path` and return the combined report.
pub async fn replay_file(
    config: &ZaplineConfig,
    provider: ProviderKind,
    tenant_id: &str,
    path: &Path,
) -> Result<DeliveryReport, ZaplineError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ZaplineError::Config(format!("cannot read {}: {e}", path.display())))?;
    let deliveries = parse_deliveries(&content)?;

    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    let coordinator = IngestionCoordinator::new(store.clone(), Arc::new(RoomHub::new()), config);

    let mut total = DeliveryReport::default();
    for delivery in deliveries {
        let report = coordinator
            .ingest_delivery(tenant_id, provider, delivery, IngestSource::Replay)
            .await;
        total.outcomes.extend(report.outcomes);
        total.errors.extend(report.errors);
    }
    store.close().await?;
    Ok(total)
}

pub async fn run_ingest(
    config: ZaplineConfig,
    provider: ProviderKind,
    tenant_id: &str,
    path: &Path,
) -> Result<(), ZaplineError> {
    crate::init_tracing(&config.server.log_level);

    let total = replay_file(&config, provider, tenant_id, path).await?;
    for e in &total.errors {
        eprintln!("  element failed: {e}");
    }
    info!(
        tenant = %tenant_id,
        provider = %provider,
        elements = total.outcomes.len() + total.errors.len(),
        "replay finished"
    );
    println!(
        "zapline ingest: {} stored, {} duplicate, {} reconciled, {} status, {} dropped, {} failed",
        total.count("stored"),
        total.count("duplicate"),
        total.count("reconciled"),
        total.count("status_applied") + total.count("status_unmatched"),
        total.count("dropped") + total.count("ignored") + total.count("discarded"),
        total.errors.len()
    );

    if total.persistence_failed() {
        return Err(ZaplineError::Internal(
            "some elements could not be stored".into(),
        ));
    }
    Ok(())
}
