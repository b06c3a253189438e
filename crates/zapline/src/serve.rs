// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline serve`: the webhook server.

use std::sync::Arc;

use tracing::{info, warn};

use zapline_config::ZaplineConfig;
use zapline_core::{ConversationStore, ZaplineError};
use zapline_gateway::{GatewayState, HealthState, RoomHub};
use zapline_ingest::IngestionCoordinator;
use zapline_prometheus::PrometheusAdapter;
use zapline_storage::SqliteStore;

/// Open the store, wire the pipeline to the room hub, and serve until a
/// shutdown signal arrives.
pub async fn run_serve(config: ZaplineConfig) -> Result<(), ZaplineError> {
    crate::init_tracing(&config.server.log_level);

    info!("starting zapline serve");

    let store = Arc::new(SqliteStore::new(config.storage.clone()));
    store.initialize().await?;
    info!(path = %config.storage.database_path, "store initialized");

    let prometheus_render = match PrometheusAdapter::new() {
        Ok(adapter) => {
            let adapter = Arc::new(adapter);
            Some(Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>)
        }
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let hub = Arc::new(RoomHub::new());
    let coordinator = IngestionCoordinator::new(store.clone(), hub.clone(), &config);
    for tenant in &config.tenants {
        info!(
            tenant = %tenant.id,
            own_number = tenant.own_number.is_some(),
            department = tenant.department_id.as_deref().unwrap_or("-"),
            "tenant configured"
        );
    }

    let state = GatewayState {
        coordinator,
        hub,
        cloud_verify_token: config.server.cloud_verify_token.clone(),
        health: HealthState::new(prometheus_render),
    };

    let served = zapline_gateway::start_server(&config.server, state, shutdown_signal()).await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "store close failed");
    }
    served?;
    info!("zapline serve shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                    _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl+C, initiating shutdown");
    }
}
