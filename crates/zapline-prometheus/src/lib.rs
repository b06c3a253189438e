// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for Zapline.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text through the gateway's `/metrics` endpoint.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use zapline_core::types::{AdapterType, HealthStatus};
use zapline_core::{PluginAdapter, ZaplineError};

pub use recording::{
    record_collaborator_failure, record_dropped, record_duplicate, record_event,
    record_ingest_latency, record_merges, record_reconciled, record_stored, record_status_update,
    register_metrics,
};

/// Prometheus metrics adapter.
///
/// Holds the handle used to render the installed recorder's state.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, ZaplineError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ZaplineError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wrap an existing handle (e.g. from a locally scoped recorder).
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}
