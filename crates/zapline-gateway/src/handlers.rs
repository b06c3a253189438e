// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.
//!
//! Handles POST and GET /webhooks/{provider}/{tenant},
//! GET /health and GET /metrics.

use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use zapline_core::types::{HealthStatus, ProviderKind};
use zapline_ingest::{DeliveryReport, IngestSource};

use crate::server::GatewayState;

/// Response body for a webhook delivery.
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookResponse {
    /// `false` only when a primary write failed and the delivery should be retried.
    pub ok: bool,
    pub elements: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub reconciled: usize,
    pub status_updates: usize,
    pub dropped: usize,
    pub errors: usize,
}

impl From<&DeliveryReport> for WebhookResponse {
    fn from(report: &DeliveryReport) -> Self {
        Self {
            ok: !report.persistence_failed(),
            elements: report.outcomes.len() + report.errors.len(),
            stored: report.count("stored"),
            duplicates: report.count("duplicate"),
            reconciled: report.count("reconciled"),
            status_updates: report.count("status_applied"),
            dropped: report.count("dropped") + report.count("ignored"),
            errors: report.errors.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// POST /webhooks/{provider}/{tenant}
///
/// Answers 500 only when a primary write failed, so the provider redelivers.
/// Every other outcome, including payloads that match no known shape, is
/// acknowledged with 200.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Path((provider, tenant)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Ok(kind) = ProviderKind::from_str(&provider.to_ascii_lowercase()) else {
        return error(StatusCode::NOT_FOUND, format!("unknown provider: {provider}"));
    };
    let body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(tenant = %tenant, provider = %kind, error = %e, "webhook body is not JSON");
            return error(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"));
        }
    };

    let report = state
        .coordinator
        .ingest_delivery(&tenant, kind, body, IngestSource::Webhook)
        .await;
    for e in &report.errors {
        warn!(tenant = %tenant, provider = %kind, error = %e, "webhook element failed");
    }

    let response = WebhookResponse::from(&report);
    let status = if response.ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response)).into_response()
}

/// Query string of the cloud API subscription handshake.
#[derive(Debug, Deserialize)]
pub struct CloudVerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// GET /webhooks/{provider}/{tenant}
///
/// Only the cloud provider performs a subscription handshake.
pub async fn verify_cloud(
    State(state): State<GatewayState>,
    Path((provider, tenant)): Path<(String, String)>,
    Query(params): Query<CloudVerifyParams>,
) -> Response {
    if provider != "cloud" {
        return error(StatusCode::NOT_FOUND, "no verification handshake for this provider");
    }
    let Some(expected) = state.cloud_verify_token.as_deref() else {
        return error(StatusCode::FORBIDDEN, "cloud verification is not configured");
    };
    let subscribing = params.mode.as_deref() == Some("subscribe");
    let token_matches = params.verify_token.as_deref() == Some(expected);
    match (subscribing && token_matches, params.challenge) {
        (true, Some(challenge)) => {
            tracing::info!(tenant = %tenant, "cloud webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        _ => {
            warn!(tenant = %tenant, "cloud webhook verification rejected");
            error(StatusCode::FORBIDDEN, "verification failed")
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let uptime_secs = state.health.start_time.elapsed().as_secs();
    let (status_code, status, detail) = match state.coordinator.store().health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "healthy", None),
        Ok(HealthStatus::Degraded(reason)) => (StatusCode::OK, "degraded", Some(reason)),
        Ok(HealthStatus::Unhealthy(reason)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(reason))
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", Some(e.to_string())),
    };
    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs,
            detail,
        }),
    )
        .into_response()
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "metrics recorder not installed"),
    }
}
