// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the webhook surface.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use zapline_config::model::ServerConfig;
use zapline_core::ZaplineError;
use zapline_ingest::IngestionCoordinator;

use crate::auth::{WebhookAuth, auth_middleware};
use crate::handlers;
use crate::hub::RoomHub;
use crate::ws;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: IngestionCoordinator,
    /// Room registry backing `/ws`. Also the coordinator's broadcaster when
    /// running the default stack.
    pub hub: Arc<RoomHub>,
    pub cloud_verify_token: Option<String>,
    pub health: HealthState,
}

/// Build the application router.
///
/// - GET /health, GET /metrics (public)
/// - GET /webhooks/{provider}/{tenant} (public, cloud handshake checked
///   against `hub.verify_token`)
/// - POST /webhooks/{provider}/{tenant} (shared-secret auth)
/// - GET /ws?rooms=... (shared-secret auth)
pub fn router(state: GatewayState, auth: WebhookAuth) -> Router {
    // Both methods share one path, so auth is layered on POST alone.
    let webhook = get(handlers::verify_cloud).merge(post(handlers::post_webhook).route_layer(
        axum_middleware::from_fn_with_state(auth.clone(), auth_middleware),
    ));

    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/webhooks/{provider}/{tenant}", webhook)
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `shutdown` resolves.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ZaplineError> {
    let app = router(state, WebhookAuth::new(config.webhook_token.clone()));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ZaplineError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ZaplineError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use zapline_config::ZaplineConfig;
    use zapline_test_utils::{TestHarness, fixtures};

    async fn app(harness: &TestHarness, token: Option<&str>) -> (Router, Arc<RoomHub>) {
        let hub = Arc::new(RoomHub::new());
        let mut config = ZaplineConfig::default();
        config.ingest.history_backfill_limit = 0;
        let coordinator = IngestionCoordinator::new(harness.store(), hub.clone(), &config);
        let state = GatewayState {
            coordinator,
            hub: Arc::clone(&hub),
            cloud_verify_token: Some("verify-me".into()),
            health: HealthState::new(Some(Arc::new(|| "zapline_up 1\n".to_string()))),
        };
        (router(state, WebhookAuth::new(token.map(str::to_string))), hub)
    }

    fn post(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn webhook_stores_and_reports() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, None).await;

        let response = app
            .oneshot(post(
                "/webhooks/gateway/acme",
                &fixtures::gateway_text("5534999999999", "M1", "oi"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["stored"], 1);

        let conversation = harness.only_conversation("acme").await;
        assert_eq!(harness.message_count(&conversation.id).await, 1);
    }

    #[tokio::test]
    async fn replayed_webhook_is_acknowledged_every_time() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, None).await;
        let payload = fixtures::gateway_text("5534999999999", "M1", "oi");

        let mut bodies = Vec::new();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(post("/webhooks/gateway/acme", &payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            bodies.push(json_body(response).await);
        }

        assert!(bodies.iter().all(|b| b["ok"] == true && b["errors"] == 0));
        let stored: u64 = bodies.iter().filter_map(|b| b["stored"].as_u64()).sum();
        let duplicates: u64 = bodies.iter().filter_map(|b| b["duplicates"].as_u64()).sum();
        assert_eq!(stored, 1);
        assert_eq!(duplicates, 2);
        assert_eq!(bodies[0]["stored"], 1);

        let conversation = harness.only_conversation("acme").await;
        assert_eq!(harness.message_count(&conversation.id).await, 1);
    }

    #[tokio::test]
    async fn cloud_envelope_without_contacts_is_stored() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, None).await;

        let response = app
            .oneshot(post(
                "/webhooks/cloud/acme",
                &fixtures::cloud_text_without_contacts("5534999999999", "wamid.2", "oi"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["stored"], 1);
        assert_eq!(body["dropped"], 0);
    }

    #[tokio::test]
    async fn cloud_envelope_is_exploded() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, None).await;

        let response = app
            .oneshot(post(
                "/webhooks/cloud/acme",
                &fixtures::cloud_text_envelope("5534999999999", "wamid.1", "oi", "Ana"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["stored"], 1);
    }

    #[tokio::test]
    async fn token_is_enforced_on_webhooks() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, Some("s3cret")).await;
        let payload = fixtures::gateway_text("5534999999999", "M1", "oi");

        let rejected = app
            .clone()
            .oneshot(post("/webhooks/gateway/acme", &payload))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let accepted = app
            .oneshot(post("/webhooks/gateway/acme?token=s3cret", &payload))
            .await
            .unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_provider_and_bad_json() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, None).await;

        let unknown = app
            .clone()
            .oneshot(post("/webhooks/telegram/acme", &serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let bad = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/gateway/acme")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cloud_challenge_round_trip() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, Some("s3cret")).await;

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/webhooks/cloud/acme?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1158201444")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let bytes = to_bytes(ok.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"1158201444");

        let wrong = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/webhooks/cloud/acme?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

        let gateway = app
            .oneshot(
                Request::builder()
                    .uri("/webhooks/gateway/acme?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(gateway.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_metrics_are_public() {
        let harness = TestHarness::new().await;
        let (app, _hub) = app(&harness, Some("s3cret")).await;

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(json_body(health).await["status"], "healthy");

        let metrics = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
        let bytes = to_bytes(metrics.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("zapline_up"));
    }

    #[tokio::test]
    async fn stored_messages_reach_room_subscribers() {
        let harness = TestHarness::new().await;
        let (app, hub) = app(&harness, None).await;
        let mut tenant = hub.subscribe("tenant:acme");

        app.oneshot(post(
            "/webhooks/gateway/acme",
            &fixtures::gateway_text("5534999999999", "M1", "oi"),
        ))
        .await
        .unwrap();

        let frame = tenant.recv().await.unwrap();
        assert_eq!(frame.event, "message:new");
        assert_eq!(frame.payload["message"]["body"], "oi");
    }
}
