// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-secret authentication for webhook and WebSocket routes.
//!
//! Providers differ in how they can attach a secret, so three carriers are
//! accepted, checked in order:
//! 1. `X-Webhook-Token: <token>`
//! 2. `Authorization: Bearer <token>`
//! 3. `?token=<token>` query parameter
//!
//! When no token is configured every request passes.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

#[derive(Clone, Default)]
pub struct WebhookAuth {
    /// Expected shared secret. `None` disables the check.
    pub token: Option<String>,
}

impl std::fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl WebhookAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    /// Whether `request` carries the configured token.
    pub fn accepts(&self, request: &Request) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        let headers = request.headers();

        let header_token = headers
            .get(WEBHOOK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let query = request.uri().query().and_then(query_token);

        [header_token, bearer, query.as_deref()]
            .into_iter()
            .flatten()
            .any(|token| token == expected)
    }
}

fn query_token(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "token")
        .map(|(_, value)| value.to_string())
}

pub async fn auth_middleware(
    State(auth): State<WebhookAuth>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.accepts(&request) {
        return Ok(next.run(request).await);
    }
    tracing::debug!(path = %request.uri().path(), "request rejected: missing or wrong token");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn disabled_when_no_token() {
        assert!(WebhookAuth::new(None).accepts(&request("/webhooks/gateway/acme", &[])));
        assert!(WebhookAuth::new(Some(String::new())).accepts(&request("/", &[])));
    }

    #[test]
    fn accepts_any_carrier() {
        let auth = WebhookAuth::new(Some("s3cret".into()));
        assert!(auth.accepts(&request("/", &[("x-webhook-token", "s3cret")])));
        assert!(auth.accepts(&request("/", &[("authorization", "Bearer s3cret")])));
        assert!(auth.accepts(&request("/ws?rooms=tenant:acme&token=s3cret", &[])));
        assert!(!auth.accepts(&request("/", &[("authorization", "Bearer nope")])));
        assert!(!auth.accepts(&request("/?token=nope", &[])));
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", WebhookAuth::new(Some("s3cret".into())));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[redacted]"));
    }
}
