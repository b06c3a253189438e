// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook HTTP surface and realtime WebSocket hub.
//!
//! Provider webhooks are handed to the [`zapline_ingest::IngestionCoordinator`];
//! realtime events fan out to WebSocket clients through [`RoomHub`].

pub mod auth;
pub mod handlers;
pub mod hub;
pub mod server;
pub mod ws;

pub use auth::WebhookAuth;
pub use hub::{RoomFrame, RoomHub};
pub use server::{GatewayState, HealthState, router, start_server};
