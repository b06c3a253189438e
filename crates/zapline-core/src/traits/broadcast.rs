// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime broadcaster trait and room naming.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;

/// Event emitted when a message is stored.
pub const EVENT_MESSAGE_NEW: &str = "message:new";

/// Event emitted when a message's delivery status changes.
pub const EVENT_MESSAGE_STATUS: &str = "message:status";

/// Fan-out of realtime events to named rooms.
///
/// Failures are reported but callers on the ingestion path only log them.
#[async_trait]
pub trait Broadcaster: PluginAdapter {
    /// Publish `payload` as `event` to every room in `rooms`.
    async fn publish(
        &self,
        rooms: &[String],
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), ZaplineError>;
}

/// Room for every agent of a tenant.
pub fn tenant_room(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}")
}

/// Room for clients viewing one conversation.
pub fn conversation_room(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// Room for the agents of one department.
pub fn department_room(department_id: &str) -> String {
    format!("department:{department_id}")
}
