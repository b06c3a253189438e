// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime event rooms and payloads.

use serde_json::{Value, json};
use tracing::warn;

use zapline_core::types::{Conversation, Message};
use zapline_core::{
    Broadcaster, EVENT_MESSAGE_NEW, EVENT_MESSAGE_STATUS, conversation_room, department_room,
    tenant_room,
};
use zapline_prometheus::recording;

/// `message:new` goes to the conversation plus its department, or the whole
/// tenant when it has none. Never both.
pub fn new_message_rooms(tenant_id: &str, conversation: &Conversation) -> Vec<String> {
    let audience = match &conversation.department_id {
        Some(department) => department_room(department),
        None => tenant_room(tenant_id),
    };
    vec![conversation_room(&conversation.id), audience]
}

pub fn status_rooms(tenant_id: &str, conversation_id: &str) -> Vec<String> {
    vec![tenant_room(tenant_id), conversation_room(conversation_id)]
}

pub fn new_message_payload(tenant_id: &str, conversation: &Conversation, message: &Message) -> Value {
    json!({
        "tenantId": tenant_id,
        "conversationId": conversation.id,
        "phone": conversation.phone,
        "isGroup": conversation.is_group,
        "message": message,
    })
}

pub fn status_payload(message: &Message) -> Value {
    json!({
        "messageId": message.id,
        "conversationId": message.conversation_id,
        "status": message.status.as_str(),
        "providerMessageId": message.provider_message_id,
    })
}

/// Publish and swallow failures: the broadcaster never fails ingestion.
pub(crate) async fn publish(
    broadcaster: &dyn Broadcaster,
    rooms: &[String],
    event: &str,
    payload: Value,
) {
    if let Err(e) = broadcaster.publish(rooms, event, payload).await {
        warn!(event, error = %e, "realtime publish failed");
        recording::record_collaborator_failure("broadcaster");
    }
}

pub(crate) async fn publish_new_message(
    broadcaster: &dyn Broadcaster,
    tenant_id: &str,
    conversation: &Conversation,
    message: &Message,
) {
    publish(
        broadcaster,
        &new_message_rooms(tenant_id, conversation),
        EVENT_MESSAGE_NEW,
        new_message_payload(tenant_id, conversation, message),
    )
    .await;
}

pub(crate) async fn publish_status(broadcaster: &dyn Broadcaster, tenant_id: &str, message: &Message) {
    publish(
        broadcaster,
        &status_rooms(tenant_id, &message.conversation_id),
        EVENT_MESSAGE_STATUS,
        status_payload(message),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapline_core::ConversationStatus;

    fn conversation(department: Option<&str>) -> Conversation {
        Conversation {
            id: "c1".into(),
            tenant_id: "acme".into(),
            phone: "5534999999999".into(),
            contact_id: None,
            is_group: false,
            status: ConversationStatus::Open,
            department_id: department.map(str::to_string),
            last_activity_at: "2026-01-01T00:00:00.000Z".into(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn failed_publish_is_logged_not_raised() {
        let broadcaster = zapline_test_utils::MockBroadcaster::failing();
        publish_status(
            &broadcaster,
            "acme",
            &Message {
                id: "m1".into(),
                conversation_id: "c1".into(),
                provider_message_id: Some("P1".into()),
                direction: zapline_core::Direction::Inbound,
                kind: zapline_core::MessageKind::Text,
                status: zapline_core::DeliveryStatus::Read,
                body: "oi".into(),
                media_url: None,
                file_name: None,
                group_sender_phone: None,
                group_sender_name: None,
                quoted_message_id: None,
                created_at: "2026-01-01T00:00:00.000Z".into(),
            },
        )
        .await;
        assert_eq!(broadcaster.published().len(), 1);
        assert!(logs_contain("realtime publish failed"));
    }

    #[test]
    fn department_replaces_tenant_room() {
        assert_eq!(
            new_message_rooms("acme", &conversation(Some("sales"))),
            vec!["conversation:c1", "department:sales"]
        );
        assert_eq!(
            new_message_rooms("acme", &conversation(None)),
            vec!["conversation:c1", "tenant:acme"]
        );
        assert_eq!(status_rooms("acme", "c1"), vec!["tenant:acme", "conversation:c1"]);
    }
}
