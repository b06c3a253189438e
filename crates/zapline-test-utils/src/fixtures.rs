// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payloads as providers send them.
//!
//! Gateway fixtures are single flat callbacks. Cloud fixtures are complete
//! `entry[].changes[].value` envelopes and must go through envelope
//! explosion before normalization.

use serde_json::{Value, json};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn now_secs() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Inbound text from an individual contact.
pub fn gateway_text(phone: &str, message_id: &str, text: &str) -> Value {
    json!({
        "type": "ReceivedCallback",
        "phone": phone,
        "messageId": message_id,
        "fromMe": false,
        "isGroup": false,
        "momment": now_millis(),
        "senderName": "Cliente",
        "text": {"message": text},
    })
}

/// Echo of a text sent from the connected account.
pub fn gateway_echo(phone: &str, message_id: &str, text: &str) -> Value {
    json!({
        "type": "ReceivedCallback",
        "phone": phone,
        "messageId": message_id,
        "fromMe": true,
        "isGroup": false,
        "momment": now_millis(),
        "text": {"message": text},
    })
}

pub fn gateway_image(phone: &str, message_id: &str, url: &str, caption: Option<&str>) -> Value {
    json!({
        "type": "ReceivedCallback",
        "phone": phone,
        "messageId": message_id,
        "fromMe": false,
        "momment": now_millis(),
        "image": {"imageUrl": url, "caption": caption, "mimeType": "image/jpeg"},
    })
}

pub fn gateway_group_text(
    group: &str,
    participant: &str,
    sender_name: &str,
    message_id: &str,
    text: &str,
) -> Value {
    json!({
        "type": "ReceivedCallback",
        "phone": format!("{group}-group"),
        "isGroup": true,
        "participantPhone": participant,
        "senderName": sender_name,
        "chatName": "Equipe",
        "messageId": message_id,
        "fromMe": false,
        "momment": now_millis(),
        "text": {"message": text},
    })
}

pub fn gateway_status(message_id: &str, status: &str) -> Value {
    json!({
        "type": "MessageStatusCallback",
        "status": status,
        "messageId": message_id,
        "momment": now_millis(),
    })
}

/// One status callback acknowledging several messages at once.
pub fn gateway_status_batch(message_ids: &[&str], status: &str) -> Value {
    json!({
        "type": "MessageStatusCallback",
        "status": status,
        "ids": message_ids,
        "momment": now_millis(),
    })
}

fn cloud_envelope(value: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{"field": "messages", "value": value}],
        }],
    })
}

fn cloud_metadata() -> Value {
    json!({
        "display_phone_number": "5534911112222",
        "phone_number_id": "106540352242922",
    })
}

pub fn cloud_text_envelope(from: &str, message_id: &str, text: &str, profile_name: &str) -> Value {
    cloud_envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": cloud_metadata(),
        "contacts": [{"wa_id": from, "profile": {"name": profile_name}}],
        "messages": [{
            "from": from,
            "id": message_id,
            "timestamp": now_secs(),
            "type": "text",
            "text": {"body": text},
        }],
    }))
}

/// Inbound text whose change carries no `contacts` list.
pub fn cloud_text_without_contacts(from: &str, message_id: &str, text: &str) -> Value {
    cloud_envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": cloud_metadata(),
        "messages": [{
            "from": from,
            "id": message_id,
            "timestamp": now_secs(),
            "type": "text",
            "text": {"body": text},
        }],
    }))
}

/// Echo of a message sent from the business account to `to`.
pub fn cloud_echo_envelope(to: &str, message_id: &str, text: &str) -> Value {
    cloud_envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": cloud_metadata(),
        "message_echoes": [{
            "from": "5534911112222",
            "to": to,
            "id": message_id,
            "timestamp": now_secs(),
            "type": "text",
            "text": {"body": text},
        }],
    }))
}

pub fn cloud_status_envelope(message_id: &str, status: &str, recipient: &str) -> Value {
    cloud_envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": cloud_metadata(),
        "statuses": [{
            "id": message_id,
            "status": status,
            "timestamp": now_secs(),
            "recipient_id": recipient,
        }],
    }))
}
