// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model shared across the store, the ingestion pipeline, and the
//! webhook surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumString};

/// Timestamp format used for every stored timestamp.
///
/// Fixed-width UTC so lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Convert a provider epoch (seconds or milliseconds) into [`TIMESTAMP_FORMAT`].
///
/// Values above 10^12 are treated as milliseconds. Returns `None` for values
/// that do not map to a representable instant.
pub fn timestamp_from_epoch(epoch: i64) -> Option<String> {
    if epoch <= 0 {
        return None;
    }
    let dt = if epoch > 1_000_000_000_000 {
        chrono::DateTime::from_timestamp_millis(epoch)?
    } else {
        chrono::DateTime::from_timestamp(epoch, 0)?
    };
    Some(dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Broadcast,
    Provider,
    Observability,
}

/// Upstream messaging provider family a webhook came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Official cloud messaging API (`entry[].changes[].value` envelopes).
    Cloud,
    /// QR-paired session gateway (flat JSON callbacks).
    Gateway,
}

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    InProgress,
    Closed,
}

/// Message direction relative to the connected account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum Direction {
    #[strum(serialize = "in")]
    #[serde(rename = "in")]
    Inbound,
    #[strum(serialize = "out")]
    #[serde(rename = "out")]
    Outbound,
}

impl Direction {
    /// Direction of an event given its `fromMe` flag.
    pub fn from_me(from_me: bool) -> Self {
        if from_me { Self::Outbound } else { Self::Inbound }
    }
}

/// Payload kind of a message.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Document,
    Sticker,
    Location,
    Contact,
    Reaction,
}

impl MessageKind {
    /// Kinds whose content lives in a media reference.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Audio | Self::Video | Self::Document | Self::Sticker
        )
    }

    /// Caption-less placeholder text for media kinds.
    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("(image)"),
            Self::Audio => Some("(audio)"),
            Self::Video => Some("(video)"),
            Self::Document => Some("(document)"),
            Self::Sticker => Some("(sticker)"),
            _ => None,
        }
    }
}

/// Canonical delivery status of a message.
///
/// The five ranked states form `pending -> sent -> delivered -> read -> played`.
/// `Error` is terminal. Labels no mapping recognizes are kept verbatim in
/// `Other` instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Played,
    Error,
    Other(String),
}

impl DeliveryStatus {
    /// Stored representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Played => "played",
            Self::Error => "error",
            Self::Other(label) => label,
        }
    }

    /// Position in the delivery state machine; `None` for `Error` and `Other`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Played => Some(4),
            Self::Error | Self::Other(_) => None,
        }
    }

    /// Parse a stored value. Never fails: unknown values become `Other`.
    pub fn from_stored(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "played" => Self::Played,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_stored(s))
    }
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeliveryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_stored(&s))
    }
}

// --- Stored entities ---

/// A contact (a.k.a. client) owning a canonical phone key within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub tenant_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub last_contact_at: Option<String>,
    pub created_at: String,
}

/// One ongoing thread with a contact or a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    /// Canonical contact key (`telefone`); the group id for groups.
    pub phone: String,
    pub contact_id: Option<String>,
    pub is_group: bool,
    pub status: ConversationStatus,
    pub department_id: Option<String>,
    pub last_activity_at: String,
    pub created_at: String,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// `None` only for local outbound sends the provider has not confirmed yet.
    pub provider_message_id: Option<String>,
    pub direction: Direction,
    pub kind: MessageKind,
    pub status: DeliveryStatus,
    pub body: String,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub group_sender_phone: Option<String>,
    pub group_sender_name: Option<String>,
    pub quoted_message_id: Option<String>,
    pub created_at: String,
}

/// Insert request for a contact.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub tenant_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
}

/// Insert request for a conversation.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub tenant_id: String,
    pub phone: String,
    pub contact_id: Option<String>,
    pub is_group: bool,
    pub department_id: Option<String>,
}

/// Insert request for a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: String,
    pub provider_message_id: Option<String>,
    pub direction: Direction,
    pub kind: MessageKind,
    pub status: DeliveryStatus,
    pub body: String,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub group_sender_phone: Option<String>,
    pub group_sender_name: Option<String>,
    pub quoted_message_id: Option<String>,
    /// Event timestamp; `None` stores the current time.
    pub created_at: Option<String>,
}

/// Result of a create operation guarded by a unique constraint.
///
/// A conflict is not an error: it means a concurrent writer won the race and
/// the row it wrote is returned instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOrGet<T> {
    Created(T),
    Existing(T),
}

impl<T> CreateOrGet<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outcome of merging duplicate open conversations into a canonical one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub canonical_id: String,
    pub moved_messages: usize,
    /// Duplicates removed outright.
    pub deleted: Vec<String>,
    /// Duplicates whose deletion was refused and were closed instead.
    pub closed: Vec<String>,
}

/// Content signature used to match a provider echo to a local outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoSignature {
    Media(String),
    Text(String),
}

// --- Canonical inbound events ---

/// Raw acknowledgement as delivered by a provider, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatus {
    /// Small integer acknowledgement code.
    Ack(i64),
    /// Free-text label in either provider's vocabulary.
    Label(String),
}

/// A delivery/read acknowledgement with no message content.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub raw_status: RawStatus,
}

/// A message event in canonical form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundMessage {
    /// Canonical contact key; empty when no candidate field was phone-shaped.
    pub contact_key: String,
    pub is_group: bool,
    pub from_me: bool,
    pub provider_message_id: Option<String>,
    pub timestamp: Option<String>,
    pub kind: MessageKind,
    pub text: String,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub group_sender_phone: Option<String>,
    pub group_sender_name: Option<String>,
    pub quoted_message_id: Option<String>,
    /// Display name offered by the provider for the contact (individuals only).
    pub contact_name: Option<String>,
    pub contact_photo: Option<String>,
}

impl InboundMessage {
    /// True for events with nothing to show: no text, no media, and a kind that
    /// carries no structured content. Some send confirmations look like this.
    pub fn is_empty_artifact(&self) -> bool {
        if self.media_url.is_some() {
            return false;
        }
        match self.kind {
            MessageKind::Location | MessageKind::Contact | MessageKind::Reaction => {
                self.text.trim().is_empty()
            }
            kind => {
                let text = self.text.trim();
                text.is_empty() || kind.placeholder() == Some(text)
            }
        }
    }

    /// Signature used to find the local outbound row this echo confirms.
    pub fn echo_signature(&self) -> Option<EchoSignature> {
        if let Some(url) = &self.media_url {
            return Some(EchoSignature::Media(url.clone()));
        }
        let text = self.text.trim();
        if text.is_empty() || self.kind.placeholder() == Some(text) {
            None
        } else {
            Some(EchoSignature::Text(text.to_string()))
        }
    }
}

/// Canonical event produced from one raw provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    StatusUpdate(StatusUpdate),
    Message(InboundMessage),
}

// --- Outbound ---

/// Content handed to a [`crate::ProviderClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundContent {
    Text { body: String },
    Image { url: String, caption: Option<String> },
    Audio { url: String },
    Video { url: String, caption: Option<String> },
    Document { url: String, file_name: Option<String> },
    Sticker { url: String },
}

impl OutboundContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::Audio { .. } => MessageKind::Audio,
            Self::Video { .. } => MessageKind::Video,
            Self::Document { .. } => MessageKind::Document,
            Self::Sticker { .. } => MessageKind::Sticker,
        }
    }

    /// Body stored for the local row; the same text an echo will carry.
    /// Text stored for the send, trimmed the way echo signatures are.
    pub fn body(&self) -> String {
        match self {
            Self::Text { body } => body.trim().to_string(),
            Self::Image { caption, .. } | Self::Video { caption, .. } => caption
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| self.kind().placeholder().unwrap_or_default())
                .to_string(),
            Self::Document { file_name, .. } => file_name
                .clone()
                .unwrap_or_else(|| "(document)".to_string()),
            Self::Audio { .. } | Self::Sticker { .. } => {
                self.kind().placeholder().unwrap_or_default().to_string()
            }
        }
    }

    pub fn media_url(&self) -> Option<&str> {
        match self {
            Self::Text { .. } => None,
            Self::Image { url, .. }
            | Self::Audio { url }
            | Self::Video { url, .. }
            | Self::Document { url, .. }
            | Self::Sticker { url } => Some(url),
        }
    }
}

/// Result of a provider send.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendReceipt {
    pub ok: bool,
    pub provider_message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_status_round_trips_through_storage_form() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
            DeliveryStatus::Played,
            DeliveryStatus::Error,
            DeliveryStatus::Other("queued_upstream".into()),
        ] {
            assert_eq!(DeliveryStatus::from_stored(status.as_str()), status);
        }
    }

    #[test]
    fn delivery_status_ranks_are_ordered() {
        assert!(DeliveryStatus::Pending.rank() < DeliveryStatus::Sent.rank());
        assert!(DeliveryStatus::Read.rank() < DeliveryStatus::Played.rank());
        assert_eq!(DeliveryStatus::Error.rank(), None);
    }

    #[test]
    fn direction_and_kind_string_forms() {
        assert_eq!(Direction::Inbound.to_string(), "in");
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Outbound);
        assert_eq!(MessageKind::Sticker.to_string(), "sticker");
        assert_eq!(
            "in_progress".parse::<ConversationStatus>().unwrap(),
            ConversationStatus::InProgress
        );
        assert_eq!("gateway".parse::<ProviderKind>().unwrap(), ProviderKind::Gateway);
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let secs = timestamp_from_epoch(1_700_000_000).unwrap();
        let millis = timestamp_from_epoch(1_700_000_000_000).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, "2023-11-14T22:13:20.000Z");
        assert!(timestamp_from_epoch(0).is_none());
    }

    #[test]
    fn placeholder_only_media_without_url_is_artifact() {
        let msg = InboundMessage {
            kind: MessageKind::Image,
            text: "(image)".into(),
            ..Default::default()
        };
        assert!(msg.is_empty_artifact());
        assert!(msg.echo_signature().is_none());

        let with_media = InboundMessage {
            media_url: Some("https://cdn.example/a.jpg".into()),
            ..msg
        };
        assert!(!with_media.is_empty_artifact());
        assert_eq!(
            with_media.echo_signature(),
            Some(EchoSignature::Media("https://cdn.example/a.jpg".into()))
        );
    }

    #[test]
    fn outbound_body_matches_echo_text() {
        let content = OutboundContent::Image {
            url: "https://cdn.example/b.png".into(),
            caption: None,
        };
        assert_eq!(content.body(), "(image)");
        assert_eq!(content.media_url(), Some("https://cdn.example/b.png"));
        assert_eq!(content.kind(), MessageKind::Image);
    }

    #[test]
    fn outbound_body_is_trimmed_like_the_echo() {
        let content = OutboundContent::Text {
            body: "chegou?\n\t".into(),
        };
        let echo = InboundMessage {
            text: "  chegou?\r\n".into(),
            ..InboundMessage::default()
        };
        assert_eq!(
            echo.echo_signature(),
            Some(EchoSignature::Text(content.body()))
        );

        let captioned = OutboundContent::Video {
            url: "https://cdn.example/v.mp4".into(),
            caption: Some(" \n".into()),
        };
        assert_eq!(captioned.body(), "(video)");
    }
}
