// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! QR-paired gateway callbacks.
//!
//! Gateways post flat JSON whose fields vary by callback family. Everything
//! lands in one lenient [`GatewayPayload`]; classification then runs an
//! ordered matcher chain and the first matcher that answers wins.

use serde::Deserialize;
use serde_json::Value;

use zapline_core::phone;
use zapline_core::types::{
    InboundEvent, InboundMessage, MessageKind, RawStatus, StatusUpdate, timestamp_from_epoch,
};
use zapline_core::ZaplineError;

use super::lenient::{opt_bool, opt_f64, opt_i64, opt_id, opt_string, opt_text};
use super::{NormalizeContext, location_text, reaction_text, synthesize_text};

const STATUS_CALLBACKS: [&str; 5] = [
    "messagestatuscallback",
    "message_status",
    "onack",
    "ack",
    "status",
];

const DELIVERY_CALLBACK: &str = "deliverycallback";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayPayload {
    #[serde(rename = "type", deserialize_with = "opt_string")]
    pub kind: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub event: Option<String>,
    #[serde(deserialize_with = "opt_id")]
    pub message_id: Option<String>,
    #[serde(deserialize_with = "opt_id")]
    pub id: Option<String>,

    #[serde(deserialize_with = "opt_string")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub chat_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub remote_jid: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub from: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub to: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub participant_phone: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub participant: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub author: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub connected_phone: Option<String>,

    #[serde(deserialize_with = "opt_bool")]
    pub from_me: Option<bool>,
    #[serde(deserialize_with = "opt_bool")]
    pub is_group: Option<bool>,

    /// Event time in milliseconds (sic).
    #[serde(deserialize_with = "opt_i64")]
    pub momment: Option<i64>,
    #[serde(deserialize_with = "opt_i64")]
    pub timestamp: Option<i64>,

    #[serde(deserialize_with = "opt_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "opt_i64")]
    pub ack: Option<i64>,

    #[serde(deserialize_with = "opt_string")]
    pub chat_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub sender_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub photo: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub sender_photo: Option<String>,

    #[serde(deserialize_with = "opt_text")]
    pub text: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub body: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub caption: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub media_url: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub mimetype: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub file_name: Option<String>,

    pub image: Option<GatewayMedia>,
    pub audio: Option<GatewayMedia>,
    pub video: Option<GatewayMedia>,
    pub document: Option<GatewayMedia>,
    pub sticker: Option<GatewayMedia>,
    pub location: Option<GatewayLocation>,
    pub contact: Option<GatewayContact>,
    pub reaction: Option<GatewayReaction>,

    #[serde(deserialize_with = "opt_id")]
    pub reference_message_id: Option<String>,
    #[serde(deserialize_with = "opt_id")]
    pub quoted_msg_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayMedia {
    #[serde(
        alias = "imageUrl",
        alias = "audioUrl",
        alias = "videoUrl",
        alias = "documentUrl",
        alias = "stickerUrl",
        deserialize_with = "opt_string"
    )]
    pub url: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub caption: Option<String>,
    #[serde(alias = "title", deserialize_with = "opt_string")]
    pub file_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewayLocation {
    #[serde(deserialize_with = "opt_f64")]
    pub latitude: Option<f64>,
    #[serde(deserialize_with = "opt_f64")]
    pub longitude: Option<f64>,
    #[serde(deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub address: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayContact {
    #[serde(deserialize_with = "opt_string")]
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GatewayReaction {
    #[serde(alias = "emoji", deserialize_with = "opt_string")]
    pub value: Option<String>,
}

/// Classified content of a message callback.
struct Content {
    kind: MessageKind,
    text: String,
    media_url: Option<String>,
    file_name: Option<String>,
}

impl GatewayPayload {
    pub fn from_value(raw: &Value) -> Result<Self, ZaplineError> {
        serde_json::from_value(raw.clone())
            .map_err(|e| ZaplineError::payload(format!("invalid gateway payload: {e}")))
    }

    pub fn into_event(self, ctx: &NormalizeContext<'_>) -> Result<InboundEvent, ZaplineError> {
        if self.is_status_callback() {
            return self.into_status();
        }
        if !self.has_content() && !self.has_chat_fields() {
            return Err(ZaplineError::payload(
                "gateway payload has neither content nor a chat",
            ));
        }
        Ok(InboundEvent::Message(self.into_message(ctx)))
    }

    fn callback_names(&self) -> impl Iterator<Item = String> + '_ {
        [self.kind.as_deref(), self.event.as_deref()]
            .into_iter()
            .flatten()
            .map(str::to_ascii_lowercase)
    }

    fn raw_status(&self) -> Option<RawStatus> {
        if let Some(ack) = self.ack {
            return Some(RawStatus::Ack(ack));
        }
        let status = self.status.as_deref()?.trim();
        Some(match status.parse::<i64>() {
            Ok(code) => RawStatus::Ack(code),
            Err(_) => RawStatus::Label(status.to_string()),
        })
    }

    fn is_status_callback(&self) -> bool {
        if self
            .callback_names()
            .any(|name| STATUS_CALLBACKS.contains(&name.as_str()))
        {
            return true;
        }
        self.raw_status().is_some() && !self.has_content() && !self.is_delivery_callback()
    }

    fn is_delivery_callback(&self) -> bool {
        self.callback_names().any(|name| name == DELIVERY_CALLBACK)
    }

    fn has_content(&self) -> bool {
        self.text.is_some()
            || self.body.is_some()
            || self.caption.is_some()
            || self.media_url.is_some()
            || self.image.is_some()
            || self.audio.is_some()
            || self.video.is_some()
            || self.document.is_some()
            || self.sticker.is_some()
            || self.location.is_some()
            || self.contact.is_some()
            || self.reaction.is_some()
    }

    fn has_chat_fields(&self) -> bool {
        self.phone.is_some()
            || self.chat_id.is_some()
            || self.remote_jid.is_some()
            || self.from.is_some()
            || self.to.is_some()
    }

    fn into_status(self) -> Result<InboundEvent, ZaplineError> {
        let raw_status = self
            .raw_status()
            .unwrap_or_else(|| RawStatus::Label(String::new()));
        let provider_message_id = self
            .message_id
            .or(self.id)
            .ok_or_else(|| ZaplineError::payload("gateway status without message id"))?;
        Ok(InboundEvent::StatusUpdate(StatusUpdate {
            provider_message_id,
            raw_status,
        }))
    }

    fn chat_fields(&self) -> [Option<&str>; 3] {
        [
            self.phone.as_deref(),
            self.chat_id.as_deref(),
            self.remote_jid.as_deref(),
        ]
    }

    fn participant_field(&self) -> Option<&str> {
        self.participant_phone
            .as_deref()
            .or(self.participant.as_deref())
            .or(self.author.as_deref())
    }

    fn detect_group(&self) -> bool {
        if self.is_group == Some(true) {
            return true;
        }
        let chats = || self.chat_fields().into_iter().flatten();
        let suffixed = chats().any(|c| {
            let c = c.trim().to_ascii_lowercase();
            c.ends_with("@g.us") || c.ends_with("-group")
        });
        if suffixed {
            return true;
        }
        self.participant_field().is_some()
            && chats().any(|c| phone::is_group_key(&phone::normalize(c)))
    }

    fn group_key(&self) -> String {
        self.chat_fields()
            .into_iter()
            .flatten()
            .map(phone::normalize_group)
            .find(|key| !key.is_empty())
            .unwrap_or_default()
    }

    /// First phone-shaped candidate, skipping whichever side is the tenant
    /// itself.
    fn individual_key(&self, from_me: bool, ctx: &NormalizeContext<'_>) -> String {
        let own = self.connected_phone.as_deref();
        let provably_other = |raw: &&str| ctx.is_own(raw, own) == Some(false);

        let to = if from_me {
            self.to.as_deref()
        } else {
            self.to.as_deref().filter(provably_other)
        };
        let from = if from_me {
            self.from.as_deref().filter(provably_other)
        } else {
            self.from.as_deref()
        };

        let [chat_phone, chat_id, remote_jid] = self.chat_fields();
        [chat_phone, chat_id, remote_jid, to, from]
            .into_iter()
            .flatten()
            .filter(|raw| ctx.is_own(raw, own) != Some(true))
            .map(phone::normalize)
            .find(|key| !key.is_empty() && !phone::is_group_key(key))
            .unwrap_or_default()
    }

    fn explicit_kind(&self) -> Option<MessageKind> {
        self.callback_names().find_map(|name| match name.as_str() {
            "chat" | "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "audio" | "ptt" | "voice" => Some(MessageKind::Audio),
            "video" => Some(MessageKind::Video),
            "document" => Some(MessageKind::Document),
            "sticker" => Some(MessageKind::Sticker),
            "location" => Some(MessageKind::Location),
            "vcard" | "contact" | "contacts" => Some(MessageKind::Contact),
            "reaction" => Some(MessageKind::Reaction),
            _ => None,
        })
    }

    fn structured_kind(&self) -> Option<MessageKind> {
        if self.reaction.is_some() {
            Some(MessageKind::Reaction)
        } else if self.location.is_some() {
            Some(MessageKind::Location)
        } else if self.contact.is_some() {
            Some(MessageKind::Contact)
        } else {
            None
        }
    }

    fn media_kind(&self) -> Option<MessageKind> {
        let sub_objects = [
            (MessageKind::Image, &self.image),
            (MessageKind::Audio, &self.audio),
            (MessageKind::Video, &self.video),
            (MessageKind::Document, &self.document),
            (MessageKind::Sticker, &self.sticker),
        ];
        if let Some((kind, _)) = sub_objects.iter().find(|(_, m)| m.is_some()) {
            return Some(*kind);
        }
        self.media_url.as_ref()?;
        let mime = self.mimetype.as_deref().unwrap_or_default();
        Some(if mime.starts_with("image/") {
            MessageKind::Image
        } else if mime.starts_with("audio/") {
            MessageKind::Audio
        } else if mime.starts_with("video/") {
            MessageKind::Video
        } else {
            MessageKind::Document
        })
    }

    fn media_of(&self, kind: MessageKind) -> Option<&GatewayMedia> {
        match kind {
            MessageKind::Image => self.image.as_ref(),
            MessageKind::Audio => self.audio.as_ref(),
            MessageKind::Video => self.video.as_ref(),
            MessageKind::Document => self.document.as_ref(),
            MessageKind::Sticker => self.sticker.as_ref(),
            _ => None,
        }
    }

    fn classify(&self) -> Content {
        let kind = self
            .explicit_kind()
            .or_else(|| self.structured_kind())
            .or_else(|| self.media_kind())
            .unwrap_or(MessageKind::Text);

        let plain = || {
            self.text
                .clone()
                .or_else(|| self.body.clone())
                .or_else(|| self.caption.clone())
                .unwrap_or_default()
        };

        match kind {
            MessageKind::Text => Content {
                kind,
                text: plain(),
                media_url: None,
                file_name: None,
            },
            MessageKind::Reaction => Content {
                kind,
                text: self
                    .reaction
                    .as_ref()
                    .and_then(|r| r.value.as_deref())
                    .map(reaction_text)
                    .unwrap_or_default(),
                media_url: None,
                file_name: None,
            },
            MessageKind::Location => {
                let text = self
                    .location
                    .as_ref()
                    .map(|l| {
                        location_text(
                            l.name.as_deref(),
                            l.address.as_deref(),
                            l.url.as_deref(),
                            l.latitude,
                            l.longitude,
                        )
                    })
                    .unwrap_or_default();
                Content {
                    kind,
                    text,
                    media_url: None,
                    file_name: None,
                }
            }
            MessageKind::Contact => Content {
                kind,
                text: self
                    .contact
                    .as_ref()
                    .and_then(|c| c.display_name.clone())
                    .unwrap_or_else(plain),
                media_url: None,
                file_name: None,
            },
            media_kind => {
                let media = self.media_of(media_kind);
                let media_url = media
                    .and_then(|m| m.url.clone())
                    .or_else(|| self.media_url.clone());
                let file_name = media
                    .and_then(|m| m.file_name.clone())
                    .or_else(|| self.file_name.clone());
                let caption = media
                    .and_then(|m| m.caption.as_deref())
                    .or(self.caption.as_deref())
                    .or(self.text.as_deref());
                Content {
                    kind: media_kind,
                    text: synthesize_text(media_kind, caption, file_name.as_deref()),
                    media_url,
                    file_name,
                }
            }
        }
    }

    fn into_message(self, ctx: &NormalizeContext<'_>) -> InboundMessage {
        let from_me = self.from_me.unwrap_or(false) || self.is_delivery_callback();
        let is_group = self.detect_group();

        // Send confirmations repeat the chat but none of the content.
        let content = if self.is_delivery_callback() && !self.has_content() {
            Content {
                kind: MessageKind::Text,
                text: String::new(),
                media_url: None,
                file_name: None,
            }
        } else {
            self.classify()
        };

        let (contact_key, group_sender_phone, group_sender_name) = if is_group {
            let sender = self
                .participant_field()
                .map(phone::normalize)
                .filter(|p| !p.is_empty());
            (self.group_key(), sender, self.sender_name.clone())
        } else {
            (self.individual_key(from_me, ctx), None, None)
        };

        let (contact_name, contact_photo) = match (is_group, from_me) {
            (true, _) => (None, None),
            (false, false) => (
                self.sender_name.clone().or_else(|| self.chat_name.clone()),
                self.sender_photo.clone().or_else(|| self.photo.clone()),
            ),
            (false, true) => (self.chat_name.clone(), self.photo.clone()),
        };

        InboundMessage {
            contact_key,
            is_group,
            from_me,
            provider_message_id: self.message_id.or(self.id),
            timestamp: self
                .momment
                .or(self.timestamp)
                .and_then(timestamp_from_epoch),
            kind: content.kind,
            text: content.text,
            media_url: content.media_url,
            file_name: content.file_name,
            group_sender_phone,
            group_sender_name,
            quoted_message_id: self.reference_message_id.or(self.quoted_msg_id),
            contact_name,
            contact_photo,
        }
    }
}
