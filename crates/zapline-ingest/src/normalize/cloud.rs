// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Official cloud API elements.
//!
//! The envelope splitter hands over one element per message, status, or
//! echo, each carrying the `contacts` and `metadata` of its change. Bare
//! message and status objects (as returned by history fetches) are accepted
//! too.

use serde::Deserialize;
use serde_json::Value;

use zapline_core::phone;
use zapline_core::types::{
    InboundEvent, InboundMessage, MessageKind, RawStatus, StatusUpdate, timestamp_from_epoch,
};
use zapline_core::ZaplineError;

use super::lenient::{list, opt_bool, opt_f64, opt_i64, opt_string};
use super::{NormalizeContext, location_text, reaction_text, synthesize_text};

/// Text stored for message types this adapter does not understand.
pub const UNSUPPORTED_TEXT: &str = "(unsupported)";

/// One message, status, or echo with its change context.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudElement {
    pub message: Option<CloudMessage>,
    pub status: Option<CloudStatus>,
    #[serde(deserialize_with = "list")]
    pub contacts: Vec<CloudContact>,
    pub metadata: Option<CloudMetadata>,
    #[serde(deserialize_with = "opt_bool")]
    pub echo: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudMessage {
    #[serde(deserialize_with = "opt_string")]
    pub from: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub to: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opt_i64")]
    pub timestamp: Option<i64>,
    #[serde(rename = "type", deserialize_with = "opt_string")]
    pub kind: Option<String>,
    pub text: Option<CloudText>,
    pub image: Option<CloudMedia>,
    pub audio: Option<CloudMedia>,
    pub video: Option<CloudMedia>,
    pub document: Option<CloudMedia>,
    pub sticker: Option<CloudMedia>,
    pub location: Option<CloudLocation>,
    #[serde(deserialize_with = "list")]
    pub contacts: Vec<CloudContactCard>,
    pub reaction: Option<CloudReaction>,
    pub button: Option<CloudButton>,
    pub interactive: Option<CloudInteractive>,
    pub context: Option<CloudContext>,
    #[serde(deserialize_with = "opt_string")]
    pub group_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudText {
    #[serde(deserialize_with = "opt_string")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CloudMedia {
    #[serde(deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub link: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub caption: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub filename: Option<String>,
}

impl CloudMedia {
    /// Direct link when present, otherwise an opaque reference to the media id.
    fn reference(&self) -> Option<String> {
        self.link
            .clone()
            .or_else(|| self.id.as_ref().map(|id| format!("cloud-media:{id}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudLocation {
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
#[serde(default)]
pub struct CloudContactCard {
    pub name: Option<CloudCardName>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudCardName {
    #[serde(deserialize_with = "opt_string")]
    pub formatted_name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub first_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudReaction {
    #[serde(deserialize_with = "opt_string")]
    pub message_id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub emoji: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudButton {
    #[serde(deserialize_with = "opt_string")]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudInteractive {
    pub button_reply: Option<CloudReply>,
    pub list_reply: Option<CloudReply>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudReply {
    #[serde(deserialize_with = "opt_string")]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudContext {
    #[serde(deserialize_with = "opt_string")]
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudStatus {
    #[serde(deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub recipient_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudContact {
    #[serde(deserialize_with = "opt_string")]
    pub wa_id: Option<String>,
    pub profile: Option<CloudProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudProfile {
    #[serde(deserialize_with = "opt_string")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CloudMetadata {
    #[serde(deserialize_with = "opt_string")]
    pub display_phone_number: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub phone_number_id: Option<String>,
}

fn invalid(e: serde_json::Error) -> ZaplineError {
    ZaplineError::payload(format!("invalid cloud element: {e}"))
}

impl CloudElement {
    /// Accept a split element, a bare message, or a bare status.
    pub fn from_value(raw: &Value) -> Result<Self, ZaplineError> {
        let is_object = |key: &str| raw.get(key).is_some_and(Value::is_object);

        if is_object("message") || is_object("status") {
            return serde_json::from_value(raw.clone()).map_err(invalid);
        }
        if raw.get("type").is_some() && (raw.get("from").is_some() || raw.get("id").is_some()) {
            let message = serde_json::from_value(raw.clone()).map_err(invalid)?;
            return Ok(Self {
                message: Some(message),
                ..Self::default()
            });
        }
        if raw.get("status").is_some_and(Value::is_string) && raw.get("id").is_some() {
            let status = serde_json::from_value(raw.clone()).map_err(invalid)?;
            return Ok(Self {
                status: Some(status),
                ..Self::default()
            });
        }
        Err(ZaplineError::payload(
            "cloud element carries neither a message nor a status",
        ))
    }

    pub fn into_event(self, ctx: &NormalizeContext<'_>) -> Result<InboundEvent, ZaplineError> {
        if let Some(message) = self.message {
            let own = self
                .metadata
                .as_ref()
                .and_then(|m| m.display_phone_number.as_deref());
            let echo = self.echo.unwrap_or(false);
            return Ok(InboundEvent::Message(message.into_inbound(
                echo,
                &self.contacts,
                own,
                ctx,
            )));
        }

        let status = self
            .status
            .ok_or_else(|| ZaplineError::payload("empty cloud element"))?;
        let provider_message_id = status
            .id
            .ok_or_else(|| ZaplineError::payload("cloud status without message id"))?;
        Ok(InboundEvent::StatusUpdate(StatusUpdate {
            provider_message_id,
            raw_status: RawStatus::Label(status.status.unwrap_or_default()),
        }))
    }
}

impl CloudMessage {
    fn into_inbound(
        self,
        echo: bool,
        contacts: &[CloudContact],
        payload_own: Option<&str>,
        ctx: &NormalizeContext<'_>,
    ) -> InboundMessage {
        let kind_label = self.kind.clone().unwrap_or_default().to_ascii_lowercase();
        let (kind, text, media) = self.content(&kind_label);

        let is_group = self.group_id.is_some();
        let (contact_key, group_sender_phone) = if is_group {
            let key = self.group_id.as_deref().map(phone::normalize_group).unwrap_or_default();
            let sender = if echo {
                None
            } else {
                self.from.as_deref().map(phone::normalize).filter(|p| !p.is_empty())
            };
            (key, sender)
        } else {
            (self.individual_key(echo, contacts, payload_own, ctx), None)
        };

        let profile_name = || {
            contacts
                .iter()
                .find_map(|c| c.profile.as_ref().and_then(|p| p.name.clone()))
        };
        let (contact_name, group_sender_name) = match (is_group, echo) {
            (false, false) => (profile_name(), None),
            (true, false) => (None, profile_name()),
            _ => (None, None),
        };

        InboundMessage {
            contact_key,
            is_group,
            from_me: echo,
            provider_message_id: self.id,
            timestamp: self.timestamp.and_then(timestamp_from_epoch),
            kind,
            text,
            media_url: media.as_ref().and_then(CloudMedia::reference),
            file_name: media.and_then(|m| m.filename),
            group_sender_phone,
            group_sender_name,
            quoted_message_id: self.context.and_then(|c| c.id),
            contact_name,
            contact_photo: None,
        }
    }

    fn individual_key(
        &self,
        echo: bool,
        contacts: &[CloudContact],
        payload_own: Option<&str>,
        ctx: &NormalizeContext<'_>,
    ) -> String {
        let wa_id = contacts.iter().find_map(|c| c.wa_id.as_deref());
        let from = self.from.as_deref();
        let to = self.to.as_deref();
        let candidates: Vec<Option<&str>> = if echo {
            // The sender of an echo is the business number itself.
            let from = from.filter(|f| ctx.is_own(f, payload_own) == Some(false));
            vec![to, wa_id, from]
        } else {
            vec![from, wa_id]
        };
        candidates
            .into_iter()
            .flatten()
            .filter(|c| ctx.is_own(c, payload_own) != Some(true))
            .map(phone::normalize)
            .find(|key| !key.is_empty())
            .unwrap_or_default()
    }

    /// Kind, display text, and the media object (if any).
    fn content(&self, kind_label: &str) -> (MessageKind, String, Option<CloudMedia>) {
        let media = |kind: MessageKind, media: &Option<CloudMedia>| {
            let m = media.as_ref();
            let text = synthesize_text(
                kind,
                m.and_then(|m| m.caption.as_deref()),
                m.and_then(|m| m.filename.as_deref()),
            );
            (kind, text, m.cloned())
        };

        match kind_label {
            "text" => (
                MessageKind::Text,
                self.text
                    .as_ref()
                    .and_then(|t| t.body.clone())
                    .unwrap_or_default(),
                None,
            ),
            "image" => media(MessageKind::Image, &self.image),
            "audio" | "voice" => media(MessageKind::Audio, &self.audio),
            "video" => media(MessageKind::Video, &self.video),
            "document" => media(MessageKind::Document, &self.document),
            "sticker" => media(MessageKind::Sticker, &self.sticker),
            "location" => {
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
                (MessageKind::Location, text, None)
            }
            "contacts" => {
                let text = self
                    .contacts
                    .iter()
                    .filter_map(|c| c.name.as_ref())
                    .filter_map(|n| n.formatted_name.clone().or_else(|| n.first_name.clone()))
                    .collect::<Vec<_>>()
                    .join(", ");
                (MessageKind::Contact, text, None)
            }
            "reaction" => {
                let text = self
                    .reaction
                    .as_ref()
                    .and_then(|r| r.emoji.as_deref())
                    .map(reaction_text)
                    .unwrap_or_default();
                (MessageKind::Reaction, text, None)
            }
            "button" => (
                MessageKind::Text,
                self.button
                    .as_ref()
                    .and_then(|b| b.text.clone())
                    .unwrap_or_default(),
                None,
            ),
            "interactive" => {
                let title = self.interactive.as_ref().and_then(|i| {
                    i.button_reply
                        .as_ref()
                        .or(i.list_reply.as_ref())
                        .and_then(|r| r.title.clone())
                });
                (MessageKind::Text, title.unwrap_or_default(), None)
            }
            _ => (MessageKind::Text, UNSUPPORTED_TEXT.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Value) -> InboundEvent {
        CloudElement::from_value(&raw)
            .unwrap()
            .into_event(&NormalizeContext::default())
            .unwrap()
    }

    fn message(raw: Value) -> InboundMessage {
        match parse(raw) {
            InboundEvent::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn text_message_with_profile() {
        let m = message(json!({
            "message": {
                "from": "5534999999999", "id": "wamid.A", "timestamp": "1700000000",
                "type": "text", "text": {"body": "oi"}
            },
            "contacts": [{"wa_id": "5534999999999", "profile": {"name": "Ana"}}],
            "metadata": {"display_phone_number": "5534911112222", "phone_number_id": "1"}
        }));
        assert_eq!(m.contact_key, "5534999999999");
        assert!(!m.from_me && !m.is_group);
        assert_eq!(m.provider_message_id.as_deref(), Some("wamid.A"));
        assert_eq!(m.text, "oi");
        assert_eq!(m.contact_name.as_deref(), Some("Ana"));
        assert_eq!(m.timestamp.as_deref(), Some("2023-11-14T22:13:20.000Z"));
    }

    #[test]
    fn media_without_link_uses_media_reference() {
        let m = message(json!({
            "message": {
                "from": "553499999999", "id": "wamid.B", "type": "document",
                "document": {"id": "MEDIA1", "filename": "boleto.pdf"}
            }
        }));
        assert_eq!(m.kind, MessageKind::Document);
        assert_eq!(m.media_url.as_deref(), Some("cloud-media:MEDIA1"));
        assert_eq!(m.text, "boleto.pdf");
        assert_eq!(m.file_name.as_deref(), Some("boleto.pdf"));
    }

    #[test]
    fn null_contact_lists_still_parse() {
        let m = message(json!({
            "message": {
                "from": "5534999999999", "id": "wamid.N", "type": "text",
                "text": {"body": "sem perfil"}, "contacts": null
            },
            "contacts": null,
            "metadata": null
        }));
        assert_eq!(m.contact_key, "5534999999999");
        assert_eq!(m.text, "sem perfil");
        assert!(m.contact_name.is_none());
    }

    #[test]
    fn echo_takes_contact_from_recipient() {
        let m = message(json!({
            "message": {
                "from": "5534911112222", "to": "34988887777", "id": "wamid.C",
                "type": "text", "text": {"body": "ok"}
            },
            "metadata": {"display_phone_number": "5534911112222"},
            "echo": true
        }));
        assert!(m.from_me);
        assert_eq!(m.contact_key, "5534988887777");
        assert!(m.contact_name.is_none());
    }

    #[test]
    fn group_message_keeps_sender_on_message() {
        let m = message(json!({
            "message": {
                "from": "5534999999999", "id": "wamid.G", "type": "text",
                "text": {"body": "bom dia"}, "group_id": "120363041234567890@g.us"
            },
            "contacts": [{"wa_id": "5534999999999", "profile": {"name": "Bia"}}]
        }));
        assert!(m.is_group);
        assert_eq!(m.contact_key, "120363041234567890");
        assert_eq!(m.group_sender_phone.as_deref(), Some("5534999999999"));
        assert_eq!(m.group_sender_name.as_deref(), Some("Bia"));
        assert!(m.contact_name.is_none());
    }

    #[test]
    fn statuses_and_unsupported_types() {
        match parse(json!({"status": {"id": "wamid.A", "status": "read"}})) {
            InboundEvent::StatusUpdate(s) => {
                assert_eq!(s.provider_message_id, "wamid.A");
                assert_eq!(s.raw_status, RawStatus::Label("read".into()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse(json!({"id": "wamid.A", "status": "delivered", "recipient_id": "5534"})),
            InboundEvent::StatusUpdate(_)
        ));

        let m = message(json!({"from": "5534999999999", "id": "x", "type": "order"}));
        assert_eq!(m.text, UNSUPPORTED_TEXT);
    }

    #[test]
    fn reactions_locations_and_replies() {
        let r = message(json!({
            "from": "5534999999999", "id": "r", "type": "reaction",
            "reaction": {"message_id": "wamid.A", "emoji": "👍"}
        }));
        assert_eq!(r.kind, MessageKind::Reaction);
        assert_eq!(r.text, "Reaction: 👍");

        let l = message(json!({
            "from": "5534999999999", "id": "l", "type": "location",
            "location": {"latitude": -18.9, "longitude": -48.2}
        }));
        assert_eq!(l.text, "-18.9,-48.2");

        let i = message(json!({
            "from": "5534999999999", "id": "i", "type": "interactive",
            "interactive": {"type": "list_reply", "list_reply": {"id": "1", "title": "Suporte"}},
            "context": {"id": "wamid.Q"}
        }));
        assert_eq!(i.text, "Suporte");
        assert_eq!(i.quoted_message_id.as_deref(), Some("wamid.Q"));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let err = CloudElement::from_value(&json!({"object": "whatsapp_business_account"}))
            .unwrap_err();
        assert!(matches!(err, ZaplineError::Payload { .. }));
    }
}
