// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider payload normalization.
//!
//! Each provider adapter deserializes one raw element into its typed shape
//! and converts that shape into the canonical [`InboundEvent`]. Nothing
//! here touches the store.

pub mod cloud;
pub mod gateway;
pub mod lenient;

use serde_json::Value;

use zapline_core::phone;
use zapline_core::types::{InboundEvent, MessageKind, ProviderKind};
use zapline_core::ZaplineError;

/// Per-tenant facts the adapters need to tell self from contact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeContext<'a> {
    /// The tenant's own connected number, canonicalized.
    pub own_number: Option<&'a str>,
}

impl NormalizeContext<'_> {
    /// `Some(true)` when `raw` is the tenant's own number, `Some(false)` when
    /// it is provably someone else, `None` when unknown.
    pub(crate) fn is_own(&self, raw: &str, payload_own: Option<&str>) -> Option<bool> {
        let candidate = phone::dedupe_key(raw);
        if candidate.is_empty() {
            return None;
        }
        let own = self
            .own_number
            .map(phone::dedupe_key)
            .or_else(|| payload_own.map(phone::dedupe_key))
            .filter(|own| !own.is_empty())?;
        Some(own == candidate)
    }
}

/// The typed shape a raw element deserialized into, before conversion.
#[derive(Debug)]
pub enum RawEventShape {
    Cloud(Box<cloud::CloudElement>),
    Gateway(Box<gateway::GatewayPayload>),
}

impl RawEventShape {
    /// Deserialize `raw` with the adapter for `provider`.
    pub fn parse(provider: ProviderKind, raw: &Value) -> Result<Self, ZaplineError> {
        if !raw.is_object() {
            return Err(ZaplineError::payload("element is not a JSON object"));
        }
        match provider {
            ProviderKind::Cloud => cloud::CloudElement::from_value(raw)
                .map(|e| Self::Cloud(Box::new(e))),
            ProviderKind::Gateway => gateway::GatewayPayload::from_value(raw)
                .map(|p| Self::Gateway(Box::new(p))),
        }
    }

    pub fn into_event(self, ctx: &NormalizeContext<'_>) -> Result<InboundEvent, ZaplineError> {
        match self {
            Self::Cloud(element) => element.into_event(ctx),
            Self::Gateway(payload) => payload.into_event(ctx),
        }
    }
}

/// Normalize one raw element from `provider` into a canonical event.
///
/// Fails with [`ZaplineError::Payload`] when the element matches no known
/// shape for that provider.
pub fn normalize(
    provider: ProviderKind,
    raw: &Value,
    ctx: &NormalizeContext<'_>,
) -> Result<InboundEvent, ZaplineError> {
    RawEventShape::parse(provider, raw)?.into_event(ctx)
}

/// Display text for a message with no body of its own.
pub(crate) fn synthesize_text(
    kind: MessageKind,
    caption: Option<&str>,
    file_name: Option<&str>,
) -> String {
    if let Some(caption) = caption.map(str::trim).filter(|c| !c.is_empty()) {
        return caption.to_string();
    }
    if kind == MessageKind::Document {
        if let Some(name) = file_name.map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
    }
    kind.placeholder().unwrap_or_default().to_string()
}

pub(crate) fn reaction_text(emoji: &str) -> String {
    format!("Reaction: {emoji}")
}

/// `name • address`, falling back to the link and then to `lat,lng`.
pub(crate) fn location_text(
    name: Option<&str>,
    address: Option<&str>,
    url: Option<&str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> String {
    let parts: Vec<&str> = [name, address]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" • ");
    }
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => format!("{lat},{lng}"),
        _ => String::new(),
    }
}
