// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound provider client trait.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{OutboundContent, ProviderKind, SendReceipt};

/// Client for a messaging provider's outbound API.
///
/// Only [`send`](ProviderClient::send) and
/// [`get_chat_history`](ProviderClient::get_chat_history) are required; the
/// per-kind helpers build the matching [`OutboundContent`].
#[async_trait]
pub trait ProviderClient: PluginAdapter {
    /// Which provider family this client talks to.
    fn kind(&self) -> ProviderKind;

    /// Send `content` to `to`, a send-format phone or a group target.
    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SendReceipt, ZaplineError>;

    /// Fetch up to `limit` raw history payloads for a contact, oldest first.
    async fn get_chat_history(
        &self,
        contact_key: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, ZaplineError>;

    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Text {
            body: body.to_string(),
        };
        self.send(to, &content).await
    }

    async fn send_image(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Image {
            url: url.to_string(),
            caption: caption.map(str::to_string),
        };
        self.send(to, &content).await
    }

    async fn send_audio(&self, to: &str, url: &str) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Audio {
            url: url.to_string(),
        };
        self.send(to, &content).await
    }

    async fn send_video(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Video {
            url: url.to_string(),
            caption: caption.map(str::to_string),
        };
        self.send(to, &content).await
    }

    async fn send_document(
        &self,
        to: &str,
        url: &str,
        file_name: Option<&str>,
    ) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Document {
            url: url.to_string(),
            file_name: file_name.map(str::to_string),
        };
        self.send(to, &content).await
    }

    async fn send_sticker(&self, to: &str, url: &str) -> Result<SendReceipt, ZaplineError> {
        let content = OutboundContent::Sticker {
            url: url.to_string(),
        };
        self.send(to, &content).await
    }
}
