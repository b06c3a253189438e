// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Zapline.
//!
//! This crate provides the collaborator traits, error type, domain model,
//! and phone canonicalization used throughout the workspace.

pub mod error;
pub mod phone;
pub mod traits;
pub mod types;

pub use error::ZaplineError;
pub use types::{
    AdapterType, Contact, Conversation, ConversationStatus, CreateOrGet, DeliveryStatus,
    Direction, EchoSignature, HealthStatus, InboundEvent, InboundMessage, MergeReport, Message,
    MessageKind, NewContact, NewConversation, NewMessage, OutboundContent, ProviderKind,
    RawStatus, SendReceipt, StatusUpdate,
};

pub use traits::broadcast::{
    EVENT_MESSAGE_NEW, EVENT_MESSAGE_STATUS, conversation_room, department_room, tenant_room,
};
pub use traits::{Broadcaster, ConversationStore, PluginAdapter, ProviderClient};
