// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators of the ingestion pipeline.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod broadcast;
pub mod provider;
pub mod storage;

pub use adapter::PluginAdapter;
pub use broadcast::Broadcaster;
pub use provider::ProviderClient;
pub use storage::ConversationStore;
