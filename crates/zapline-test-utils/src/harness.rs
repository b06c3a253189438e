// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness backed by a real SQLite store.
//!
//! Every harness owns its own temp directory, so tests never share a
//! database file unless they open a second handle on [`TestHarness::database_path`]
//! on purpose.

use std::sync::Arc;
use std::time::Duration;

use zapline_config::model::StorageConfig;
use zapline_core::types::{
    Conversation, DeliveryStatus, Direction, Message, MessageKind, NewConversation, NewMessage,
};
use zapline_core::ConversationStore;
use zapline_storage::queries::{conversations, messages};
use zapline_storage::{Database, SqliteStore};

/// How long [`TestHarness::wait_for_messages`] polls before giving up.
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_INTERVAL: Duration = Duration::from_millis(20);

pub struct TestHarness {
    store: Arc<SqliteStore>,
    config: StorageConfig,
    _dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create and initialize a store in a fresh temp directory.
    pub async fn new() -> Self {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let config = StorageConfig {
            database_path: dir.path().join("zapline.db").to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let store = SqliteStore::new(config.clone());
        store.initialize().await.expect("store initializes");
        Self {
            store: Arc::new(store),
            config,
            _dir: dir,
        }
    }

    pub fn store(&self) -> Arc<dyn ConversationStore> {
        self.store.clone()
    }

    pub fn sqlite(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    pub fn database(&self) -> &Database {
        self.store.database().expect("store is initialized")
    }

    pub fn database_path(&self) -> &str {
        &self.config.database_path
    }

    pub fn storage_config(&self) -> StorageConfig {
        self.config.clone()
    }

    /// Insert an open individual conversation stored under `phone` verbatim.
    pub async fn seed_conversation(&self, tenant_id: &str, phone: &str) -> Conversation {
        let new = NewConversation {
            tenant_id: tenant_id.to_string(),
            phone: phone.to_string(),
            contact_id: None,
            is_group: false,
            department_id: None,
        };
        conversations::create_or_get(self.database(), &new)
            .await
            .expect("seed conversation")
            .into_inner()
    }

    /// Insert an inbound text message carrying `provider_message_id`.
    pub async fn seed_message(&self, conversation_id: &str, provider_message_id: &str) -> Message {
        let new = NewMessage {
            conversation_id: conversation_id.to_string(),
            provider_message_id: Some(provider_message_id.to_string()),
            direction: Direction::Inbound,
            kind: MessageKind::Text,
            status: DeliveryStatus::Delivered,
            body: format!("seeded {provider_message_id}"),
            media_url: None,
            file_name: None,
            group_sender_phone: None,
            group_sender_name: None,
            quoted_message_id: None,
            created_at: None,
        };
        messages::insert(self.database(), &new)
            .await
            .expect("seed message")
            .into_inner()
    }

    pub async fn conversations(&self, tenant_id: &str) -> Vec<Conversation> {
        conversations::list_for_tenant(self.database(), tenant_id)
            .await
            .expect("list conversations")
    }

    /// The tenant's single conversation. Panics when there are zero or several.
    pub async fn only_conversation(&self, tenant_id: &str) -> Conversation {
        let mut all = self.conversations(tenant_id).await;
        assert_eq!(
            all.len(),
            1,
            "expected exactly one conversation for {tenant_id}, found {all:?}"
        );
        all.remove(0)
    }

    pub async fn messages(&self, conversation_id: &str) -> Vec<Message> {
        messages::list(self.database(), conversation_id, usize::MAX)
            .await
            .expect("list messages")
    }

    pub async fn message_count(&self, conversation_id: &str) -> usize {
        messages::count(self.database(), conversation_id)
            .await
            .expect("count messages")
    }

    /// Poll until `conversation_id` holds at least `n` messages.
    pub async fn wait_for_messages(&self, conversation_id: &str, n: usize) -> Result<(), String> {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let count = self.message_count(conversation_id).await;
            if count >= n {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(format!(
                    "conversation {conversation_id} has {count} messages after {WAIT_TIMEOUT:?}, wanted {n}"
                ));
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
    }
}
