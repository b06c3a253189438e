// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`ConversationStore`] trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use zapline_config::model::StorageConfig;
use zapline_core::types::{
    Contact, Conversation, CreateOrGet, DeliveryStatus, EchoSignature, MergeReport, Message,
    NewContact, NewConversation, NewMessage,
};
use zapline_core::{AdapterType, ConversationStore, HealthStatus, PluginAdapter, ZaplineError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation store.
///
/// The database is opened on the first call to
/// [`ConversationStore::initialize`].
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn from_database(config: StorageConfig, db: Database) -> Self {
        Self {
            config,
            db: OnceCell::from(db),
        }
    }

    /// The underlying database, or an error before `initialize`.
    pub fn database(&self) -> Result<&Database, ZaplineError> {
        self.db.get().ok_or_else(|| ZaplineError::Storage {
            source: "store not initialized, call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        let db = self.database()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn initialize(&self) -> Result<(), ZaplineError> {
        let db = Database::open_with(&self.config).await?;
        self.db.set(db).map_err(|_| ZaplineError::Storage {
            source: "store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ZaplineError> {
        self.database()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Contacts ---

    async fn find_contacts_by_phones(
        &self,
        tenant_id: &str,
        phones: &[String],
    ) -> Result<Vec<Contact>, ZaplineError> {
        queries::contacts::find_by_phones(self.database()?, tenant_id, phones).await
    }

    async fn create_or_get_contact(
        &self,
        contact: &NewContact,
    ) -> Result<CreateOrGet<Contact>, ZaplineError> {
        queries::contacts::create_or_get(self.database()?, contact).await
    }

    async fn update_contact_profile(
        &self,
        contact_id: &str,
        name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<(), ZaplineError> {
        queries::contacts::update_profile(self.database()?, contact_id, name, photo_url).await
    }

    async fn touch_contact(&self, contact_id: &str, at: &str) -> Result<(), ZaplineError> {
        queries::contacts::touch(self.database()?, contact_id, at).await
    }

    // --- Conversations ---

    async fn find_open_conversations(
        &self,
        tenant_id: &str,
        phones: &[String],
    ) -> Result<Vec<Conversation>, ZaplineError> {
        queries::conversations::find_open(self.database()?, tenant_id, phones).await
    }

    async fn create_or_get_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<CreateOrGet<Conversation>, ZaplineError> {
        queries::conversations::create_or_get(self.database()?, conversation).await
    }

    async fn update_conversation_phone(
        &self,
        conversation_id: &str,
        phone: &str,
    ) -> Result<bool, ZaplineError> {
        queries::conversations::update_phone(self.database()?, conversation_id, phone).await
    }

    async fn link_contact(
        &self,
        conversation_id: &str,
        contact_id: &str,
    ) -> Result<(), ZaplineError> {
        queries::conversations::link_contact(self.database()?, conversation_id, contact_id).await
    }

    async fn touch_conversation(
        &self,
        conversation_id: &str,
        at: &str,
    ) -> Result<(), ZaplineError> {
        queries::conversations::touch(self.database()?, conversation_id, at).await
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, ZaplineError> {
        queries::conversations::get(self.database()?, conversation_id).await
    }

    async fn merge_conversations(
        &self,
        canonical_id: &str,
        duplicate_ids: &[String],
    ) -> Result<MergeReport, ZaplineError> {
        queries::merge::merge_conversations(self.database()?, canonical_id, duplicate_ids).await
    }

    // --- Messages ---

    async fn find_message_by_provider_id(
        &self,
        conversation_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>, ZaplineError> {
        queries::messages::find_by_provider_id(self.database()?, conversation_id, provider_message_id)
            .await
    }

    async fn find_unconfirmed_outbound(
        &self,
        conversation_id: &str,
        since: &str,
        signature: &EchoSignature,
    ) -> Result<Option<Message>, ZaplineError> {
        queries::messages::find_unconfirmed_outbound(
            self.database()?,
            conversation_id,
            since,
            signature,
        )
        .await
    }

    async fn confirm_outbound(
        &self,
        message_id: &str,
        provider_message_id: &str,
        status: &DeliveryStatus,
    ) -> Result<bool, ZaplineError> {
        queries::messages::confirm_outbound(self.database()?, message_id, provider_message_id, status)
            .await
    }

    async fn insert_message(
        &self,
        message: &NewMessage,
    ) -> Result<CreateOrGet<Message>, ZaplineError> {
        queries::messages::insert(self.database()?, message).await
    }

    async fn find_messages_for_status(
        &self,
        tenant_id: Option<&str>,
        provider_message_id: &str,
    ) -> Result<Vec<Message>, ZaplineError> {
        queries::messages::find_for_status(self.database()?, tenant_id, provider_message_id).await
    }

    async fn set_message_status(
        &self,
        message_id: &str,
        expected: &DeliveryStatus,
        status: &DeliveryStatus,
    ) -> Result<bool, ZaplineError> {
        queries::messages::set_status(self.database()?, message_id, expected, status).await
    }

    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ZaplineError> {
        queries::messages::list(self.database()?, conversation_id, limit).await
    }

    async fn count_messages(&self, conversation_id: &str) -> Result<usize, ZaplineError> {
        queries::messages::count(self.database()?, conversation_id).await
    }
}
