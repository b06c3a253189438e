// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store trait.
//!
//! Uniqueness conflicts are part of the contract, not errors: every create
//! returns [`CreateOrGet`], and every guarded update returns `bool`. An `Err`
//! always means the backend itself failed.

use async_trait::async_trait;

use crate::error::ZaplineError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Contact, Conversation, CreateOrGet, DeliveryStatus, EchoSignature, MergeReport, Message,
    NewContact, NewConversation, NewMessage,
};

/// Persistence for contacts, conversations, and messages.
#[async_trait]
pub trait ConversationStore: PluginAdapter {
    /// Opens the backend and applies migrations.
    async fn initialize(&self) -> Result<(), ZaplineError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), ZaplineError>;

    // --- Contacts ---

    /// Contacts of `tenant_id` stored under any of `phones`.
    async fn find_contacts_by_phones(
        &self,
        tenant_id: &str,
        phones: &[String],
    ) -> Result<Vec<Contact>, ZaplineError>;

    async fn create_or_get_contact(
        &self,
        contact: &NewContact,
    ) -> Result<CreateOrGet<Contact>, ZaplineError>;

    /// Fill a contact's name and photo where they are still missing.
    async fn update_contact_profile(
        &self,
        contact_id: &str,
        name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<(), ZaplineError>;

    /// Move `last_contact_at` forward to `at`; never backward.
    async fn touch_contact(&self, contact_id: &str, at: &str) -> Result<(), ZaplineError>;

    // --- Conversations ---

    /// Non-closed conversations of `tenant_id` stored under any of `phones`,
    /// newest first.
    async fn find_open_conversations(
        &self,
        tenant_id: &str,
        phones: &[String],
    ) -> Result<Vec<Conversation>, ZaplineError>;

    async fn create_or_get_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<CreateOrGet<Conversation>, ZaplineError>;

    /// Rewrite a conversation's phone. Returns `false` when another open
    /// conversation already owns that phone.
    async fn update_conversation_phone(
        &self,
        conversation_id: &str,
        phone: &str,
    ) -> Result<bool, ZaplineError>;

    /// Attach a contact to a conversation that has none.
    async fn link_contact(
        &self,
        conversation_id: &str,
        contact_id: &str,
    ) -> Result<(), ZaplineError>;

    /// Move `last_activity_at` forward to `at`; never backward.
    async fn touch_conversation(&self, conversation_id: &str, at: &str)
    -> Result<(), ZaplineError>;

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, ZaplineError>;

    /// Move every child row of `duplicate_ids` onto `canonical_id`, then
    /// delete the duplicates (or close those whose delete is refused).
    ///
    /// Idempotent: merging already-merged ids is a no-op.
    async fn merge_conversations(
        &self,
        canonical_id: &str,
        duplicate_ids: &[String],
    ) -> Result<MergeReport, ZaplineError>;

    // --- Messages ---

    async fn find_message_by_provider_id(
        &self,
        conversation_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>, ZaplineError>;

    /// Newest outbound row of `conversation_id` with no provider id, created at
    /// or after `since`, matching `signature`.
    async fn find_unconfirmed_outbound(
        &self,
        conversation_id: &str,
        since: &str,
        signature: &EchoSignature,
    ) -> Result<Option<Message>, ZaplineError>;

    /// Attach a provider id and status to a local outbound row.
    ///
    /// Applies only while the row's provider id is still NULL. Returns `false`
    /// when the row was already confirmed or the id is taken in its
    /// conversation.
    async fn confirm_outbound(
        &self,
        message_id: &str,
        provider_message_id: &str,
        status: &DeliveryStatus,
    ) -> Result<bool, ZaplineError>;

    async fn insert_message(
        &self,
        message: &NewMessage,
    ) -> Result<CreateOrGet<Message>, ZaplineError>;

    /// Rows carrying `provider_message_id`. `tenant_id` scopes the search
    /// through the owning conversation; `None` searches every tenant.
    async fn find_messages_for_status(
        &self,
        tenant_id: Option<&str>,
        provider_message_id: &str,
    ) -> Result<Vec<Message>, ZaplineError>;

    /// Compare-and-set a message status. Returns `false` if the stored status
    /// was no longer `expected`.
    async fn set_message_status(
        &self,
        message_id: &str,
        expected: &DeliveryStatus,
        status: &DeliveryStatus,
    ) -> Result<bool, ZaplineError>;

    /// Messages of a conversation, oldest first, at most `limit`.
    async fn list_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ZaplineError>;

    async fn count_messages(&self, conversation_id: &str) -> Result<usize, ZaplineError>;
}
