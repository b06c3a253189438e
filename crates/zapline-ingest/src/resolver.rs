// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact and conversation resolution.
//!
//! Lookups always go through every phone variant, and every row is written
//! under the variant's storage key. The partial unique index on open
//! conversations is the only lock: two variants of one contact insert the
//! same phone, so losing a create race returns the winner's row. Duplicates
//! left behind by older data are merged into the newest one the next time
//! anyone resolves that contact.

use std::sync::Arc;

use tracing::{debug, info, warn};

use zapline_core::phone;
use zapline_core::types::{Contact, Conversation, CreateOrGet, NewContact, NewConversation};
use zapline_core::{ConversationStore, ZaplineError};
use zapline_prometheus::recording;

use crate::tenants::TenantDirectory;

/// Outcome of [`ConversationResolver::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub conversation: Conversation,
    /// `true` only for the caller whose insert created the row.
    pub created: bool,
}

pub struct ConversationResolver {
    store: Arc<dyn ConversationStore>,
    tenants: Arc<TenantDirectory>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn ConversationStore>, tenants: Arc<TenantDirectory>) -> Self {
        Self { store, tenants }
    }

    /// Find, merge, or create the single open conversation for `contact_key`.
    pub async fn resolve(
        &self,
        tenant_id: &str,
        contact_key: &str,
        is_group: bool,
        contact_id: Option<&str>,
    ) -> Result<Resolution, ZaplineError> {
        let key = if is_group {
            phone::normalize_group(contact_key)
        } else {
            phone::normalize(contact_key)
        };
        if key.is_empty() {
            return Err(ZaplineError::payload(format!(
                "no usable contact key in {contact_key:?}"
            )));
        }
        let variants = phone::variants(&key);
        let key = phone::storage_key(&key);
        let contact_id = if is_group { None } else { contact_id };

        if let Some(conversation) = self
            .find_existing(tenant_id, &key, &variants, contact_id)
            .await?
        {
            return Ok(Resolution {
                conversation,
                created: false,
            });
        }

        let new = NewConversation {
            tenant_id: tenant_id.to_string(),
            phone: key.clone(),
            contact_id: contact_id.map(str::to_string),
            is_group,
            department_id: self.tenants.department(tenant_id).map(str::to_string),
        };
        match self.store.create_or_get_conversation(&new).await? {
            CreateOrGet::Created(conversation) => {
                info!(
                    tenant = %tenant_id,
                    conversation_id = %conversation.id,
                    phone = %key,
                    is_group,
                    "conversation created"
                );
                Ok(Resolution {
                    conversation,
                    created: true,
                })
            }
            CreateOrGet::Existing(_) => {
                debug!(tenant = %tenant_id, phone = %key, "lost conversation create race");
                let conversation = self
                    .find_existing(tenant_id, &key, &variants, contact_id)
                    .await?
                    .ok_or_else(|| {
                        ZaplineError::Internal(format!(
                            "open conversation for {key} vanished after a create conflict"
                        ))
                    })?;
                Ok(Resolution {
                    conversation,
                    created: false,
                })
            }
        }
    }

    async fn find_existing(
        &self,
        tenant_id: &str,
        key: &str,
        variants: &[String],
        contact_id: Option<&str>,
    ) -> Result<Option<Conversation>, ZaplineError> {
        let mut rows = self.store.find_open_conversations(tenant_id, variants).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut canonical = rows.remove(0);

        if !rows.is_empty() {
            let duplicates: Vec<String> = rows.into_iter().map(|c| c.id).collect();
            match self
                .store
                .merge_conversations(&canonical.id, &duplicates)
                .await
            {
                Ok(report) => {
                    recording::record_merges(report.deleted.len() + report.closed.len());
                    info!(
                        tenant = %tenant_id,
                        conversation_id = %canonical.id,
                        deleted = report.deleted.len(),
                        closed = report.closed.len(),
                        moved_messages = report.moved_messages,
                        "merged duplicate conversations"
                    );
                    if let Some(fresh) = self.store.get_conversation(&canonical.id).await? {
                        canonical = fresh;
                    }
                }
                Err(e) => {
                    warn!(
                        tenant = %tenant_id,
                        conversation_id = %canonical.id,
                        error = %e,
                        "conversation merge failed, continuing with the newest row"
                    );
                }
            }
        }

        if canonical.phone != key {
            if self
                .store
                .update_conversation_phone(&canonical.id, key)
                .await?
            {
                debug!(conversation_id = %canonical.id, from = %canonical.phone, to = %key, "conversation phone canonicalized");
                canonical.phone = key.to_string();
            } else {
                debug!(conversation_id = %canonical.id, phone = %key, "canonical phone owned elsewhere, keeping variant");
            }
        }

        if let Some(contact_id) = contact_id {
            if canonical.contact_id.is_none() && !canonical.is_group {
                self.store.link_contact(&canonical.id, contact_id).await?;
                canonical.contact_id = Some(contact_id.to_string());
            }
        }

        Ok(Some(canonical))
    }

    /// Find or create the contact for an individual key, filling a missing
    /// name or photo from what the provider offered.
    pub async fn resolve_contact(
        &self,
        tenant_id: &str,
        contact_key: &str,
        name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Contact, ZaplineError> {
        let key = phone::normalize(contact_key);
        if key.is_empty() || phone::is_group_key(&key) {
            return Err(ZaplineError::payload(format!(
                "{contact_key:?} does not identify an individual contact"
            )));
        }
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let photo_url = photo_url.map(str::trim).filter(|p| !p.is_empty());

        let mut found = self
            .store
            .find_contacts_by_phones(tenant_id, &phone::variants(&key))
            .await?;
        let key = phone::storage_key(&key);
        let exact = found.iter().position(|c| c.phone == key);
        let mut contact = match exact.or((!found.is_empty()).then_some(0)) {
            Some(index) => found.swap_remove(index),
            None => {
                let new = NewContact {
                    tenant_id: tenant_id.to_string(),
                    phone: key.clone(),
                    name: name.map(str::to_string),
                    photo_url: photo_url.map(str::to_string),
                };
                let outcome = self.store.create_or_get_contact(&new).await?;
                if outcome.was_created() {
                    debug!(tenant = %tenant_id, phone = %key, "contact created");
                }
                outcome.into_inner()
            }
        };

        let missing_name = name.is_some() && is_blank(contact.name.as_deref());
        let missing_photo = photo_url.is_some() && is_blank(contact.photo_url.as_deref());
        if missing_name || missing_photo {
            self.store
                .update_contact_profile(&contact.id, name, photo_url)
                .await?;
            if missing_name {
                contact.name = name.map(str::to_string);
            }
            if missing_photo {
                contact.photo_url = photo_url.map(str::to_string);
            }
        }
        Ok(contact)
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
