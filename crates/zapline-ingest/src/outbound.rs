// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound dispatch.
//!
//! A send is stored first as a local `pending` row with no provider id, so
//! agents see it immediately. The provider call runs in a spawned task and
//! either confirms the row or marks it `error`. If the provider's echo
//! arrives first, the coordinator reconciles it and the task finds the row
//! already confirmed.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use zapline_config::model::OutboundConfig;
use zapline_core::phone;
use zapline_core::types::{
    Conversation, DeliveryStatus, Direction, Message, NewMessage, OutboundContent, SendReceipt,
    now_timestamp,
};
use zapline_core::{Broadcaster, ConversationStore, ProviderClient, ZaplineError};
use zapline_prometheus::recording;

use crate::events;
use crate::resolver::ConversationResolver;

/// Remembers which target form each group accepted last.
///
/// Bounded: inserting into a full cache evicts the least recently used
/// entry. Entries older than the TTL are treated as absent.
pub struct GroupTargetCache {
    ttl: Duration,
    entries: Mutex<LruCache<String, (String, Instant)>>,
}

impl GroupTargetCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn from_config(config: &OutboundConfig) -> Self {
        Self::new(
            config.group_target_cache_capacity,
            Duration::from_secs(config.group_target_ttl_secs),
        )
    }

    pub fn get(&self, group_key: &str) -> Option<String> {
        let mut entries = self.lock();
        let found = entries
            .get(group_key)
            .map(|(target, stored)| (target.clone(), stored.elapsed() < self.ttl));
        match found {
            Some((target, true)) => Some(target),
            Some((_, false)) => {
                entries.pop(group_key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, group_key: &str, target: &str) {
        self.lock()
            .put(group_key.to_string(), (target.to_string(), Instant::now()));
    }

    pub fn remove(&self, group_key: &str) {
        self.lock().pop(group_key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, (String, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Target forms to try for a group, the cached one first.
pub fn group_targets(group_key: &str, cached: Option<&str>) -> Vec<String> {
    let mut targets: Vec<String> = cached.map(str::to_string).into_iter().collect();
    for candidate in [
        format!("{group_key}-group"),
        format!("{group_key}@g.us"),
        group_key.to_string(),
    ] {
        if !targets.contains(&candidate) {
            targets.push(candidate);
        }
    }
    targets
}

/// A dispatched send: the stored local row plus the task delivering it.
#[derive(Debug)]
pub struct DispatchHandle {
    pub message: Message,
    pub conversation: Conversation,
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct OutboundDispatcher {
    store: Arc<dyn ConversationStore>,
    broadcaster: Arc<dyn Broadcaster>,
    resolver: Arc<ConversationResolver>,
    client: Arc<dyn ProviderClient>,
    group_targets: Arc<GroupTargetCache>,
}

impl OutboundDispatcher {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        resolver: Arc<ConversationResolver>,
        client: Arc<dyn ProviderClient>,
        config: &OutboundConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            resolver,
            client,
            group_targets: Arc::new(GroupTargetCache::from_config(config)),
        }
    }

    pub fn group_target_cache(&self) -> &GroupTargetCache {
        &self.group_targets
    }

    /// Store `content` as a pending outbound message and start sending it.
    pub async fn dispatch(
        &self,
        tenant_id: &str,
        contact_key: &str,
        content: OutboundContent,
    ) -> Result<DispatchHandle, ZaplineError> {
        let key = phone::normalize(contact_key);
        if key.is_empty() {
            return Err(ZaplineError::payload(format!(
                "cannot send to {contact_key:?}: no usable phone"
            )));
        }
        let is_group = phone::is_group_key(&key);
        let contact_id = if is_group {
            None
        } else {
            Some(
                self.resolver
                    .resolve_contact(tenant_id, &key, None, None)
                    .await?
                    .id,
            )
        };
        let conversation = self
            .resolver
            .resolve(tenant_id, &key, is_group, contact_id.as_deref())
            .await?
            .conversation;

        let now = now_timestamp();
        let file_name = match &content {
            OutboundContent::Document { file_name, .. } => file_name.clone(),
            _ => None,
        };
        let new = NewMessage {
            conversation_id: conversation.id.clone(),
            provider_message_id: None,
            direction: Direction::Outbound,
            kind: content.kind(),
            status: DeliveryStatus::Pending,
            body: content.body(),
            media_url: content.media_url().map(str::to_string),
            file_name,
            group_sender_phone: None,
            group_sender_name: None,
            quoted_message_id: None,
            created_at: Some(now.clone()),
        };
        let message = self.store.insert_message(&new).await?.into_inner();
        self.store.touch_conversation(&conversation.id, &now).await?;
        recording::record_stored(&Direction::Outbound.to_string());
        events::publish_new_message(self.broadcaster.as_ref(), tenant_id, &conversation, &message)
            .await;

        let task = tokio::spawn(self.clone().deliver(
            tenant_id.to_string(),
            conversation.clone(),
            message.clone(),
            content,
        ));
        Ok(DispatchHandle {
            message,
            conversation,
            task,
        })
    }

    async fn deliver(
        self,
        tenant_id: String,
        conversation: Conversation,
        mut message: Message,
        content: OutboundContent,
    ) {
        let result = if conversation.is_group {
            self.send_to_group(&conversation.phone, &content).await
        } else {
            self.client
                .send(&phone::to_send_format(&conversation.phone), &content)
                .await
        };

        let (outcome, status) = match result {
            Ok(SendReceipt {
                ok: true,
                provider_message_id: Some(pid),
            }) => {
                let confirmed = self
                    .store
                    .confirm_outbound(&message.id, &pid, &DeliveryStatus::Sent)
                    .await;
                match confirmed {
                    Ok(true) => message.provider_message_id = Some(pid),
                    Ok(false) => {
                        debug!(message_id = %message.id, "send already confirmed by its echo");
                    }
                    Err(_) => {}
                }
                (confirmed, DeliveryStatus::Sent)
            }
            Ok(SendReceipt { ok: true, .. }) => (
                self.store
                    .set_message_status(&message.id, &DeliveryStatus::Pending, &DeliveryStatus::Sent)
                    .await,
                DeliveryStatus::Sent,
            ),
            Ok(_) => {
                warn!(tenant = %tenant_id, message_id = %message.id, "provider rejected send");
                (self.mark_failed(&message).await, DeliveryStatus::Error)
            }
            Err(e) => {
                warn!(tenant = %tenant_id, message_id = %message.id, error = %e, "send failed");
                (self.mark_failed(&message).await, DeliveryStatus::Error)
            }
        };

        match outcome {
            Ok(true) => {
                message.status = status;
                events::publish_status(self.broadcaster.as_ref(), &tenant_id, &message).await;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "could not record send result");
            }
        }
    }

    async fn mark_failed(&self, message: &Message) -> Result<bool, ZaplineError> {
        recording::record_collaborator_failure("provider");
        self.store
            .set_message_status(&message.id, &DeliveryStatus::Pending, &DeliveryStatus::Error)
            .await
    }

    async fn send_to_group(
        &self,
        group_key: &str,
        content: &OutboundContent,
    ) -> Result<SendReceipt, ZaplineError> {
        let cached = self.group_targets.get(group_key);
        let mut last_error = None;
        for target in group_targets(group_key, cached.as_deref()) {
            match self.client.send(&target, content).await {
                Ok(receipt) if receipt.ok => {
                    if cached.as_deref() != Some(target.as_str()) {
                        info!(group = %group_key, target = %target, "group send target learned");
                    }
                    self.group_targets.insert(group_key, &target);
                    return Ok(receipt);
                }
                Ok(_) => {
                    debug!(group = %group_key, target = %target, "group target rejected");
                    if cached.as_deref() == Some(target.as_str()) {
                        self.group_targets.remove(group_key);
                    }
                }
                Err(e) => {
                    debug!(group = %group_key, target = %target, error = %e, "group target failed");
                    if cached.as_deref() == Some(target.as_str()) {
                        self.group_targets.remove(group_key);
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ZaplineError::Provider {
            message: format!("no target form accepted for group {group_key}"),
            source: None,
        }))
    }
}
