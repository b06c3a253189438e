// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end ingestion of one raw provider element.
//!
//! The coordinator holds no locks. Concurrent deliveries of the same event
//! race through the store's unique indexes and every loser observes the
//! winner's row, so replaying an element any number of times leaves exactly
//! one message behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use zapline_config::ZaplineConfig;
use zapline_core::phone;
use zapline_core::types::{
    Contact, Conversation, CreateOrGet, DeliveryStatus, Direction, EchoSignature, InboundEvent,
    InboundMessage, Message, NewMessage, ProviderKind, StatusUpdate, TIMESTAMP_FORMAT,
    now_timestamp,
};
use zapline_core::{Broadcaster, ConversationStore, ProviderClient, ZaplineError};
use zapline_prometheus::recording;

use crate::backfill;
use crate::envelope;
use crate::events;
use crate::normalize::{NormalizeContext, normalize};
use crate::resolver::ConversationResolver;
use crate::status::{StatusReconciler, should_apply};
use crate::tenants::TenantDirectory;

/// Where an element entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestSource {
    /// Live provider webhook. The only source that broadcasts and backfills.
    Webhook,
    /// History fetched for a newly created conversation.
    Backfill,
    /// Payload replayed from a file by an operator.
    Replay,
}

/// What happened to one element.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored {
        message: Message,
        conversation_created: bool,
    },
    /// The provider id was already stored in the conversation.
    Duplicate { message_id: String },
    /// A provider echo confirmed a local outbound row.
    Reconciled { message: Message },
    /// Nothing to show; only the conversation's activity moved.
    Discarded { conversation_id: String },
    /// No usable contact key.
    Dropped { reason: &'static str },
    StatusApplied { message: Message },
    /// Unknown provider id, empty label, or a status the policy refused.
    StatusUnmatched { provider_message_id: String },
    /// The element matched no known payload shape.
    Ignored { reason: String },
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored { .. } => "stored",
            Self::Duplicate { .. } => "duplicate",
            Self::Reconciled { .. } => "reconciled",
            Self::Discarded { .. } => "discarded",
            Self::Dropped { .. } => "dropped",
            Self::StatusApplied { .. } => "status_applied",
            Self::StatusUnmatched { .. } => "status_unmatched",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Outcomes of every element of one delivery.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<IngestOutcome>,
    pub errors: Vec<ZaplineError>,
}

impl DeliveryReport {
    /// Whether the primary write of at least one element failed, in which
    /// case the provider should redeliver.
    pub fn persistence_failed(&self) -> bool {
        self.errors.iter().any(ZaplineError::is_persistence)
    }

    pub fn count(&self, label: &str) -> usize {
        self.outcomes.iter().filter(|o| o.label() == label).count()
    }
}

/// Runs the ingestion pipeline. Cheap to clone.
#[derive(Clone)]
pub struct IngestionCoordinator {
    store: Arc<dyn ConversationStore>,
    broadcaster: Arc<dyn Broadcaster>,
    providers: Arc<HashMap<ProviderKind, Arc<dyn ProviderClient>>>,
    tenants: Arc<TenantDirectory>,
    resolver: Arc<ConversationResolver>,
    reconciler: Arc<StatusReconciler>,
    reconcile_window: chrono::Duration,
    backfill_limit: usize,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        broadcaster: Arc<dyn Broadcaster>,
        config: &ZaplineConfig,
    ) -> Self {
        let tenants = Arc::new(TenantDirectory::from_config(config));
        let resolver = Arc::new(ConversationResolver::new(
            Arc::clone(&store),
            Arc::clone(&tenants),
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            Arc::clone(&store),
            config.ingest.status_policy,
            config.ingest.status_tenant_fallback,
        ));
        let window_secs = i64::try_from(config.ingest.reconcile_window_secs).unwrap_or(i64::MAX);
        Self {
            store,
            broadcaster,
            providers: Arc::new(HashMap::new()),
            tenants,
            resolver,
            reconciler,
            reconcile_window: chrono::Duration::try_seconds(window_secs)
                .unwrap_or(chrono::Duration::MAX),
            backfill_limit: config.ingest.history_backfill_limit,
        }
    }

    /// Register the outbound client used for history backfill of `client.kind()`.
    pub fn with_provider(mut self, client: Arc<dyn ProviderClient>) -> Self {
        Arc::make_mut(&mut self.providers).insert(client.kind(), client);
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<ConversationResolver> {
        &self.resolver
    }

    pub fn tenants(&self) -> &Arc<TenantDirectory> {
        &self.tenants
    }

    /// Explode a delivery and ingest every element in order.
    ///
    /// A failing element never stops its siblings.
    pub async fn ingest_delivery(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
        body: Value,
        source: IngestSource,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for element in envelope::explode(provider, body) {
            match self.ingest(tenant_id, provider, &element, source).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => report.errors.push(e),
            }
        }
        report
    }

    /// Ingest one raw element.
    ///
    /// `Err` means the store failed; every other condition is an
    /// [`IngestOutcome`].
    pub async fn ingest(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
        raw: &Value,
        source: IngestSource,
    ) -> Result<IngestOutcome, ZaplineError> {
        let started = Instant::now();
        recording::record_event(&provider.to_string());

        let result = self.ingest_element(tenant_id, provider, raw, source).await;

        recording::record_ingest_latency(started.elapsed().as_secs_f64());
        match &result {
            Ok(outcome) => debug!(
                tenant = %tenant_id,
                %provider,
                outcome = outcome.label(),
                "element ingested"
            ),
            Err(e) => warn!(tenant = %tenant_id, %provider, error = %e, "element ingestion failed"),
        }
        result
    }

    async fn ingest_element(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
        raw: &Value,
        source: IngestSource,
    ) -> Result<IngestOutcome, ZaplineError> {
        let ctx = NormalizeContext {
            own_number: self.tenants.own_number(tenant_id),
        };
        let event = match normalize(provider, raw, &ctx) {
            Ok(event) => event,
            Err(e) => {
                warn!(tenant = %tenant_id, %provider, error = %e, "unrecognized payload ignored");
                recording::record_dropped("unrecognized");
                return Ok(IngestOutcome::Ignored {
                    reason: e.to_string(),
                });
            }
        };

        match event {
            InboundEvent::StatusUpdate(update) => self.handle_status(tenant_id, update, source).await,
            InboundEvent::Message(message) => {
                self.handle_message(tenant_id, provider, message, source)
                    .await
            }
        }
    }

    async fn handle_status(
        &self,
        tenant_id: &str,
        update: StatusUpdate,
        source: IngestSource,
    ) -> Result<IngestOutcome, ZaplineError> {
        match self
            .reconciler
            .apply_status(tenant_id, &update.provider_message_id, &update.raw_status)
            .await?
        {
            Some(message) => {
                if source != IngestSource::Backfill {
                    events::publish_status(self.broadcaster.as_ref(), tenant_id, &message).await;
                }
                Ok(IngestOutcome::StatusApplied { message })
            }
            None => Ok(IngestOutcome::StatusUnmatched {
                provider_message_id: update.provider_message_id,
            }),
        }
    }

    async fn handle_message(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
        message: InboundMessage,
        source: IngestSource,
    ) -> Result<IngestOutcome, ZaplineError> {
        if message.contact_key.is_empty() {
            warn!(
                tenant = %tenant_id,
                provider_message_id = message.provider_message_id.as_deref().unwrap_or_default(),
                "no usable contact key, message dropped"
            );
            recording::record_dropped("no_contact_key");
            return Ok(IngestOutcome::Dropped {
                reason: "no_contact_key",
            });
        }

        let is_group = message.is_group || phone::is_group_key(&message.contact_key);
        let contact = if is_group {
            None
        } else {
            Some(
                self.resolver
                    .resolve_contact(
                        tenant_id,
                        &message.contact_key,
                        message.contact_name.as_deref(),
                        message.contact_photo.as_deref(),
                    )
                    .await?,
            )
        };

        let resolution = self
            .resolver
            .resolve(
                tenant_id,
                &message.contact_key,
                is_group,
                contact.as_ref().map(|c| c.id.as_str()),
            )
            .await?;
        let conversation = resolution.conversation;
        let at = message.timestamp.clone().unwrap_or_else(now_timestamp);

        if let Some(pid) = message.provider_message_id.as_deref() {
            if let Some(existing) = self
                .store
                .find_message_by_provider_id(&conversation.id, pid)
                .await?
            {
                recording::record_duplicate();
                debug!(conversation_id = %conversation.id, provider_message_id = pid, "duplicate delivery");
                return Ok(IngestOutcome::Duplicate {
                    message_id: existing.id,
                });
            }
        }

        if message.is_empty_artifact() {
            self.store.touch_conversation(&conversation.id, &at).await?;
            recording::record_dropped("empty_artifact");
            return Ok(IngestOutcome::Discarded {
                conversation_id: conversation.id,
            });
        }

        if message.from_me {
            if let (Some(pid), Some(signature)) =
                (message.provider_message_id.as_deref(), message.echo_signature())
            {
                if let Some(outcome) = self
                    .reconcile_echo(tenant_id, &conversation, pid, &signature, &at, source)
                    .await?
                {
                    return Ok(outcome);
                }
            }
        }

        self.store_message(
            tenant_id,
            provider,
            message,
            conversation,
            contact,
            resolution.created,
            at,
            source,
        )
        .await
    }

    /// Match a `fromMe` echo to the local outbound row it confirms.
    async fn reconcile_echo(
        &self,
        tenant_id: &str,
        conversation: &Conversation,
        provider_message_id: &str,
        signature: &EchoSignature,
        at: &str,
        source: IngestSource,
    ) -> Result<Option<IngestOutcome>, ZaplineError> {
        let since = chrono::Utc::now()
            .checked_sub_signed(self.reconcile_window)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
            .format(TIMESTAMP_FORMAT)
            .to_string();
        let Some(mut local) = self
            .store
            .find_unconfirmed_outbound(&conversation.id, &since, signature)
            .await?
        else {
            return Ok(None);
        };

        let status = if should_apply(
            self.reconciler.policy(),
            &local.status,
            &DeliveryStatus::Sent,
        ) {
            DeliveryStatus::Sent
        } else {
            local.status.clone()
        };

        if self
            .store
            .confirm_outbound(&local.id, provider_message_id, &status)
            .await?
        {
            self.store.touch_conversation(&conversation.id, at).await?;
            recording::record_reconciled();
            info!(
                tenant = %tenant_id,
                conversation_id = %conversation.id,
                message_id = %local.id,
                provider_message_id,
                "echo reconciled with local send"
            );
            local.provider_message_id = Some(provider_message_id.to_string());
            local.status = status;
            if source == IngestSource::Webhook {
                events::publish_status(self.broadcaster.as_ref(), tenant_id, &local).await;
            }
            return Ok(Some(IngestOutcome::Reconciled { message: local }));
        }

        // Another delivery of the same echo, or the send task, got there first.
        debug!(conversation_id = %conversation.id, provider_message_id, "lost reconciliation race");
        Ok(self
            .store
            .find_message_by_provider_id(&conversation.id, provider_message_id)
            .await?
            .map(|existing| {
                recording::record_duplicate();
                IngestOutcome::Duplicate {
                    message_id: existing.id,
                }
            }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn store_message(
        &self,
        tenant_id: &str,
        provider: ProviderKind,
        message: InboundMessage,
        conversation: Conversation,
        contact: Option<Contact>,
        conversation_created: bool,
        at: String,
        source: IngestSource,
    ) -> Result<IngestOutcome, ZaplineError> {
        let direction = Direction::from_me(message.from_me);
        let status = if message.from_me {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Delivered
        };
        let from_group_member = conversation.is_group && !message.from_me;

        let new = NewMessage {
            conversation_id: conversation.id.clone(),
            provider_message_id: message.provider_message_id,
            direction,
            kind: message.kind,
            status,
            body: message.text,
            media_url: message.media_url,
            file_name: message.file_name,
            group_sender_phone: message.group_sender_phone.filter(|_| from_group_member),
            group_sender_name: message.group_sender_name.filter(|_| from_group_member),
            quoted_message_id: message.quoted_message_id,
            created_at: Some(at.clone()),
        };

        let stored = match self.store.insert_message(&new).await? {
            CreateOrGet::Created(stored) => stored,
            CreateOrGet::Existing(existing) => {
                recording::record_duplicate();
                return Ok(IngestOutcome::Duplicate {
                    message_id: existing.id,
                });
            }
        };
        recording::record_stored(&direction.to_string());

        self.store.touch_conversation(&conversation.id, &at).await?;
        if let Some(contact) = &contact {
            self.store.touch_contact(&contact.id, &at).await?;
        }

        if source == IngestSource::Webhook {
            events::publish_new_message(self.broadcaster.as_ref(), tenant_id, &conversation, &stored)
                .await;
            if conversation_created {
                self.spawn_backfill(tenant_id, provider, &conversation);
            }
        }

        Ok(IngestOutcome::Stored {
            message: stored,
            conversation_created,
        })
    }

    fn spawn_backfill(&self, tenant_id: &str, provider: ProviderKind, conversation: &Conversation) {
        if self.backfill_limit == 0 {
            return;
        }
        let Some(client) = self.providers.get(&provider) else {
            debug!(%provider, "no outbound client registered, skipping history backfill");
            return;
        };
        tokio::spawn(backfill::backfill_task(
            self.clone(),
            Arc::clone(client),
            tenant_id.to_string(),
            provider,
            conversation.phone.clone(),
            self.backfill_limit,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zapline_core::EVENT_MESSAGE_NEW;
    use zapline_test_utils::{MockBroadcaster, MockProvider, TestHarness, fixtures};

    fn coordinator(harness: &TestHarness, broadcaster: Arc<MockBroadcaster>) -> IngestionCoordinator {
        let mut config = ZaplineConfig::default();
        config.ingest.history_backfill_limit = 0;
        IngestionCoordinator::new(harness.store(), broadcaster, &config)
    }

    #[tokio::test]
    async fn stores_inbound_and_broadcasts() {
        let harness = TestHarness::new().await;
        let broadcaster = Arc::new(MockBroadcaster::new());
        let c = coordinator(&harness, Arc::clone(&broadcaster));

        let outcome = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &fixtures::gateway_text("5534999999999", "M1", "olá"),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        let IngestOutcome::Stored {
            message,
            conversation_created,
        } = outcome
        else {
            panic!("expected stored, got {outcome:?}");
        };
        assert!(conversation_created);
        assert_eq!(message.direction, Direction::Inbound);
        assert_eq!(message.status, DeliveryStatus::Delivered);
        assert_eq!(message.body, "olá");

        let published = broadcaster.events_named(EVENT_MESSAGE_NEW);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].rooms[1], "tenant:acme");
    }

    #[tokio::test]
    async fn redelivery_is_a_duplicate() {
        let harness = TestHarness::new().await;
        let c = coordinator(&harness, Arc::new(MockBroadcaster::new()));
        let raw = fixtures::gateway_text("5534999999999", "M1", "olá");

        for _ in 0..3 {
            c.ingest("acme", ProviderKind::Gateway, &raw, IngestSource::Webhook)
                .await
                .unwrap();
        }
        let conversation = harness.only_conversation("acme").await;
        assert_eq!(harness.message_count(&conversation.id).await, 1);
    }

    #[tokio::test]
    async fn missing_key_drops_and_garbage_is_ignored() {
        let harness = TestHarness::new().await;
        let c = coordinator(&harness, Arc::new(MockBroadcaster::new()));

        let dropped = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &json!({"chatId": "99999@lid", "messageId": "X", "body": "hi"}),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        assert_eq!(dropped.label(), "dropped");

        let ignored = c
            .ingest("acme", ProviderKind::Cloud, &json!({"foo": 1}), IngestSource::Webhook)
            .await
            .unwrap();
        assert_eq!(ignored.label(), "ignored");
    }

    #[tokio::test]
    async fn group_messages_carry_sender_and_create_no_contact() {
        let harness = TestHarness::new().await;
        let c = coordinator(&harness, Arc::new(MockBroadcaster::new()));

        let outcome = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &fixtures::gateway_group_text(
                    "120363041234567890",
                    "5534988887777",
                    "Caio",
                    "G1",
                    "bom dia",
                ),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        let IngestOutcome::Stored { message, .. } = outcome else {
            panic!("expected stored, got {outcome:?}");
        };
        assert_eq!(message.group_sender_phone.as_deref(), Some("5534988887777"));
        assert_eq!(message.group_sender_name.as_deref(), Some("Caio"));

        let conversation = harness.only_conversation("acme").await;
        assert!(conversation.is_group);
        assert!(conversation.contact_id.is_none());
        assert_eq!(conversation.phone, "120363041234567890");
    }

    #[tokio::test]
    async fn status_updates_publish_only_when_applied() {
        let harness = TestHarness::new().await;
        let broadcaster = Arc::new(MockBroadcaster::new());
        let c = coordinator(&harness, Arc::clone(&broadcaster));

        c.ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_text("5534999999999", "M1", "olá"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();

        let read = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &fixtures::gateway_status("M1", "READ"),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        assert_eq!(read.label(), "status_applied");

        let stale = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &fixtures::gateway_status("M1", "DELIVERED"),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        assert_eq!(stale.label(), "status_unmatched");

        let unknown = c
            .ingest(
                "acme",
                ProviderKind::Gateway,
                &fixtures::gateway_status("NOPE", "READ"),
                IngestSource::Webhook,
            )
            .await
            .unwrap();
        assert_eq!(unknown.label(), "status_unmatched");

        assert_eq!(broadcaster.events_named(zapline_core::EVENT_MESSAGE_STATUS).len(), 1);
    }

    #[tokio::test]
    async fn backfill_runs_for_new_webhook_conversations() {
        let harness = TestHarness::new().await;
        let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
        provider.set_history(vec![
            fixtures::gateway_text("5534999999999", "H1", "older"),
            fixtures::gateway_text("5534999999999", "H2", "old"),
        ]);
        let mut config = ZaplineConfig::default();
        config.ingest.history_backfill_limit = 10;
        let c = IngestionCoordinator::new(
            harness.store(),
            Arc::new(MockBroadcaster::new()),
            &config,
        )
        .with_provider(provider.clone());

        c.ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_text("5534999999999", "M1", "new"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();

        let conversation = harness.only_conversation("acme").await;
        harness
            .wait_for_messages(&conversation.id, 3)
            .await
            .expect("backfill should store history");
        assert_eq!(provider.history_requests(), vec![("5534999999999".to_string(), 10)]);
    }
}
