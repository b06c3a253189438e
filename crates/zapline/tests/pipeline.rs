// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end flows through ingestion, storage, and realtime fan-out.

use std::sync::Arc;
use std::time::Duration;

use zapline_config::{TenantConfig, ZaplineConfig};
use zapline_core::{
    ConversationStore, DeliveryStatus, Direction, EVENT_MESSAGE_NEW, EVENT_MESSAGE_STATUS,
    OutboundContent, ProviderKind,
};
use zapline_ingest::{
    ConversationResolver, IngestOutcome, IngestSource, IngestionCoordinator, OutboundDispatcher,
    TenantDirectory,
};
use zapline_test_utils::{MockBroadcaster, MockProvider, TestHarness, fixtures};

fn config_with_tenant(department: Option<&str>) -> ZaplineConfig {
    let mut config = ZaplineConfig::default();
    config.ingest.history_backfill_limit = 0;
    config.tenants.push(TenantConfig {
        id: "acme".into(),
        own_number: Some("5534911112222".into()),
        department_id: department.map(str::to_string),
    });
    config
}

fn dispatcher(
    harness: &TestHarness,
    config: &ZaplineConfig,
    broadcaster: Arc<MockBroadcaster>,
    provider: Arc<MockProvider>,
) -> OutboundDispatcher {
    let resolver = Arc::new(ConversationResolver::new(
        harness.store(),
        Arc::new(TenantDirectory::from_config(config)),
    ));
    OutboundDispatcher::new(
        harness.store(),
        broadcaster,
        resolver,
        provider,
        &config.outbound,
    )
}

#[tokio::test]
async fn gateway_message_is_stored_and_reaches_the_department() {
    let harness = TestHarness::new().await;
    let broadcaster = Arc::new(MockBroadcaster::new());
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        broadcaster.clone(),
        &config_with_tenant(Some("sales")),
    );

    let report = coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Gateway,
            fixtures::gateway_text("34999999999", "G1", "quero um orçamento"),
            IngestSource::Webhook,
        )
        .await;
    assert!(report.errors.is_empty());
    assert_eq!(report.count("stored"), 1);

    let conversation = harness.only_conversation("acme").await;
    assert_eq!(conversation.phone, "5534999999999");
    assert_eq!(conversation.department_id.as_deref(), Some("sales"));
    assert!(conversation.contact_id.is_some());

    let published = broadcaster.events_named(EVENT_MESSAGE_NEW);
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].rooms,
        vec![
            format!("conversation:{}", conversation.id),
            "department:sales".to_string()
        ]
    );
    assert_eq!(published[0].payload["message"]["body"], "quero um orçamento");
}

#[tokio::test]
async fn cloud_and_gateway_deliveries_share_one_conversation() {
    let harness = TestHarness::new().await;
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &config_with_tenant(None),
    );

    let cloud = coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Cloud,
            fixtures::cloud_text_envelope("553499999999", "wamid.A", "oi", "Ana"),
            IngestSource::Webhook,
        )
        .await;
    assert_eq!(cloud.count("stored"), 1);

    let gateway = coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Gateway,
            fixtures::gateway_text("5534999999999", "G2", "tudo bem?"),
            IngestSource::Webhook,
        )
        .await;
    assert_eq!(gateway.count("stored"), 1);

    let conversation = harness.only_conversation("acme").await;
    assert_eq!(harness.message_count(&conversation.id).await, 2);

    let contact = harness
        .store()
        .find_contacts_by_phones("acme", &["5534999999999".to_string()])
        .await
        .unwrap();
    assert_eq!(contact.len(), 1);
    assert_eq!(contact[0].name.as_deref(), Some("Ana"));
}

#[tokio::test]
async fn cloud_message_without_contacts_is_stored() {
    let harness = TestHarness::new().await;
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &config_with_tenant(None),
    );

    let report = coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Cloud,
            fixtures::cloud_text_without_contacts("5534999999999", "wamid.NC", "sem nome"),
            IngestSource::Webhook,
        )
        .await;
    assert!(report.errors.is_empty());
    assert_eq!(report.count("stored"), 1);
    assert_eq!(report.count("ignored"), 0);

    let conversation = harness.only_conversation("acme").await;
    assert_eq!(conversation.phone, "5534999999999");
    let messages = harness.messages(&conversation.id).await;
    assert_eq!(messages[0].body, "sem nome");
}

#[tokio::test]
async fn cloud_status_walks_forward_only() {
    let harness = TestHarness::new().await;
    let broadcaster = Arc::new(MockBroadcaster::new());
    let coordinator =
        IngestionCoordinator::new(harness.store(), broadcaster.clone(), &config_with_tenant(None));

    coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Cloud,
            fixtures::cloud_echo_envelope("5534999999999", "wamid.OUT", "seu pedido saiu"),
            IngestSource::Webhook,
        )
        .await;

    for status in ["read", "delivered"] {
        coordinator
            .ingest_delivery(
                "acme",
                ProviderKind::Cloud,
                fixtures::cloud_status_envelope("wamid.OUT", status, "5534999999999"),
                IngestSource::Webhook,
            )
            .await;
    }

    let conversation = harness.only_conversation("acme").await;
    let messages = harness.messages(&conversation.id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].direction, Direction::Outbound);
    assert_eq!(messages[0].status, DeliveryStatus::Read);
    assert_eq!(broadcaster.events_named(EVENT_MESSAGE_STATUS).len(), 1);
}

#[tokio::test]
async fn status_for_an_unknown_message_is_unmatched() {
    let harness = TestHarness::new().await;
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &config_with_tenant(None),
    );

    let outcome = coordinator
        .ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_status("never-seen", "READ"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        IngestOutcome::StatusUnmatched {
            provider_message_id: "never-seen".into()
        }
    );
}

#[tokio::test]
async fn echo_of_an_in_flight_send_confirms_the_local_row() {
    let harness = TestHarness::new().await;
    let config = config_with_tenant(None);
    let broadcaster = Arc::new(MockBroadcaster::new());
    let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
    provider.queue_send_id("WA-777");
    provider.set_send_delay(Duration::from_millis(200));

    let coordinator = IngestionCoordinator::new(harness.store(), broadcaster.clone(), &config);
    let dispatcher = dispatcher(&harness, &config, broadcaster.clone(), provider.clone());

    let handle = dispatcher
        .dispatch(
            "acme",
            "5534999999999",
            OutboundContent::Text {
                body: "chegou?".into(),
            },
        )
        .await
        .unwrap();

    // The provider echoes the send before its own HTTP response returns.
    let outcome = coordinator
        .ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_echo("5534999999999", "WA-777", "chegou?"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();
    let IngestOutcome::Reconciled { message } = outcome else {
        panic!("expected reconciliation, got {outcome:?}");
    };
    assert_eq!(message.id, handle.message.id);

    handle.task.await.unwrap();

    let messages = harness.messages(&handle.conversation.id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].provider_message_id.as_deref(), Some("WA-777"));
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn echo_with_other_trailing_whitespace_still_reconciles() {
    let harness = TestHarness::new().await;
    let config = config_with_tenant(None);
    let broadcaster = Arc::new(MockBroadcaster::new());
    let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
    provider.queue_send_id("WA-779");
    provider.set_send_delay(Duration::from_millis(200));

    let coordinator = IngestionCoordinator::new(harness.store(), broadcaster.clone(), &config);
    let handle = dispatcher(&harness, &config, broadcaster, provider)
        .dispatch(
            "acme",
            "5534999999999",
            OutboundContent::Text {
                body: "segue o boleto\n".into(),
            },
        )
        .await
        .unwrap();

    let outcome = coordinator
        .ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_echo("5534999999999", "WA-779", "segue o boleto\t\r\n"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();
    assert!(
        matches!(&outcome, IngestOutcome::Reconciled { message } if message.id == handle.message.id),
        "got {outcome:?}"
    );

    handle.task.await.unwrap();
    assert_eq!(harness.message_count(&handle.conversation.id).await, 1);
}

#[tokio::test]
async fn echo_after_the_send_completed_is_a_duplicate() {
    let harness = TestHarness::new().await;
    let config = config_with_tenant(None);
    let broadcaster = Arc::new(MockBroadcaster::new());
    let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
    provider.queue_send_id("WA-888");

    let coordinator = IngestionCoordinator::new(harness.store(), broadcaster.clone(), &config);
    let handle = dispatcher(&harness, &config, broadcaster, provider)
        .dispatch(
            "acme",
            "5534999999999",
            OutboundContent::Text { body: "ok".into() },
        )
        .await
        .unwrap();
    handle.task.await.unwrap();

    let outcome = coordinator
        .ingest(
            "acme",
            ProviderKind::Gateway,
            &fixtures::gateway_echo("5534999999999", "WA-888", "ok"),
            IngestSource::Webhook,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
    assert_eq!(harness.message_count(&handle.conversation.id).await, 1);
}

#[tokio::test]
async fn variant_duplicates_are_merged_without_losing_messages() {
    let harness = TestHarness::new().await;
    let legacy = harness.seed_conversation("acme", "553499999999").await;
    let current = harness.seed_conversation("acme", "5534999999999").await;
    harness.seed_message(&legacy.id, "L1").await;
    harness.seed_message(&legacy.id, "L2").await;
    harness.seed_message(&current.id, "C1").await;

    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &config_with_tenant(None),
    );
    let report = coordinator
        .ingest_delivery(
            "acme",
            ProviderKind::Gateway,
            fixtures::gateway_text("5534999999999", "N1", "voltei"),
            IngestSource::Webhook,
        )
        .await;
    assert_eq!(report.count("stored"), 1);

    let variants = ["553499999999".to_string(), "5534999999999".to_string()];
    let open = harness
        .store()
        .find_open_conversations("acme", &variants)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, current.id);
    assert_eq!(harness.message_count(&current.id).await, 4);
}

#[tokio::test]
async fn replayed_deliveries_neither_broadcast_nor_duplicate() {
    let harness = TestHarness::new().await;
    let broadcaster = Arc::new(MockBroadcaster::new());
    let coordinator =
        IngestionCoordinator::new(harness.store(), broadcaster.clone(), &config_with_tenant(None));
    let body = fixtures::gateway_status_batch(&["X1", "X2"], "READ");
    let text = fixtures::gateway_text("5534999999999", "R1", "repetido");

    let mut stored = 0;
    for _ in 0..3 {
        let report = coordinator
            .ingest_delivery("acme", ProviderKind::Gateway, text.clone(), IngestSource::Replay)
            .await;
        assert!(report.errors.is_empty());
        stored += report.count("stored");
    }
    let statuses = coordinator
        .ingest_delivery("acme", ProviderKind::Gateway, body, IngestSource::Replay)
        .await;

    assert_eq!(stored, 1);
    assert_eq!(statuses.count("status_unmatched"), 2);
    let conversation = harness.only_conversation("acme").await;
    assert_eq!(harness.message_count(&conversation.id).await, 1);
    assert!(broadcaster.published().is_empty());
}
