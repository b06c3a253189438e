// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Races between deliveries, including across independent store handles.

use std::sync::Arc;

use futures::future::join_all;

use zapline_config::ZaplineConfig;
use zapline_core::{ConversationStore, ProviderKind};
use zapline_ingest::{
    ConversationResolver, IngestOutcome, IngestSource, IngestionCoordinator, TenantDirectory,
};
use zapline_storage::SqliteStore;
use zapline_test_utils::{MockBroadcaster, TestHarness, fixtures};

fn quiet_config() -> ZaplineConfig {
    let mut config = ZaplineConfig::default();
    config.ingest.history_backfill_limit = 0;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_delivery_in_parallel_stores_one_row() {
    let harness = TestHarness::new().await;
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &quiet_config(),
    );
    let raw = fixtures::gateway_text("5534999999999", "P1", "oi");

    let tasks = (0..8).map(|_| {
        let coordinator = coordinator.clone();
        let raw = raw.clone();
        tokio::spawn(async move {
            coordinator
                .ingest("acme", ProviderKind::Gateway, &raw, IngestSource::Webhook)
                .await
        })
    });
    let outcomes: Vec<IngestOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let stored = outcomes
        .iter()
        .filter(|o| matches!(o, IngestOutcome::Stored { .. }))
        .count();
    assert_eq!(stored, 1, "outcomes: {outcomes:?}");
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, IngestOutcome::Stored { .. } | IngestOutcome::Duplicate { .. }))
    );

    let conversation = harness.only_conversation("acme").await;
    assert_eq!(harness.message_count(&conversation.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn variant_keys_in_parallel_converge_on_one_conversation() {
    let harness = TestHarness::new().await;
    let coordinator = IngestionCoordinator::new(
        harness.store(),
        Arc::new(MockBroadcaster::new()),
        &quiet_config(),
    );
    let keys = ["5534999999999", "553499999999", "34999999999", "+55 (34) 99999-9999"];

    let tasks = keys.iter().enumerate().map(|(n, key)| {
        let coordinator = coordinator.clone();
        let raw = fixtures::gateway_text(key, &format!("V{n}"), "oi");
        tokio::spawn(async move {
            coordinator
                .ingest("acme", ProviderKind::Gateway, &raw, IngestSource::Webhook)
                .await
        })
    });
    for joined in join_all(tasks).await {
        assert!(matches!(
            joined.unwrap().unwrap(),
            IngestOutcome::Stored { .. }
        ));
    }

    let conversation = harness.only_conversation("acme").await;
    assert_eq!(conversation.phone, "5534999999999");
    assert_eq!(harness.message_count(&conversation.id).await, keys.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn twelve_and_thirteen_digit_races_never_split() {
    let harness = TestHarness::new().await;
    let resolver = Arc::new(ConversationResolver::new(
        harness.store(),
        Arc::new(TenantDirectory::default()),
    ));

    for n in 0..20u32 {
        let short = format!("55349{:07}", 8_000_000 + n);
        let long = format!("553499{:07}", 8_000_000 + n);
        let tasks = [short, long].map(|key| {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.resolve("acme", &key, false, None).await })
        });
        let [a, b] = tasks;
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a.conversation.id, b.conversation.id, "round {n}");
        assert_eq!(usize::from(a.created) + usize::from(b.created), 1);
        assert_eq!(a.conversation.phone, format!("553499{:07}", 8_000_000 + n));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_store_handles_share_one_identity() {
    let harness = TestHarness::new().await;
    let second = Arc::new(SqliteStore::new(harness.storage_config()));
    second.initialize().await.unwrap();

    let config = quiet_config();
    let left = IngestionCoordinator::new(harness.store(), Arc::new(MockBroadcaster::new()), &config);
    let right = IngestionCoordinator::new(second.clone(), Arc::new(MockBroadcaster::new()), &config);

    let mut tasks = Vec::new();
    for n in 0..6 {
        let coordinator = if n % 2 == 0 { left.clone() } else { right.clone() };
        let raw = fixtures::gateway_text("5534988887777", &format!("S{}", n / 2), "oi");
        tasks.push(tokio::spawn(async move {
            coordinator
                .ingest("acme", ProviderKind::Gateway, &raw, IngestSource::Webhook)
                .await
        }));
    }
    for joined in join_all(tasks).await {
        joined.unwrap().unwrap();
    }

    let conversation = harness.only_conversation("acme").await;
    // S0, S1 and S2 each arrived twice, once per handle.
    assert_eq!(harness.message_count(&conversation.id).await, 3);
    let contacts = second
        .find_contacts_by_phones("acme", &["5534988887777".to_string()])
        .await
        .unwrap();
    assert_eq!(contacts.len(), 1);

    second.close().await.unwrap();
}
