// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History backfill for newly created conversations.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{info, warn};

use zapline_core::phone;
use zapline_core::types::ProviderKind;
use zapline_core::ProviderClient;
use zapline_prometheus::recording;

use crate::coordinator::{IngestOutcome, IngestSource, IngestionCoordinator};
use crate::envelope;

/// Fetch up to `limit` past messages of `contact_key` and replay them through
/// the pipeline as [`IngestSource::Backfill`].
///
/// Boxed because the pipeline that spawns it is also what it drives.
/// Failures are logged and dropped.
pub fn backfill_task(
    coordinator: IngestionCoordinator,
    client: Arc<dyn ProviderClient>,
    tenant_id: String,
    provider: ProviderKind,
    contact_key: String,
    limit: usize,
) -> BoxFuture<'static, ()> {
    async move {
        if limit == 0 {
            return;
        }
        let target = phone::to_send_format(&contact_key);
        let history = match client.get_chat_history(&target, limit).await {
            Ok(history) => history,
            Err(e) => {
                warn!(tenant = %tenant_id, contact = %contact_key, error = %e, "history fetch failed");
                recording::record_collaborator_failure("provider");
                return;
            }
        };

        let fetched = history.len();
        let mut stored = 0usize;
        for payload in history {
            for element in envelope::explode(provider, payload) {
                match coordinator
                    .ingest(&tenant_id, provider, &element, IngestSource::Backfill)
                    .await
                {
                    Ok(IngestOutcome::Stored { .. }) => stored += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(tenant = %tenant_id, contact = %contact_key, error = %e, "backfill element failed");
                    }
                }
            }
        }
        info!(tenant = %tenant_id, contact = %contact_key, fetched, stored, "history backfill complete");
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapline_config::ZaplineConfig;
    use zapline_test_utils::{MockBroadcaster, MockProvider, TestHarness, fixtures};

    #[tokio::test]
    async fn replays_history_without_broadcasting() {
        let harness = TestHarness::new().await;
        let broadcaster = Arc::new(MockBroadcaster::new());
        let coordinator = IngestionCoordinator::new(
            harness.store(),
            broadcaster.clone(),
            &ZaplineConfig::default(),
        );
        let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
        provider.set_history(vec![
            fixtures::gateway_text("553499999999", "H1", "one"),
            fixtures::gateway_text("553499999999", "H2", "two"),
        ]);

        backfill_task(
            coordinator,
            provider.clone(),
            "acme".into(),
            ProviderKind::Gateway,
            "553499999999".into(),
            5,
        )
        .await;

        // A 12-digit mobile key is asked for in send format.
        assert_eq!(provider.history_requests(), vec![("5534999999999".to_string(), 5)]);
        let conversation = harness.only_conversation("acme").await;
        assert_eq!(harness.message_count(&conversation.id).await, 2);
        assert!(broadcaster.published().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_swallowed() {
        let harness = TestHarness::new().await;
        let coordinator = IngestionCoordinator::new(
            harness.store(),
            Arc::new(MockBroadcaster::new()),
            &ZaplineConfig::default(),
        );
        let provider = Arc::new(MockProvider::new(ProviderKind::Gateway));
        provider.fail_history(true);

        backfill_task(
            coordinator,
            provider,
            "acme".into(),
            ProviderKind::Gateway,
            "5534999999999".into(),
            5,
        )
        .await;
        assert!(harness.conversations("acme").await.is_empty());
    }
}
