// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider client for deterministic testing.
//!
//! Sends succeed with generated provider ids unless scripted otherwise.
//! History is served from whatever [`MockProvider::set_history`] was given.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use zapline_core::types::{AdapterType, HealthStatus, OutboundContent, ProviderKind, SendReceipt};
use zapline_core::{PluginAdapter, ProviderClient, ZaplineError};

#[derive(Default)]
struct State {
    sends: Vec<(String, OutboundContent)>,
    send_ids: VecDeque<String>,
    rejected_targets: HashSet<String>,
    fail_sends: bool,
    omit_ids: bool,
    send_delay: Option<Duration>,
    history: Vec<Value>,
    history_requests: Vec<(String, usize)>,
    fail_history: bool,
    next_id: usize,
}

pub struct MockProvider {
    kind: ProviderKind,
    state: Mutex<State>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock provider lock")
    }

    /// Every `(target, content)` passed to `send`, in call order.
    pub fn sends(&self) -> Vec<(String, OutboundContent)> {
        self.state().sends.clone()
    }

    /// Provider id returned by the next successful send.
    pub fn queue_send_id(&self, id: &str) {
        self.state().send_ids.push_back(id.to_string());
    }

    /// Answer sends to `target` with `ok: false`.
    pub fn reject_target(&self, target: &str) {
        self.state().rejected_targets.insert(target.to_string());
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    /// Succeed without returning a provider id.
    pub fn omit_send_ids(&self, omit: bool) {
        self.state().omit_ids = omit;
    }

    /// Sleep this long inside every send before answering.
    pub fn set_send_delay(&self, delay: Duration) {
        self.state().send_delay = Some(delay);
    }

    pub fn set_history(&self, history: Vec<Value>) {
        self.state().history = history;
    }

    pub fn fail_history(&self, fail: bool) {
        self.state().fail_history = fail;
    }

    /// Every `(contact, limit)` passed to `get_chat_history`.
    pub fn history_requests(&self) -> Vec<(String, usize)> {
        self.state().history_requests.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SendReceipt, ZaplineError> {
        let delay = {
            let mut state = self.state();
            state.sends.push((to.to_string(), content.clone()));
            state.send_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_sends {
            return Err(ZaplineError::Provider {
                message: format!("mock send to {to} failed"),
                source: None,
            });
        }
        if state.rejected_targets.contains(to) {
            return Ok(SendReceipt {
                ok: false,
                provider_message_id: None,
            });
        }
        if state.omit_ids {
            return Ok(SendReceipt {
                ok: true,
                provider_message_id: None,
            });
        }
        state.next_id += 1;
        let id = match state.send_ids.pop_front() {
            Some(id) => id,
            None => format!("mock-{}", state.next_id),
        };
        Ok(SendReceipt {
            ok: true,
            provider_message_id: Some(id),
        })
    }

    async fn get_chat_history(
        &self,
        contact_key: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ZaplineError> {
        let mut state = self.state();
        state
            .history_requests
            .push((contact_key.to_string(), limit));
        if state.fail_history {
            return Err(ZaplineError::Provider {
                message: "mock history unavailable".into(),
                source: None,
            });
        }
        Ok(state.history.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_sends() {
        let provider = MockProvider::new(ProviderKind::Gateway);
        provider.queue_send_id("P1");
        provider.reject_target("bad");

        let ok = provider.send_text("5534999999999", "hi").await.unwrap();
        assert_eq!(ok.provider_message_id.as_deref(), Some("P1"));
        let generated = provider.send_text("5534999999999", "hi").await.unwrap();
        assert_eq!(generated.provider_message_id.as_deref(), Some("mock-2"));
        assert!(!provider.send_text("bad", "hi").await.unwrap().ok);

        provider.fail_sends(true);
        assert!(provider.send_text("5534999999999", "hi").await.is_err());
        assert_eq!(provider.sends().len(), 4);
    }

    #[tokio::test]
    async fn history_respects_limit() {
        let provider = MockProvider::new(ProviderKind::Cloud);
        provider.set_history(vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})]);
        let history = provider.get_chat_history("5534999999999", 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(provider.history_requests(), vec![("5534999999999".to_string(), 1)]);
    }
}
