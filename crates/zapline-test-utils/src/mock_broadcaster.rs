// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock broadcaster capturing published events for assertion in tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use zapline_core::types::{AdapterType, HealthStatus};
use zapline_core::{Broadcaster, PluginAdapter, ZaplineError};

/// One captured `publish` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub rooms: Vec<String>,
    pub event: String,
    pub payload: Value,
}

/// Records every publish. With [`MockBroadcaster::set_failing`] each publish
/// is still recorded but returns an error.
#[derive(Default)]
pub struct MockBroadcaster {
    published: Mutex<Vec<PublishedEvent>>,
    failing: AtomicBool,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let broadcaster = Self::new();
        broadcaster.set_failing(true);
        broadcaster
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.published.lock().expect("published lock").clone()
    }

    pub fn events_named(&self, event: &str) -> Vec<PublishedEvent> {
        self.published()
            .into_iter()
            .filter(|e| e.event == event)
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().expect("published lock").clear();
    }
}

#[async_trait]
impl PluginAdapter for MockBroadcaster {
    fn name(&self) -> &str {
        "mock-broadcaster"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broadcast
    }

    async fn health_check(&self) -> Result<HealthStatus, ZaplineError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ZaplineError> {
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn publish(
        &self,
        rooms: &[String],
        event: &str,
        payload: Value,
    ) -> Result<(), ZaplineError> {
        self.published
            .lock()
            .expect("published lock")
            .push(PublishedEvent {
                rooms: rooms.to_vec(),
                event: event.to_string(),
                payload,
            });
        if self.failing.load(Ordering::SeqCst) {
            return Err(ZaplineError::Broadcast {
                message: "mock broadcaster configured to fail".into(),
                source: None,
            });
        }
        Ok(())
    }
}
