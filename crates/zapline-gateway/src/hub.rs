// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process room hub implementing [`Broadcaster`].
//!
//! Each room is a `tokio::sync::broadcast` channel created on first
//! subscription. Publishing to a room nobody listens to is a no-op, and a
//! room whose last subscriber left is pruned on the next publish.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use zapline_core::types::{AdapterType, HealthStatus};
use zapline_core::{Broadcaster, PluginAdapter, ZaplineError};

/// Buffered frames per room before slow subscribers start lagging.
pub const ROOM_CAPACITY: usize = 256;

/// A frame as delivered to WebSocket clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoomFrame {
    pub room: String,
    pub event: String,
    pub payload: Value,
}

pub struct RoomHub {
    rooms: DashMap<String, broadcast::Sender<Arc<RoomFrame>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<Arc<RoomFrame>> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Rooms with at least one live subscriber.
    pub fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        rooms.sort();
        rooms
    }

    fn prune(&self) {
        self.rooms.retain(|_, sender| sender.receiver_count() > 0);
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for RoomHub {
    fn name(&self) -> &str {
        "room-hub"
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
        self.rooms.clear();
        Ok(())
    }
}

#[async_trait]
impl Broadcaster for RoomHub {
    async fn publish(
        &self,
        rooms: &[String],
        event: &str,
        payload: Value,
    ) -> Result<(), ZaplineError> {
        let mut delivered = 0usize;
        for room in rooms {
            let Some(sender) = self.rooms.get(room).map(|s| s.clone()) else {
                continue;
            };
            let frame = Arc::new(RoomFrame {
                room: room.clone(),
                event: event.to_string(),
                payload: payload.clone(),
            });
            // Err only means every receiver is gone.
            if let Ok(n) = sender.send(frame) {
                delivered += n;
            }
        }
        tracing::trace!(event, rooms = rooms.len(), delivered, "published");
        self.prune();
        Ok(())
    }
}
