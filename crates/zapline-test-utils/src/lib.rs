// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapline integration tests.
//!
//! Provides a temp-file store harness, mock collaborators, and provider
//! payload fixtures for fast, deterministic tests without external services.
//!
//! # Components
//!
//! - [`TestHarness`] - Initialized SQLite store in a temp directory
//! - [`MockBroadcaster`] - Captures every published realtime event
//! - [`MockProvider`] - Scriptable provider client recording sends and history requests
//! - [`fixtures`] - Webhook payloads in both provider shapes

pub mod fixtures;
pub mod harness;
pub mod mock_broadcaster;
pub mod mock_provider;

pub use harness::TestHarness;
pub use mock_broadcaster::{MockBroadcaster, PublishedEvent};
pub use mock_provider::MockProvider;
