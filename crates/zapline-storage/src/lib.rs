// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite conversation store for Zapline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and typed
//! queries for contacts, conversations, and messages. Concurrency control is
//! delegated entirely to the partial unique indexes declared in the schema:
//! every create is an insert-or-read, never a check-then-insert.

pub mod adapter;
pub mod capabilities;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStore;
pub use capabilities::StoreCapabilities;
pub use database::Database;
