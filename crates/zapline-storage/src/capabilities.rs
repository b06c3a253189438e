// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Probe of which optional message columns the connected database has.
//!
//! Probed once when the store opens so inserts and selects are shaped
//! correctly the first time, even against a database created before those
//! columns existed.

use tracing::debug;

/// Optional columns of the `messages` table.
pub const OPTIONAL_MESSAGE_COLUMNS: [&str; 4] = [
    "file_name",
    "group_sender_phone",
    "group_sender_name",
    "quoted_message_id",
];

const BASE_MESSAGE_COLUMNS: &str =
    "id, conversation_id, provider_message_id, direction, kind, status, body, media_url, created_at";

/// Which optional `messages` columns exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub file_name: bool,
    pub group_sender_phone: bool,
    pub group_sender_name: bool,
    pub quoted_message_id: bool,
}

impl StoreCapabilities {
    /// Every optional column present (the current schema).
    pub const FULL: Self = Self {
        file_name: true,
        group_sender_phone: true,
        group_sender_name: true,
        quoted_message_id: true,
    };

    /// Read `PRAGMA table_info(messages)`.
    pub fn probe(conn: &rusqlite::Connection) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare("PRAGMA table_info(messages)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let has = |col: &str| names.iter().any(|n| n == col);

        let caps = Self {
            file_name: has("file_name"),
            group_sender_phone: has("group_sender_phone"),
            group_sender_name: has("group_sender_name"),
            quoted_message_id: has("quoted_message_id"),
        };
        debug!(?caps, "probed message columns");
        Ok(caps)
    }

    fn flags(&self) -> [bool; 4] {
        [
            self.file_name,
            self.group_sender_phone,
            self.group_sender_name,
            self.quoted_message_id,
        ]
    }

    /// SELECT list for messages, aliased as `m`.
    ///
    /// Missing optional columns are selected as `NULL` so row mapping has a
    /// fixed shape.
    pub fn message_columns(&self) -> String {
        let mut cols: Vec<String> = BASE_MESSAGE_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect();
        for (name, present) in OPTIONAL_MESSAGE_COLUMNS.iter().zip(self.flags()) {
            if present {
                cols.push(format!("m.{name}"));
            } else {
                cols.push(format!("NULL AS {name}"));
            }
        }
        cols.join(", ")
    }

    /// Optional columns that inserts may write.
    pub fn insertable_optional_columns(&self) -> Vec<&'static str> {
        OPTIONAL_MESSAGE_COLUMNS
            .iter()
            .zip(self.flags())
            .filter_map(|(name, present)| present.then_some(*name))
            .collect()
    }
}

impl Default for StoreCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_detects_legacy_table() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE messages (id TEXT, conversation_id TEXT, provider_message_id TEXT,
                direction TEXT, kind TEXT, status TEXT, body TEXT, media_url TEXT,
                created_at TEXT, file_name TEXT);",
        )
        .unwrap();

        let caps = StoreCapabilities::probe(&conn).unwrap();
        assert!(caps.file_name);
        assert!(!caps.group_sender_phone);
        assert!(!caps.quoted_message_id);
        assert_eq!(caps.insertable_optional_columns(), vec!["file_name"]);
        assert!(caps.message_columns().contains("NULL AS group_sender_name"));
        assert!(caps.message_columns().contains("m.file_name"));
    }

    #[test]
    fn full_capabilities_select_every_column() {
        let cols = StoreCapabilities::FULL.message_columns();
        assert!(!cols.contains("NULL AS"));
        assert_eq!(cols.split(", ").count(), 13);
    }
}
