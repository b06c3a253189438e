// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `zapline-core`.

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;

pub use zapline_core::types::{Contact, Conversation, Message};
use zapline_core::types::{DeliveryStatus, Direction, MessageKind};

/// Column list shared by every contact query.
pub(crate) const CONTACT_COLUMNS: &str =
    "id, tenant_id, phone, name, photo_url, last_contact_at, created_at";

/// Column list shared by every conversation query.
pub(crate) const CONVERSATION_COLUMNS: &str = "id, tenant_id, phone, contact_id, is_group, \
     status, department_id, last_activity_at, created_at";

fn parse_col<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        phone: row.get(2)?,
        name: row.get(3)?,
        photo_url: row.get(4)?,
        last_contact_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        phone: row.get(2)?,
        contact_id: row.get(3)?,
        is_group: row.get(4)?,
        status: parse_col(row, 5)?,
        department_id: row.get(6)?,
        last_activity_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Map a row selected with [`StoreCapabilities::message_columns`](crate::StoreCapabilities::message_columns).
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let direction: Direction = parse_col(row, 3)?;
    let kind: MessageKind = parse_col(row, 4)?;
    let status: String = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        provider_message_id: row.get(2)?,
        direction,
        kind,
        status: DeliveryStatus::from_stored(&status),
        body: row.get(6)?,
        media_url: row.get(7)?,
        created_at: row.get(8)?,
        file_name: row.get(9)?,
        group_sender_phone: row.get(10)?,
        group_sender_name: row.get(11)?,
        quoted_message_id: row.get(12)?,
    })
}
