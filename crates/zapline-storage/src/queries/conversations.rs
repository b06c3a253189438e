// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation lookups, create-or-get, and activity tracking.

use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::debug;

use zapline_core::ZaplineError;
use zapline_core::types::{Conversation, CreateOrGet, NewConversation, now_timestamp};

use crate::database::{Database, is_unique_violation, map_tr_err};
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row};
use crate::queries::placeholders;

/// Insert attempts before giving up when the conflicting row keeps vanishing
/// (closed by another writer between our insert and our read).
const CREATE_ATTEMPTS: usize = 3;

/// Non-closed conversations of `tenant_id` under any of `phones`, newest first.
pub async fn find_open(
    db: &Database,
    tenant_id: &str,
    phones: &[String],
) -> Result<Vec<Conversation>, ZaplineError> {
    if phones.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations
         WHERE tenant_id = ?1 AND status <> 'closed' AND phone IN ({})
         ORDER BY created_at DESC, rowid DESC",
        placeholders(2, phones.len())
    );
    let mut args = vec![tenant_id.to_string()];
    args.extend(phones.iter().cloned());

    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert an open conversation, or return the open one that already owns
/// `(tenant, phone)`.
pub async fn create_or_get(
    db: &Database,
    conversation: &NewConversation,
) -> Result<CreateOrGet<Conversation>, ZaplineError> {
    let new = conversation.clone();
    let now = now_timestamp();

    db.connection()
        .call(move |conn| -> Result<CreateOrGet<Conversation>, rusqlite::Error> {
            let select = format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE tenant_id = ?1 AND phone = ?2 AND status <> 'closed'"
            );
            for _ in 0..CREATE_ATTEMPTS {
                let id = uuid::Uuid::new_v4().to_string();
                let inserted = conn.execute(
                    "INSERT INTO conversations
                        (id, tenant_id, phone, contact_id, is_group, status,
                         department_id, last_activity_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'open', ?6, ?7, ?7)
                     ON CONFLICT DO NOTHING",
                    params![
                        id,
                        new.tenant_id,
                        new.phone,
                        new.contact_id,
                        new.is_group,
                        new.department_id,
                        now
                    ],
                )?;
                let row = conn
                    .query_row(
                        &select,
                        params![new.tenant_id, new.phone],
                        conversation_from_row,
                    )
                    .optional()?;
                match row {
                    Some(row) if inserted == 1 => return Ok(CreateOrGet::Created(row)),
                    Some(row) => return Ok(CreateOrGet::Existing(row)),
                    None => {
                        debug!(phone = %new.phone, "conflicting conversation vanished, retrying");
                    }
                }
            }
            Err(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

/// Rewrite the stored phone. `false` when another open conversation owns it.
pub async fn update_phone(
    db: &Database,
    conversation_id: &str,
    phone: &str,
) -> Result<bool, ZaplineError> {
    let conversation_id = conversation_id.to_string();
    let phone = phone.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            match conn.execute(
                "UPDATE conversations SET phone = ?2 WHERE id = ?1",
                params![conversation_id, phone],
            ) {
                Ok(n) => Ok(n == 1),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Attach `contact_id` to a conversation that has no contact yet.
pub async fn link_contact(
    db: &Database,
    conversation_id: &str,
    contact_id: &str,
) -> Result<(), ZaplineError> {
    let conversation_id = conversation_id.to_string();
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET contact_id = ?2
                 WHERE id = ?1 AND contact_id IS NULL",
                params![conversation_id, contact_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move `last_activity_at` forward to `at`.
pub async fn touch(db: &Database, conversation_id: &str, at: &str) -> Result<(), ZaplineError> {
    let conversation_id = conversation_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET last_activity_at = MAX(last_activity_at, ?2)
                 WHERE id = ?1",
                params![conversation_id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(
    db: &Database,
    conversation_id: &str,
) -> Result<Option<Conversation>, ZaplineError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Conversation>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![conversation_id],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Set a conversation's status (used by tests and maintenance tooling).
pub async fn set_status(
    db: &Database,
    conversation_id: &str,
    status: zapline_core::ConversationStatus,
) -> Result<(), ZaplineError> {
    let conversation_id = conversation_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE conversations SET status = ?2 WHERE id = ?1",
                params![conversation_id, status],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Every conversation of `tenant_id`, closed ones included, oldest first.
pub async fn list_for_tenant(
    db: &Database,
    tenant_id: &str,
) -> Result<Vec<Conversation>, ZaplineError> {
    let tenant_id = tenant_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Conversation>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE tenant_id = ?1 ORDER BY created_at, rowid"
            ))?;
            let rows = stmt.query_map(params![tenant_id], conversation_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
