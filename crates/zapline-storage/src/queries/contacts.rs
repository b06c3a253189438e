// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact lookups and create-or-get.

use rusqlite::{OptionalExtension, params, params_from_iter};

use zapline_core::types::{Contact, CreateOrGet, NewContact, now_timestamp};
use zapline_core::ZaplineError;

use crate::database::{Database, map_tr_err};
use crate::models::{CONTACT_COLUMNS, contact_from_row};
use crate::queries::placeholders;

/// Contacts of `tenant_id` stored under any of `phones`, oldest first.
pub async fn find_by_phones(
    db: &Database,
    tenant_id: &str,
    phones: &[String],
) -> Result<Vec<Contact>, ZaplineError> {
    if phones.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {CONTACT_COLUMNS} FROM contacts
         WHERE tenant_id = ?1 AND phone IN ({})
         ORDER BY created_at ASC, rowid ASC",
        placeholders(2, phones.len())
    );
    let mut args = vec![tenant_id.to_string()];
    args.extend(phones.iter().cloned());

    db.connection()
        .call(move |conn| -> Result<Vec<Contact>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), contact_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a contact, or return the one that already owns `(tenant, phone)`.
pub async fn create_or_get(
    db: &Database,
    contact: &NewContact,
) -> Result<CreateOrGet<Contact>, ZaplineError> {
    let contact = contact.clone();
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_timestamp();

    db.connection()
        .call(move |conn| -> Result<CreateOrGet<Contact>, rusqlite::Error> {
            let inserted = conn.execute(
                "INSERT INTO contacts (id, tenant_id, phone, name, photo_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
                params![
                    id,
                    contact.tenant_id,
                    contact.phone,
                    contact.name,
                    contact.photo_url,
                    now
                ],
            )?;
            let row = conn.query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE tenant_id = ?1 AND phone = ?2"
                ),
                params![contact.tenant_id, contact.phone],
                contact_from_row,
            )?;
            Ok(if inserted == 1 {
                CreateOrGet::Created(row)
            } else {
                CreateOrGet::Existing(row)
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Fill `name` and `photo_url` where they are NULL or empty.
pub async fn update_profile(
    db: &Database,
    contact_id: &str,
    name: Option<&str>,
    photo_url: Option<&str>,
) -> Result<(), ZaplineError> {
    let contact_id = contact_id.to_string();
    let name = name.map(str::to_string);
    let photo_url = photo_url.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE contacts
                 SET name = COALESCE(NULLIF(name, ''), ?2),
                     photo_url = COALESCE(NULLIF(photo_url, ''), ?3)
                 WHERE id = ?1",
                params![contact_id, name, photo_url],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move `last_contact_at` forward to `at`.
pub async fn touch(db: &Database, contact_id: &str, at: &str) -> Result<(), ZaplineError> {
    let contact_id = contact_id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE contacts
                 SET last_contact_at = MAX(COALESCE(last_contact_at, ''), ?2)
                 WHERE id = ?1",
                params![contact_id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one contact by id.
pub async fn get(db: &Database, contact_id: &str) -> Result<Option<Contact>, ZaplineError> {
    let contact_id = contact_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Contact>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![contact_id],
                contact_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
