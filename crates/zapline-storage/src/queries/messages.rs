// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message insert, lookup, outbound confirmation, and status updates.

use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

use zapline_core::ZaplineError;
use zapline_core::types::{
    CreateOrGet, DeliveryStatus, EchoSignature, Message, NewMessage, now_timestamp,
};

use crate::capabilities::StoreCapabilities;
use crate::database::{Database, is_unique_violation, map_tr_err};
use crate::models::message_from_row;

/// Insert one row shaped by `caps`. Returns the number of rows written
/// (0 when the provider id is already stored in this conversation).
pub(crate) fn insert_row(
    conn: &rusqlite::Connection,
    caps: StoreCapabilities,
    id: &str,
    msg: &NewMessage,
    created_at: &str,
) -> rusqlite::Result<usize> {
    let mut columns = vec![
        "id",
        "conversation_id",
        "provider_message_id",
        "direction",
        "kind",
        "status",
        "body",
        "media_url",
        "created_at",
    ];
    let mut values: Vec<Value> = vec![
        id.to_string().into(),
        msg.conversation_id.clone().into(),
        msg.provider_message_id.clone().into(),
        msg.direction.to_string().into(),
        msg.kind.to_string().into(),
        msg.status.as_str().to_string().into(),
        msg.body.clone().into(),
        msg.media_url.clone().into(),
        created_at.to_string().into(),
    ];

    for column in caps.insertable_optional_columns() {
        let value = match column {
            "file_name" => msg.file_name.clone(),
            "group_sender_phone" => msg.group_sender_phone.clone(),
            "group_sender_name" => msg.group_sender_name.clone(),
            "quoted_message_id" => msg.quoted_message_id.clone(),
            _ => continue,
        };
        columns.push(column);
        values.push(value.into());
    }

    let sql = format!(
        "INSERT INTO messages ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        columns.join(", "),
        crate::queries::placeholders(1, columns.len())
    );
    conn.execute(&sql, params_from_iter(values))
}

/// Insert a message, or return the row already stored for its
/// `(conversation, provider id)`.
pub async fn insert(db: &Database, msg: &NewMessage) -> Result<CreateOrGet<Message>, ZaplineError> {
    let caps = db.capabilities();
    let msg = msg.clone();
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = msg.created_at.clone().unwrap_or_else(now_timestamp);
    let columns = caps.message_columns();

    db.connection()
        .call(move |conn| -> Result<CreateOrGet<Message>, rusqlite::Error> {
            let inserted = insert_row(conn, caps, &id, &msg, &created_at)?;
            if inserted == 1 {
                let row = conn.query_row(
                    &format!("SELECT {columns} FROM messages m WHERE m.id = ?1"),
                    params![id],
                    message_from_row,
                )?;
                return Ok(CreateOrGet::Created(row));
            }
            let row = conn.query_row(
                &format!(
                    "SELECT {columns} FROM messages m
                     WHERE m.conversation_id = ?1 AND m.provider_message_id = ?2"
                ),
                params![msg.conversation_id, msg.provider_message_id],
                message_from_row,
            )?;
            Ok(CreateOrGet::Existing(row))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn find_by_provider_id(
    db: &Database,
    conversation_id: &str,
    provider_message_id: &str,
) -> Result<Option<Message>, ZaplineError> {
    let columns = db.capabilities().message_columns();
    let conversation_id = conversation_id.to_string();
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {columns} FROM messages m
                     WHERE m.conversation_id = ?1 AND m.provider_message_id = ?2"
                ),
                params![conversation_id, provider_message_id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Newest unconfirmed outbound row at or after `since` matching `signature`.
///
/// Text signatures compare against the stored body verbatim; outbound rows
/// are written already trimmed.
pub async fn find_unconfirmed_outbound(
    db: &Database,
    conversation_id: &str,
    since: &str,
    signature: &EchoSignature,
) -> Result<Option<Message>, ZaplineError> {
    let columns = db.capabilities().message_columns();
    let (predicate, needle) = match signature {
        EchoSignature::Media(url) => ("m.media_url = ?3", url.clone()),
        EchoSignature::Text(text) => ("m.media_url IS NULL AND m.body = ?3", text.clone()),
    };
    let sql = format!(
        "SELECT {columns} FROM messages m
         WHERE m.conversation_id = ?1
           AND m.provider_message_id IS NULL
           AND m.direction = 'out'
           AND m.created_at >= ?2
           AND {predicate}
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT 1"
    );
    let conversation_id = conversation_id.to_string();
    let since = since.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, rusqlite::Error> {
            conn.query_row(
                &sql,
                params![conversation_id, since, needle],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Attach a provider id to a local outbound row still lacking one.
pub async fn confirm_outbound(
    db: &Database,
    message_id: &str,
    provider_message_id: &str,
    status: &DeliveryStatus,
) -> Result<bool, ZaplineError> {
    let message_id = message_id.to_string();
    let provider_message_id = provider_message_id.to_string();
    let status = status.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            match conn.execute(
                "UPDATE messages SET provider_message_id = ?2, status = ?3
                 WHERE id = ?1 AND provider_message_id IS NULL",
                params![message_id, provider_message_id, status],
            ) {
                Ok(n) => Ok(n == 1),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Rows carrying `provider_message_id`, optionally scoped to a tenant.
pub async fn find_for_status(
    db: &Database,
    tenant_id: Option<&str>,
    provider_message_id: &str,
) -> Result<Vec<Message>, ZaplineError> {
    let columns = db.capabilities().message_columns();
    let tenant_id = tenant_id.map(str::to_string);
    let provider_message_id = provider_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.provider_message_id = ?1
                   AND (?2 IS NULL OR c.tenant_id = ?2)
                 ORDER BY m.created_at ASC, m.rowid ASC"
            ))?;
            let rows = stmt.query_map(params![provider_message_id, tenant_id], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set the status of one message.
pub async fn set_status(
    db: &Database,
    message_id: &str,
    expected: &DeliveryStatus,
    status: &DeliveryStatus,
) -> Result<bool, ZaplineError> {
    let message_id = message_id.to_string();
    let expected = expected.as_str().to_string();
    let status = status.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute(
                "UPDATE messages SET status = ?3 WHERE id = ?1 AND status = ?2",
                params![message_id, expected, status],
            )?;
            Ok(n == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a conversation in chronological order.
pub async fn list(
    db: &Database,
    conversation_id: &str,
    limit: usize,
) -> Result<Vec<Message>, ZaplineError> {
    let columns = db.capabilities().message_columns();
    let conversation_id = conversation_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {columns} FROM messages m
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![conversation_id, limit], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count(db: &Database, conversation_id: &str) -> Result<usize, ZaplineError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zapline_core::types::{Direction, MessageKind, NewConversation};

    use crate::queries::conversations;

    async fn setup() -> (Database, String, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("msgs.db").to_str().unwrap())
            .await
            .unwrap();
        let conv = conversations::create_or_get(
            &db,
            &NewConversation {
                tenant_id: "acme".into(),
                phone: "5534999999999".into(),
                contact_id: None,
                is_group: false,
                department_id: None,
            },
        )
        .await
        .unwrap()
        .into_inner();
        (db, conv.id, dir)
    }

    fn new_message(conversation_id: &str, pid: Option<&str>, body: &str) -> NewMessage {
        NewMessage {
            conversation_id: conversation_id.into(),
            provider_message_id: pid.map(str::to_string),
            direction: Direction::Inbound,
            kind: MessageKind::Text,
            status: DeliveryStatus::Delivered,
            body: body.into(),
            media_url: None,
            file_name: None,
            group_sender_phone: None,
            group_sender_name: None,
            quoted_message_id: None,
            created_at: None,
        }
    }

    fn outbound(conversation_id: &str, body: &str, media_url: Option<&str>) -> NewMessage {
        NewMessage {
            direction: Direction::Outbound,
            status: DeliveryStatus::Pending,
            media_url: media_url.map(str::to_string),
            ..new_message(conversation_id, None, body)
        }
    }

    #[tokio::test]
    async fn same_provider_id_is_stored_once() {
        let (db, conv, _dir) = setup().await;
        let a = insert(&db, &new_message(&conv, Some("wamid.1"), "oi")).await.unwrap();
        let b = insert(&db, &new_message(&conv, Some("wamid.1"), "oi again"))
            .await
            .unwrap();

        assert!(a.was_created());
        assert!(!b.was_created());
        assert_eq!(b.into_inner().body, "oi");
        assert_eq!(count(&db, &conv).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rows_without_provider_id_never_conflict() {
        let (db, conv, _dir) = setup().await;
        insert(&db, &outbound(&conv, "hello", None)).await.unwrap();
        insert(&db, &outbound(&conv, "hello", None)).await.unwrap();
        assert_eq!(count(&db, &conv).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn optional_columns_round_trip() {
        let (db, conv, _dir) = setup().await;
        let msg = NewMessage {
            kind: MessageKind::Document,
            file_name: Some("report.pdf".into()),
            group_sender_phone: Some("5534988887777".into()),
            group_sender_name: Some("Carla".into()),
            quoted_message_id: Some("wamid.0".into()),
            created_at: Some("2026-05-01T12:00:00.000Z".into()),
            ..new_message(&conv, Some("wamid.2"), "report.pdf")
        };
        let stored = insert(&db, &msg).await.unwrap().into_inner();
        assert_eq!(stored.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(stored.group_sender_name.as_deref(), Some("Carla"));
        assert_eq!(stored.quoted_message_id.as_deref(), Some("wamid.0"));
        assert_eq!(stored.created_at, "2026-05-01T12:00:00.000Z");
        assert_eq!(stored.kind, MessageKind::Document);
    }

    #[tokio::test]
    async fn unconfirmed_outbound_matches_signature_and_window() {
        let (db, conv, _dir) = setup().await;
        let local = insert(&db, &outbound(&conv, "see you", None))
            .await
            .unwrap()
            .into_inner();
        let media = insert(&db, &outbound(&conv, "(image)", Some("https://cdn/x.jpg")))
            .await
            .unwrap()
            .into_inner();

        let found = find_unconfirmed_outbound(
            &db,
            &conv,
            "2000-01-01T00:00:00.000Z",
            &EchoSignature::Text("see you".into()),
        )
        .await
        .unwrap();
        assert_eq!(found.map(|m| m.id), Some(local.id.clone()));

        let found = find_unconfirmed_outbound(
            &db,
            &conv,
            "2000-01-01T00:00:00.000Z",
            &EchoSignature::Media("https://cdn/x.jpg".into()),
        )
        .await
        .unwrap();
        assert_eq!(found.map(|m| m.id), Some(media.id));

        let outside_window = find_unconfirmed_outbound(
            &db,
            &conv,
            "2999-01-01T00:00:00.000Z",
            &EchoSignature::Text("see you".into()),
        )
        .await
        .unwrap();
        assert!(outside_window.is_none());
    }

    #[tokio::test]
    async fn confirm_outbound_applies_once() {
        let (db, conv, _dir) = setup().await;
        let local = insert(&db, &outbound(&conv, "hi", None)).await.unwrap().into_inner();

        assert!(
            confirm_outbound(&db, &local.id, "wamid.9", &DeliveryStatus::Sent)
                .await
                .unwrap()
        );
        assert!(
            !confirm_outbound(&db, &local.id, "wamid.10", &DeliveryStatus::Sent)
                .await
                .unwrap()
        );
        let stored = find_by_provider_id(&db, &conv, "wamid.9").await.unwrap().unwrap();
        assert_eq!(stored.id, local.id);
        assert_eq!(stored.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn confirm_outbound_with_taken_id_is_false() {
        let (db, conv, _dir) = setup().await;
        insert(&db, &new_message(&conv, Some("wamid.7"), "echo")).await.unwrap();
        let local = insert(&db, &outbound(&conv, "echo", None)).await.unwrap().into_inner();

        assert!(
            !confirm_outbound(&db, &local.id, "wamid.7", &DeliveryStatus::Sent)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn status_lookup_is_tenant_scoped_and_cas_guarded() {
        let (db, conv, _dir) = setup().await;
        let m = insert(&db, &new_message(&conv, Some("wamid.s"), "x"))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(find_for_status(&db, Some("acme"), "wamid.s").await.unwrap().len(), 1);
        assert!(find_for_status(&db, Some("other"), "wamid.s").await.unwrap().is_empty());
        assert_eq!(find_for_status(&db, None, "wamid.s").await.unwrap().len(), 1);

        assert!(
            set_status(&db, &m.id, &DeliveryStatus::Delivered, &DeliveryStatus::Read)
                .await
                .unwrap()
        );
        assert!(
            !set_status(&db, &m.id, &DeliveryStatus::Delivered, &DeliveryStatus::Played)
                .await
                .unwrap()
        );
        let listed = list(&db, &conv, 10).await.unwrap();
        assert_eq!(listed[0].status, DeliveryStatus::Read);
    }

    #[test]
    fn insert_row_adapts_to_legacy_table() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE messages (id TEXT PRIMARY KEY, conversation_id TEXT,
                provider_message_id TEXT, direction TEXT, kind TEXT, status TEXT,
                body TEXT, media_url TEXT, created_at TEXT);",
        )
        .unwrap();
        let caps = StoreCapabilities::probe(&conn).unwrap();
        let msg = NewMessage {
            file_name: Some("ignored.pdf".into()),
            group_sender_name: Some("ignored".into()),
            ..new_message("conv-1", Some("wamid.legacy"), "hi")
        };

        let n = insert_row(&conn, caps, "m-1", &msg, "2026-01-01T00:00:00.000Z").unwrap();
        assert_eq!(n, 1);
    }
}
