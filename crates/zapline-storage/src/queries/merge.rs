// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging duplicate open conversations into a canonical one.
//!
//! Every child row is re-pointed at the canonical conversation inside one
//! immediate transaction per duplicate. Rows that cannot move without
//! breaking a unique constraint stay where they are, and the duplicate is
//! then closed rather than deleted, so no message is ever lost.

use rusqlite::{TransactionBehavior, params};
use tracing::{debug, warn};

use zapline_core::ZaplineError;
use zapline_core::types::MergeReport;

use crate::database::{Database, is_foreign_key_violation, map_tr_err};

enum Disposition {
    Deleted,
    Closed,
    Missing,
}

fn merge_one(
    conn: &mut rusqlite::Connection,
    canonical_id: &str,
    duplicate_id: &str,
) -> rusqlite::Result<(usize, Disposition)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
        params![duplicate_id],
        |row| row.get(0),
    )?;
    if !exists {
        tx.commit()?;
        return Ok((0, Disposition::Missing));
    }

    let moved = tx.execute(
        "UPDATE OR IGNORE messages SET conversation_id = ?1 WHERE conversation_id = ?2",
        params![canonical_id, duplicate_id],
    )?;

    tx.execute(
        "UPDATE OR IGNORE conversation_tags SET conversation_id = ?1 WHERE conversation_id = ?2",
        params![canonical_id, duplicate_id],
    )?;
    // Whatever is left is a tag the canonical conversation already carries.
    tx.execute(
        "DELETE FROM conversation_tags WHERE conversation_id = ?1",
        params![duplicate_id],
    )?;

    tx.execute(
        "UPDATE attendance_history SET conversation_id = ?1 WHERE conversation_id = ?2",
        params![canonical_id, duplicate_id],
    )?;

    tx.execute(
        "INSERT INTO unread_counters (conversation_id, user_id, unread)
         SELECT ?1, user_id, unread FROM unread_counters WHERE conversation_id = ?2
         ON CONFLICT (conversation_id, user_id) DO UPDATE SET unread = unread + excluded.unread",
        params![canonical_id, duplicate_id],
    )?;
    tx.execute(
        "DELETE FROM unread_counters WHERE conversation_id = ?1",
        params![duplicate_id],
    )?;

    tx.execute(
        "UPDATE conversations SET
            contact_id = COALESCE(contact_id,
                (SELECT contact_id FROM conversations WHERE id = ?2)),
            department_id = COALESCE(department_id,
                (SELECT department_id FROM conversations WHERE id = ?2)),
            last_activity_at = MAX(last_activity_at,
                (SELECT last_activity_at FROM conversations WHERE id = ?2))
         WHERE id = ?1",
        params![canonical_id, duplicate_id],
    )?;

    let disposition = match tx.execute(
        "DELETE FROM conversations WHERE id = ?1",
        params![duplicate_id],
    ) {
        Ok(_) => Disposition::Deleted,
        Err(e) if is_foreign_key_violation(&e) => {
            tx.execute(
                "UPDATE conversations SET status = 'closed' WHERE id = ?1",
                params![duplicate_id],
            )?;
            Disposition::Closed
        }
        Err(e) => return Err(e),
    };

    tx.commit()?;
    Ok((moved, disposition))
}

/// Merge `duplicate_ids` into `canonical_id`.
///
/// Safe to retry: ids that no longer exist are skipped.
pub async fn merge_conversations(
    db: &Database,
    canonical_id: &str,
    duplicate_ids: &[String],
) -> Result<MergeReport, ZaplineError> {
    let canonical_id = canonical_id.to_string();
    let duplicates: Vec<String> = duplicate_ids
        .iter()
        .filter(|id| **id != canonical_id)
        .cloned()
        .collect();

    db.connection()
        .call(move |conn| -> Result<MergeReport, rusqlite::Error> {
            let mut report = MergeReport {
                canonical_id: canonical_id.clone(),
                ..MergeReport::default()
            };
            for duplicate in duplicates {
                let (moved, disposition) = merge_one(conn, &canonical_id, &duplicate)?;
                report.moved_messages += moved;
                match disposition {
                    Disposition::Deleted => {
                        debug!(canonical = %canonical_id, duplicate = %duplicate, moved, "duplicate conversation deleted");
                        report.deleted.push(duplicate);
                    }
                    Disposition::Closed => {
                        warn!(canonical = %canonical_id, duplicate = %duplicate, "duplicate still referenced, closed instead of deleted");
                        report.closed.push(duplicate);
                    }
                    Disposition::Missing => {}
                }
            }
            Ok(report)
        })
        .await
        .map_err(map_tr_err)
}
