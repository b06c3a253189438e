// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary and applied on
//! every [`Database::open`](crate::Database::open).

use zapline_core::ZaplineError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// Refinery records applied versions in `refinery_schema_history`, so this
/// is safe to call on an up-to-date database.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), ZaplineError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| ZaplineError::Storage {
            source: Box::new(e),
        })?;
    Ok(())
}
