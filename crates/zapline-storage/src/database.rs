// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Every statement on one handle runs on tokio-rusqlite's single background
//! thread. Several handles (or processes) may share a file; they coordinate
//! through WAL and `busy_timeout`, and the unique indexes settle any race.

use std::time::Duration;

use rusqlite::ErrorCode;
use tracing::{debug, info};

use zapline_config::model::StorageConfig;
use zapline_core::ZaplineError;

use crate::capabilities::StoreCapabilities;
use crate::migrations;

/// A handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    capabilities: StoreCapabilities,
}

impl Database {
    /// Open `path` with WAL, foreign keys, and a 5s busy timeout, then migrate.
    pub async fn open(path: &str) -> Result<Self, ZaplineError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open_with(&config).await
    }

    /// Open the database described by `config`, then migrate and probe
    /// capabilities.
    pub async fn open_with(config: &StorageConfig) -> Result<Self, ZaplineError> {
        let path = config.database_path.clone();
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ZaplineError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| ZaplineError::Storage {
                source: Box::new(e),
            })?;

        let wal_mode = config.wal_mode;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            if wal_mode {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(journal_mode = %mode, "journal mode set");
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<Result<(), ZaplineError>, rusqlite::Error> {
            Ok(migrations::run_migrations(conn))
        })
        .await
        .map_err(map_tr_err)??;

        let capabilities = conn
            .call(|conn| -> Result<StoreCapabilities, rusqlite::Error> {
                StoreCapabilities::probe(conn)
            })
            .await
            .map_err(map_tr_err)?;

        info!(path = %path, wal = wal_mode, "database opened");
        Ok(Self { conn, capabilities })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Optional columns available on this database.
    pub fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    /// Checkpoint the WAL into the main file.
    pub async fn checkpoint(&self) -> Result<(), ZaplineError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into the storage variant.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ZaplineError {
    ZaplineError::Storage {
        source: Box::new(e),
    }
}

/// Whether `e` is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && matches!(
                    err.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

/// Whether `e` is a FOREIGN KEY violation.
pub(crate) fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        }
        _ => false,
    }
}
