// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. The `Database` struct IS the single writer: query modules accept
//! `&Database` and go through `connection().call()`. Do NOT create
//! additional `Connection` instances for writes.

use std::path::Path;

use thiserror::Error;
use tokio_rusqlite::Connection;
use tracing::debug;

use drover_config::StorageConfig;
use drover_core::BusError;

/// Failures during database setup. The open closure mixes PRAGMA execution
/// and refinery migrations, so its error type must carry both.
#[derive(Debug, Error)]
enum SetupError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] refinery::Error),
}

/// Handle to the single-writer SQLite connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at the configured path, apply
    /// PRAGMAs, and run pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, BusError> {
        let path = config.database_path.clone();
        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(BusError::store)?;
        }

        let conn = Connection::open(&path).await.map_err(BusError::store)?;
        let journal_mode = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.call(move |conn| -> Result<(), SetupError> {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode = {journal_mode};
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;"
            ))?;
            crate::migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(BusError::store)?;

        debug!(path = %path, wal = config.wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL, flushing pending pages into the main file.
    pub async fn close(&self) -> Result<(), BusError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the bus's fail-closed store error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> BusError {
    BusError::store(e)
}
