// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric window persistence.
//!
//! Windows are keyed by (window_start, agent_id, session_id); the aggregator
//! flushes the same window repeatedly as it fills, so writes are upserts.

use rusqlite::{Row, params};

use drover_core::types::MetricWindow;
use drover_core::BusError;

use crate::database::{Database, map_tr_err};

fn window_from_row(row: &Row<'_>) -> rusqlite::Result<MetricWindow> {
    Ok(MetricWindow {
        window_start: row.get(0)?,
        agent_id: row.get(1)?,
        session_id: row.get(2)?,
        messages_processed: row.get(3)?,
        avg_latency_ms: row.get(4)?,
        errors: row.get(5)?,
        last_update_ts: row.get(6)?,
    })
}

/// Upsert a batch of windows in one transaction.
pub async fn upsert_windows(db: &Database, windows: &[MetricWindow]) -> Result<(), BusError> {
    if windows.is_empty() {
        return Ok(());
    }
    let windows = windows.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO metric_windows (window_start, agent_id, session_id,
                         messages_processed, avg_latency_ms, errors, last_update_ts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (window_start, agent_id, session_id) DO UPDATE SET
                         messages_processed = excluded.messages_processed,
                         avg_latency_ms = excluded.avg_latency_ms,
                         errors = excluded.errors,
                         last_update_ts = excluded.last_update_ts",
                )?;
                for w in &windows {
                    stmt.execute(params![
                        w.window_start,
                        w.agent_id,
                        w.session_id,
                        w.messages_processed,
                        w.avg_latency_ms,
                        w.errors,
                        w.last_update_ts,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Windows starting at or after `since`, oldest first.
pub async fn windows_since(db: &Database, since: i64) -> Result<Vec<MetricWindow>, BusError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT window_start, agent_id, session_id, messages_processed,
                        avg_latency_ms, errors, last_update_ts
                 FROM metric_windows
                 WHERE window_start >= ?1
                 ORDER BY window_start ASC, agent_id ASC, session_id ASC",
            )?;
            let rows = stmt.query_map(params![since], window_from_row)?;
            let mut windows = Vec::new();
            for row in rows {
                windows.push(row?);
            }
            Ok(windows)
        })
        .await
        .map_err(map_tr_err)
}
