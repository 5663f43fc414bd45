// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only event log queries.
//!
//! Events are never updated or deleted; the log is the audit trail from
//! which message state can be replayed.

use rusqlite::types::Type;
use rusqlite::{Row, params};

use drover_core::types::Event;
use drover_core::BusError;

use crate::database::{Database, map_tr_err};

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let kind: String = row.get(5)?;
    let details: String = row.get(6)?;
    Ok(Event {
        id: row.get(0)?,
        ts: row.get(1)?,
        agent_id: row.get(2)?,
        session_id: row.get(3)?,
        message_id: row.get(4)?,
        kind: kind
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        details: serde_json::from_str(&details)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
    })
}

const EVENT_COLUMNS: &str = "id, ts, agent_id, session_id, message_id, event, details";

/// Insert an event inside an already-open transaction. Used by the message
/// transitions so a state change and its event commit together.
pub(crate) fn insert_event_tx(
    conn: &rusqlite::Connection,
    event: &Event,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO events (ts, agent_id, session_id, message_id, event, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.ts,
            event.agent_id,
            event.session_id,
            event.message_id,
            event.kind.to_string(),
            event.details.to_string(),
        ],
    )?;
    Ok(())
}

/// Append a standalone event (one not tied to a message transition).
pub async fn append_event(db: &Database, event: &Event) -> Result<(), BusError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            insert_event_tx(conn, &event)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Full event history for one message, in insertion order.
pub async fn events_for_message(db: &Database, message_id: &str) -> Result<Vec<Event>, BusError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE message_id = ?1 ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map(params![message_id], event_from_row)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Events with id greater than `after_id`, oldest first, up to `limit`.
/// Cursor-style paging for log consumers.
pub async fn events_since(
    db: &Database,
    after_id: i64,
    limit: u32,
) -> Result<Vec<Event>, BusError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![after_id, limit], event_from_row)?;
            let mut events = Vec::new();
            for row in rows {
                events.push(row?);
            }
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

/// Whether the log records an ack of this message by this claimant. Backs
/// idempotent re-acks after the lease pair has been cleared.
pub async fn was_acked_by(
    db: &Database,
    message_id: &str,
    claimant: &str,
) -> Result<bool, BusError> {
    let message_id = message_id.to_string();
    let claimant = claimant.to_string();
    db.connection()
        .call(move |conn| {
            let acked = conn.query_row(
                "SELECT EXISTS(
                     SELECT 1 FROM events
                     WHERE message_id = ?1 AND event = 'ack' AND agent_id = ?2
                 )",
                params![message_id, claimant],
                |row| row.get(0),
            )?;
            Ok(acked)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::types::EventKind;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = drover_config::StorageConfig {
            database_path: dir.path().join("events.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let db = Database::open(&config).await.unwrap();
        (db, dir)
    }

    fn make_event(kind: EventKind, message_id: &str, agent_id: &str) -> Event {
        Event {
            id: 0,
            ts: 1_000,
            agent_id: Some(agent_id.to_string()),
            session_id: Some("s-1".to_string()),
            message_id: message_id.to_string(),
            kind,
            details: json!({"k": "v"}),
        }
    }

    #[tokio::test]
    async fn append_assigns_monotonic_ids() {
        let (db, _dir) = setup_db().await;
        append_event(&db, &make_event(EventKind::Published, "m-1", "a")).await.unwrap();
        append_event(&db, &make_event(EventKind::Claimed, "m-1", "b")).await.unwrap();
        append_event(&db, &make_event(EventKind::Published, "m-2", "a")).await.unwrap();

        let log = events_for_message(&db, "m-1").await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].id < log[1].id);
        assert_eq!(log[0].kind, EventKind::Published);
        assert_eq!(log[1].kind, EventKind::Claimed);
        assert_eq!(log[0].details, json!({"k": "v"}));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn events_since_pages_by_cursor() {
        let (db, _dir) = setup_db().await;
        for i in 0..5 {
            append_event(&db, &make_event(EventKind::Published, &format!("m-{i}"), "a"))
                .await
                .unwrap();
        }

        let first = events_since(&db, 0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = events_since(&db, first[1].id, 10).await.unwrap();
        assert_eq!(second.len(), 3);
        assert!(second[0].id > first[1].id);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn was_acked_by_matches_claimant_only() {
        let (db, _dir) = setup_db().await;
        append_event(&db, &make_event(EventKind::Ack, "m-1", "agent-x")).await.unwrap();

        assert!(was_acked_by(&db, "m-1", "agent-x").await.unwrap());
        assert!(!was_acked_by(&db, "m-1", "agent-y").await.unwrap());
        assert!(!was_acked_by(&db, "m-2", "agent-x").await.unwrap());

        db.close().await.unwrap();
    }
}
