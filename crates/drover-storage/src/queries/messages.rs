// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-row operations.
//!
//! Every lifecycle transition is a single UPDATE whose WHERE clause
//! re-checks the guard (status, owner, expiry) at commit time; `changes()`
//! of exactly 1 is the compare-and-swap verdict. The audit event for a
//! transition is inserted in the same transaction as the winning UPDATE, so
//! a committed transition and its event are inseparable.

use std::str::FromStr;

use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Row, params, params_from_iter};

use drover_core::types::{ClaimFilter, Event, Message, MessageStatus, SubscribeFilter};
use drover_core::BusError;

use crate::database::{Database, map_tr_err};
use crate::queries::events::insert_event_tx;

pub(crate) const MESSAGE_COLUMNS: &str = "id, topic, session_id, task_id, agent_id, role, \
     payload_kind, payload, payload_ref, priority, ttl_ms, lease_owner, lease_expires_ts, \
     status, retry_count, published_ts, ingest_ts";

const CLAIM_ORDER: &str = "ORDER BY priority DESC, published_ts ASC, id ASC";

fn parse_text_col<T: FromStr>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let payload: Option<String> = row.get(7)?;
    let payload = payload
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
            })
        })
        .transpose()?;
    Ok(Message {
        id: row.get(0)?,
        topic: row.get(1)?,
        session_id: row.get(2)?,
        task_id: row.get(3)?,
        agent_id: row.get(4)?,
        role: parse_text_col(5, row.get::<_, String>(5)?)?,
        payload_kind: parse_text_col(6, row.get::<_, String>(6)?)?,
        payload,
        payload_ref: row.get(8)?,
        priority: row.get(9)?,
        ttl_ms: row.get(10)?,
        lease_owner: row.get(11)?,
        lease_expires_ts: row.get(12)?,
        status: parse_text_col(13, row.get::<_, String>(13)?)?,
        retry_count: row.get(14)?,
        published_ts: row.get(15)?,
        ingest_ts: row.get(16)?,
    })
}

/// Insert a fully defaulted message row plus its `published` event in one
/// transaction.
pub async fn publish(db: &Database, message: &Message, event: &Event) -> Result<(), BusError> {
    let message = message.clone();
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, topic, session_id, task_id, agent_id, role, \
                 payload_kind, payload, payload_ref, priority, ttl_ms, lease_owner, \
                 lease_expires_ts, status, retry_count, published_ts, ingest_ts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, ?12, ?13, ?14, ?15)",
                params![
                    message.id,
                    message.topic,
                    message.session_id,
                    message.task_id,
                    message.agent_id,
                    message.role.to_string(),
                    message.payload_kind.to_string(),
                    message.payload.as_ref().map(|v| v.to_string()),
                    message.payload_ref,
                    message.priority,
                    message.ttl_ms,
                    message.status.to_string(),
                    message.retry_count,
                    message.published_ts,
                    message.ingest_ts,
                ],
            )?;
            insert_event_tx(&tx, &event)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a single message row by id.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, BusError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
            ))?;
            let mut rows = stmt.query_map(params![id], message_from_row)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Queued rows matching the claim filter, in claim order.
pub async fn claim_candidates(
    db: &Database,
    filter: &ClaimFilter,
    limit: u32,
) -> Result<Vec<Message>, BusError> {
    let filter = filter.clone();
    db.connection()
        .call(move |conn| {
            let mut sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE status = 'queued'"
            );
            let mut sql_params: Vec<SqlValue> = Vec::new();
            if let Some(topic) = filter.topic {
                sql.push_str(&format!(" AND topic = ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Text(topic));
            }
            if let Some(session_id) = filter.session_id {
                sql.push_str(&format!(" AND session_id = ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Text(session_id));
            }
            sql.push_str(&format!(" {CLAIM_ORDER} LIMIT ?{}", sql_params.len() + 1));
            sql_params.push(SqlValue::Integer(i64::from(limit)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(sql_params), message_from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Live-view query: rows matching the subscribe filter with `ingest_ts` at
/// or past the high-water mark, in claim order. The boundary is inclusive
/// because `ingest_ts` has millisecond resolution and ties are routine; the
/// caller deduplicates rows it has already seen at the boundary.
pub async fn view(
    db: &Database,
    filter: &SubscribeFilter,
    min_ingest_ts: Option<i64>,
) -> Result<Vec<Message>, BusError> {
    let filter = filter.clone();
    db.connection()
        .call(move |conn| {
            let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE 1 = 1");
            // Status names come from the enum, never from user input.
            if !filter.statuses.is_empty() {
                let statuses: Vec<String> = filter
                    .statuses
                    .iter()
                    .map(|s| format!("'{s}'"))
                    .collect();
                sql.push_str(&format!(" AND status IN ({})", statuses.join(", ")));
            }
            let mut sql_params: Vec<SqlValue> = Vec::new();
            if let Some(topic) = filter.topic {
                sql.push_str(&format!(" AND topic = ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Text(topic));
            }
            if let Some(session_id) = filter.session_id {
                sql.push_str(&format!(" AND session_id = ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Text(session_id));
            }
            if let Some(agent_id) = filter.agent_id {
                sql.push_str(&format!(" AND agent_id = ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Text(agent_id));
            }
            if let Some(min_ingest) = min_ingest_ts {
                sql.push_str(&format!(" AND ingest_ts >= ?{}", sql_params.len() + 1));
                sql_params.push(SqlValue::Integer(min_ingest));
            }
            sql.push_str(&format!(" {CLAIM_ORDER}"));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(sql_params), message_from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Run a conditional UPDATE and, when it wins, append its audit event in the
/// same transaction. Returns whether the guard held.
async fn cas_with_event(
    db: &Database,
    sql: &'static str,
    sql_params: Vec<SqlValue>,
    event: &Event,
) -> Result<bool, BusError> {
    let event = event.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(sql, params_from_iter(sql_params))?;
            if changed == 1 {
                insert_event_tx(&tx, &event)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// `queued -> processing`, setting the lease pair.
pub async fn try_claim(
    db: &Database,
    id: &str,
    claimant: &str,
    lease_expires_ts: i64,
    event: &Event,
) -> Result<bool, BusError> {
    cas_with_event(
        db,
        "UPDATE messages
         SET status = 'processing', lease_owner = ?2, lease_expires_ts = ?3
         WHERE id = ?1 AND status = 'queued'",
        vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(claimant.to_string()),
            SqlValue::Integer(lease_expires_ts),
        ],
        event,
    )
    .await
}

/// `queued -> expired` for a message whose TTL elapsed unclaimed.
pub async fn try_expire_queued(db: &Database, id: &str, event: &Event) -> Result<bool, BusError> {
    cas_with_event(
        db,
        "UPDATE messages
         SET status = 'expired', lease_owner = NULL, lease_expires_ts = NULL
         WHERE id = ?1 AND status = 'queued'",
        vec![SqlValue::Text(id.to_string())],
        event,
    )
    .await
}

/// Push the lease expiry forward, guarded on ownership and liveness.
pub async fn try_extend(
    db: &Database,
    id: &str,
    claimant: &str,
    now: i64,
    new_expires_ts: i64,
    event: &Event,
) -> Result<bool, BusError> {
    cas_with_event(
        db,
        "UPDATE messages
         SET lease_expires_ts = ?4
         WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'
           AND lease_expires_ts > ?3",
        vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(claimant.to_string()),
            SqlValue::Integer(now),
            SqlValue::Integer(new_expires_ts),
        ],
        event,
    )
    .await
}

/// `processing -> done|error`, clearing the lease pair.
pub async fn try_complete(
    db: &Database,
    id: &str,
    claimant: &str,
    status: MessageStatus,
    event: &Event,
) -> Result<bool, BusError> {
    if !matches!(status, MessageStatus::Done | MessageStatus::Error) {
        return Err(BusError::Internal(format!(
            "try_complete target must be done or error, got {status}"
        )));
    }
    let sql = match status {
        MessageStatus::Done => {
            "UPDATE messages
             SET status = 'done', lease_owner = NULL, lease_expires_ts = NULL
             WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'"
        }
        _ => {
            "UPDATE messages
             SET status = 'error', lease_owner = NULL, lease_expires_ts = NULL
             WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'"
        }
    };
    cas_with_event(
        db,
        sql,
        vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(claimant.to_string()),
        ],
        event,
    )
    .await
}

/// `processing -> queued` with a retry bump, guarded on ownership.
pub async fn try_requeue(
    db: &Database,
    id: &str,
    claimant: &str,
    event: &Event,
) -> Result<bool, BusError> {
    cas_with_event(
        db,
        "UPDATE messages
         SET status = 'queued', lease_owner = NULL, lease_expires_ts = NULL,
             retry_count = retry_count + 1
         WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'",
        vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(claimant.to_string()),
        ],
        event,
    )
    .await
}

/// Processing rows whose lease expired before `now`, oldest expiry first.
pub async fn expired_processing(db: &Database, now: i64) -> Result<Vec<Message>, BusError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE status = 'processing' AND lease_expires_ts < ?1
                 ORDER BY lease_expires_ts ASC"
            ))?;
            let rows = stmt.query_map(params![now], message_from_row)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// Sweeper reclamation of one expired lease. The owner/expiry guard means a
/// concurrent extend under the same owner makes this affect zero rows.
pub async fn try_reclaim(
    db: &Database,
    id: &str,
    owner: &str,
    now: i64,
    to_status: MessageStatus,
    event: &Event,
) -> Result<bool, BusError> {
    if !matches!(to_status, MessageStatus::Queued | MessageStatus::Expired) {
        return Err(BusError::Internal(format!(
            "try_reclaim target must be queued or expired, got {to_status}"
        )));
    }
    let sql = match to_status {
        MessageStatus::Queued => {
            "UPDATE messages
             SET status = 'queued', lease_owner = NULL, lease_expires_ts = NULL,
                 retry_count = retry_count + 1
             WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'
               AND lease_expires_ts < ?3"
        }
        _ => {
            "UPDATE messages
             SET status = 'expired', lease_owner = NULL, lease_expires_ts = NULL,
                 retry_count = retry_count + 1
             WHERE id = ?1 AND lease_owner = ?2 AND status = 'processing'
               AND lease_expires_ts < ?3"
        }
    };
    cas_with_event(
        db,
        sql,
        vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(owner.to_string()),
            SqlValue::Integer(now),
        ],
        event,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::events;
    use drover_core::types::{EventKind, PayloadKind, Role};
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = drover_config::StorageConfig {
            database_path: dir.path().join("test.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let db = Database::open(&config).await.unwrap();
        (db, dir)
    }

    fn make_message(id: &str, topic: &str, priority: i64, published_ts: i64) -> Message {
        Message {
            id: id.to_string(),
            topic: topic.to_string(),
            session_id: Some("s-1".to_string()),
            task_id: None,
            agent_id: Some("publisher".to_string()),
            role: Role::Agent,
            payload_kind: PayloadKind::Structured,
            payload: Some(json!({"work": id})),
            payload_ref: None,
            priority,
            ttl_ms: 60_000,
            lease_owner: None,
            lease_expires_ts: None,
            status: MessageStatus::Queued,
            retry_count: 0,
            published_ts,
            ingest_ts: published_ts,
        }
    }

    async fn publish_one(db: &Database, msg: &Message) {
        let event = Event::for_message(EventKind::Published, msg, json!({"topic": msg.topic}));
        publish(db, msg, &event).await.unwrap();
    }

    #[tokio::test]
    async fn publish_then_get_round_trips() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored, msg);

        // The published event landed in the same transaction.
        let log = events::events_for_message(&db, "m-1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, EventKind::Published);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_message_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_message(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn candidates_order_by_priority_then_age_then_id() {
        let (db, _dir) = setup_db().await;
        publish_one(&db, &make_message("m-a", "planning", 1, 1_000)).await;
        publish_one(&db, &make_message("m-b", "planning", 5, 2_000)).await;
        publish_one(&db, &make_message("m-c", "planning", 3, 3_000)).await;
        // Equal priority and timestamp to m-c: id breaks the tie.
        publish_one(&db, &make_message("m-d", "planning", 3, 3_000)).await;

        let candidates = claim_candidates(&db, &ClaimFilter::topic("planning"), 10)
            .await
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-b", "m-c", "m-d", "m-a"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn candidates_respect_topic_filter() {
        let (db, _dir) = setup_db().await;
        publish_one(&db, &make_message("m-1", "planning", 0, 1_000)).await;
        publish_one(&db, &make_message("m-2", "review", 0, 1_000)).await;

        let candidates = claim_candidates(&db, &ClaimFilter::topic("review"), 10)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "m-2");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_cas_wins_exactly_once() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;

        let event = Event::for_message(EventKind::Claimed, &msg, json!({}));
        assert!(try_claim(&db, "m-1", "agent-x", 99_000, &event).await.unwrap());
        // The row is no longer queued; a second claim loses the guard.
        assert!(!try_claim(&db, "m-1", "agent-y", 99_000, &event).await.unwrap());

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Processing);
        assert_eq!(stored.lease_owner.as_deref(), Some("agent-x"));
        assert_eq!(stored.lease_expires_ts, Some(99_000));

        // Only the winner appended an event.
        let log = events::events_for_message(&db, "m-1").await.unwrap();
        assert_eq!(log.len(), 2); // published + claimed

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn extend_requires_ownership_and_liveness() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 50_000, &claim_ev).await.unwrap();

        let hb = Event::for_message(EventKind::Heartbeat, &msg, json!({"extension_ms": 30_000}));
        // Wrong owner.
        assert!(!try_extend(&db, "m-1", "agent-y", 10_000, 80_000, &hb).await.unwrap());
        // Lease already past expiry at `now`.
        assert!(!try_extend(&db, "m-1", "agent-x", 50_000, 80_000, &hb).await.unwrap());
        // Owner with a live lease.
        assert!(try_extend(&db, "m-1", "agent-x", 10_000, 80_000, &hb).await.unwrap());

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.lease_expires_ts, Some(80_000));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn complete_clears_lease_and_rejects_strangers() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 99_000, &claim_ev).await.unwrap();

        let ack = Event::for_message(EventKind::Ack, &msg, json!({}));
        assert!(!try_complete(&db, "m-1", "agent-y", MessageStatus::Done, &ack).await.unwrap());
        assert!(try_complete(&db, "m-1", "agent-x", MessageStatus::Done, &ack).await.unwrap());

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Done);
        assert_eq!(stored.lease_owner, None);
        assert_eq!(stored.lease_expires_ts, None);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn complete_rejects_non_terminal_target() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let ack = Event::for_message(EventKind::Ack, &msg, json!({}));
        let result = try_complete(&db, "m-1", "agent-x", MessageStatus::Queued, &ack).await;
        assert!(result.is_err());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn requeue_bumps_retry_count() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 99_000, &claim_ev).await.unwrap();

        let nack = Event::for_message(EventKind::Nack, &msg, json!({"requeue": true}));
        assert!(try_requeue(&db, "m-1", "agent-x", &nack).await.unwrap());

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Queued);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.lease_owner, None);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_loses_to_a_concurrent_extend() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 50_000, &claim_ev).await.unwrap();

        // The sweeper saw the lease expired at now=60_000, but the claimant
        // extended it to 120_000 before the sweep's conditional update ran.
        let hb = Event::for_message(EventKind::Heartbeat, &msg, json!({}));
        try_extend(&db, "m-1", "agent-x", 40_000, 120_000, &hb).await.unwrap();

        let timeout = Event::for_message(EventKind::Timeout, &msg, json!({"terminal": false}));
        let reclaimed =
            try_reclaim(&db, "m-1", "agent-x", 60_000, MessageStatus::Queued, &timeout)
                .await
                .unwrap();
        assert!(!reclaimed, "live lease must not be reclaimed");

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Processing);
        assert_eq!(stored.retry_count, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reclaim_expired_lease_requeues_and_bumps_retry() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 50_000, &claim_ev).await.unwrap();

        let expired = expired_processing(&db, 60_000).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "m-1");

        let timeout = Event::for_message(EventKind::Timeout, &msg, json!({"terminal": false}));
        assert!(
            try_reclaim(&db, "m-1", "agent-x", 60_000, MessageStatus::Queued, &timeout)
                .await
                .unwrap()
        );

        let stored = get_message(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Queued);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.lease_owner, None);

        // Nothing left to reclaim.
        assert!(expired_processing(&db, 60_000).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn view_high_water_boundary_is_inclusive() {
        let (db, _dir) = setup_db().await;
        publish_one(&db, &make_message("m-1", "planning", 0, 1_000)).await;
        publish_one(&db, &make_message("m-2", "planning", 0, 2_000)).await;
        // Same ingest millisecond as m-2.
        publish_one(&db, &make_message("m-3", "planning", 0, 2_000)).await;
        publish_one(&db, &make_message("m-4", "review", 0, 3_000)).await;

        let filter = SubscribeFilter::topic("planning");
        let all = view(&db, &filter, None).await.unwrap();
        assert_eq!(all.len(), 3);

        // A mark at 2_000 must return every row at that millisecond, not
        // just rows strictly past it.
        let at_mark = view(&db, &filter, Some(2_000)).await.unwrap();
        let ids: Vec<&str> = at_mark.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-2", "m-3"]);

        assert!(view(&db, &filter, Some(2_001)).await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn view_excludes_statuses_outside_filter() {
        let (db, _dir) = setup_db().await;
        let msg = make_message("m-1", "planning", 0, 1_000);
        publish_one(&db, &msg).await;
        let claim_ev = Event::for_message(EventKind::Claimed, &msg, json!({}));
        try_claim(&db, "m-1", "agent-x", 99_000, &claim_ev).await.unwrap();
        let ack = Event::for_message(EventKind::Ack, &msg, json!({}));
        try_complete(&db, "m-1", "agent-x", MessageStatus::Done, &ack).await.unwrap();

        // Default filter watches queued + processing only.
        let live = view(&db, &SubscribeFilter::topic("planning"), None).await.unwrap();
        assert!(live.is_empty());

        let mut done_filter = SubscribeFilter::topic("planning");
        done_filter.statuses = vec![MessageStatus::Done];
        let done = view(&db, &done_filter, None).await.unwrap();
        assert_eq!(done.len(), 1);

        db.close().await.unwrap();
    }
}
