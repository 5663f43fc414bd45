// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `BusStore` implementation over the single-writer SQLite database.

use async_trait::async_trait;

use drover_config::StorageConfig;
use drover_core::traits::BusStore;
use drover_core::types::{
    ClaimFilter, Event, Message, MessageStatus, MetricWindow, SubscribeFilter,
};
use drover_core::BusError;

use crate::database::Database;
use crate::queries::{events, messages, windows};

/// SQLite-backed bus store. Thin delegation layer: each trait method maps
/// onto one query-module function against the shared `Database`.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Open the database at the configured path, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, BusError> {
        let db = Database::open(config).await?;
        Ok(Self { db })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint the WAL before shutdown.
    pub async fn close(&self) -> Result<(), BusError> {
        self.db.close().await
    }
}

#[async_trait]
impl BusStore for SqliteStore {
    async fn publish(&self, message: &Message, event: &Event) -> Result<(), BusError> {
        messages::publish(&self.db, message, event).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, BusError> {
        messages::get_message(&self.db, id).await
    }

    async fn claim_candidates(
        &self,
        filter: &ClaimFilter,
        limit: u32,
    ) -> Result<Vec<Message>, BusError> {
        messages::claim_candidates(&self.db, filter, limit).await
    }

    async fn try_claim(
        &self,
        id: &str,
        claimant: &str,
        lease_expires_ts: i64,
        event: &Event,
    ) -> Result<bool, BusError> {
        messages::try_claim(&self.db, id, claimant, lease_expires_ts, event).await
    }

    async fn try_expire_queued(&self, id: &str, event: &Event) -> Result<bool, BusError> {
        messages::try_expire_queued(&self.db, id, event).await
    }

    async fn try_extend(
        &self,
        id: &str,
        claimant: &str,
        now: i64,
        new_expires_ts: i64,
        event: &Event,
    ) -> Result<bool, BusError> {
        messages::try_extend(&self.db, id, claimant, now, new_expires_ts, event).await
    }

    async fn try_complete(
        &self,
        id: &str,
        claimant: &str,
        status: MessageStatus,
        event: &Event,
    ) -> Result<bool, BusError> {
        messages::try_complete(&self.db, id, claimant, status, event).await
    }

    async fn try_requeue(
        &self,
        id: &str,
        claimant: &str,
        event: &Event,
    ) -> Result<bool, BusError> {
        messages::try_requeue(&self.db, id, claimant, event).await
    }

    async fn expired_processing(&self, now: i64) -> Result<Vec<Message>, BusError> {
        messages::expired_processing(&self.db, now).await
    }

    async fn try_reclaim(
        &self,
        id: &str,
        owner: &str,
        now: i64,
        to_status: MessageStatus,
        event: &Event,
    ) -> Result<bool, BusError> {
        messages::try_reclaim(&self.db, id, owner, now, to_status, event).await
    }

    async fn was_acked_by(&self, id: &str, claimant: &str) -> Result<bool, BusError> {
        events::was_acked_by(&self.db, id, claimant).await
    }

    async fn view(
        &self,
        filter: &SubscribeFilter,
        min_ingest_ts: Option<i64>,
    ) -> Result<Vec<Message>, BusError> {
        messages::view(&self.db, filter, min_ingest_ts).await
    }

    async fn append_event(&self, event: &Event) -> Result<(), BusError> {
        events::append_event(&self.db, event).await
    }

    async fn events_for_message(&self, message_id: &str) -> Result<Vec<Event>, BusError> {
        events::events_for_message(&self.db, message_id).await
    }

    async fn events_since(&self, after_id: i64, limit: u32) -> Result<Vec<Event>, BusError> {
        events::events_since(&self.db, after_id, limit).await
    }

    async fn upsert_windows(&self, windows: &[MetricWindow]) -> Result<(), BusError> {
        windows::upsert_windows(&self.db, windows).await
    }

    async fn windows_since(&self, since: i64) -> Result<Vec<MetricWindow>, BusError> {
        windows::windows_since(&self.db, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::types::{EventKind, PayloadKind, Role};
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("adapter.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let store = SqliteStore::open(&config).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn full_lifecycle_through_the_trait() {
        let (store, _dir) = setup_store().await;
        let store: &dyn BusStore = &store;

        let msg = Message {
            id: "m-1".to_string(),
            topic: "planning".to_string(),
            session_id: Some("s-1".to_string()),
            task_id: None,
            agent_id: Some("publisher".to_string()),
            role: Role::Agent,
            payload_kind: PayloadKind::Structured,
            payload: Some(json!({"step": 1})),
            payload_ref: None,
            priority: 0,
            ttl_ms: 60_000,
            lease_owner: None,
            lease_expires_ts: None,
            status: MessageStatus::Queued,
            retry_count: 0,
            published_ts: 1_000,
            ingest_ts: 1_000,
        };
        let ev = Event::for_message(EventKind::Published, &msg, json!({}));
        store.publish(&msg, &ev).await.unwrap();

        let claim_ev = Event::new(
            EventKind::Claimed,
            &msg.id,
            Some("agent-x".to_string()),
            msg.session_id.clone(),
            json!({}),
        );
        assert!(store.try_claim("m-1", "agent-x", 61_000, &claim_ev).await.unwrap());

        let ack_ev = Event::new(
            EventKind::Ack,
            &msg.id,
            Some("agent-x".to_string()),
            msg.session_id.clone(),
            json!({}),
        );
        assert!(
            store
                .try_complete("m-1", "agent-x", MessageStatus::Done, &ack_ev)
                .await
                .unwrap()
        );
        assert!(store.was_acked_by("m-1", "agent-x").await.unwrap());

        let log = store.events_for_message("m-1").await.unwrap();
        let kinds: Vec<EventKind> = log.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Published, EventKind::Claimed, EventKind::Ack]
        );
    }
}
