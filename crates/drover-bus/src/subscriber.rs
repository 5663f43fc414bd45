// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling subscriptions over the message table.
//!
//! A subscription is a polling loop with an `ingest_ts` high-water mark:
//! the first poll replays every matching row, later polls deliver only
//! rows ingested since. The mark is inclusive and boundary rows are
//! deduplicated by id, because millisecond ingest timestamps tie routinely
//! and an exclusive cursor would skip same-millisecond arrivals forever.
//! Delivery is advisory; seeing a message grants no processing rights,
//! only a successful claim does.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drover_config::BusConfig;
use drover_core::types::{Message, SubscribeFilter};
use drover_core::BusStore;

/// Hands out polling subscriptions backed by the shared store.
pub struct Subscriber {
    store: Arc<dyn BusStore>,
    config: BusConfig,
}

/// A live subscription. Dropping it (or calling [`Subscription::close`])
/// stops the polling task.
pub struct Subscription {
    rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Next matching message, or `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Stop the polling task. Buffered messages can still be received.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Subscriber {
    pub fn new(store: Arc<dyn BusStore>, config: BusConfig) -> Self {
        Subscriber { store, config }
    }

    /// Open a subscription for `filter`, starting with a full replay of
    /// matching rows.
    pub fn subscribe(&self, filter: SubscribeFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.subscription_buffer.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let store = self.store.clone();
        let period = Duration::from_millis(self.config.poll_interval_ms.max(1) as u64);

        tokio::spawn(async move {
            let mut high_water: Option<i64> = None;
            // Ids already delivered at exactly the high-water millisecond.
            // The view's inclusive boundary returns them again each poll
            // until the mark advances.
            let mut seen_at_mark: HashSet<String> = HashSet::new();
            loop {
                match store.view(&filter, high_water).await {
                    Ok(batch) => {
                        let mark = high_water;
                        for msg in &batch {
                            if high_water.is_none_or(|hw| msg.ingest_ts > hw) {
                                high_water = Some(msg.ingest_ts);
                            }
                        }
                        let next_seen: HashSet<String> = batch
                            .iter()
                            .filter(|m| Some(m.ingest_ts) == high_water)
                            .map(|m| m.id.clone())
                            .collect();
                        for msg in batch {
                            if Some(msg.ingest_ts) == mark && seen_at_mark.contains(&msg.id) {
                                continue;
                            }
                            if tx.send(msg).await.is_err() {
                                // Receiver dropped.
                                return;
                            }
                        }
                        seen_at_mark = next_seen;
                    }
                    Err(e) => warn!(error = %e, "subscription poll failed"),
                }
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            debug!("subscription poll loop stopped");
        });

        Subscription { rx, cancel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::Publisher;
    use drover_core::types::{
        now_ms, Event, EventKind, MessageStatus, NewMessage, PayloadKind, Role,
    };
    use drover_storage::SqliteStore;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn setup() -> (Publisher, Subscriber, Arc<dyn BusStore>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = drover_config::StorageConfig {
            database_path: dir.path().join("sub.db").to_str().unwrap().to_string(),
            wal_mode: true,
        };
        let store: Arc<dyn BusStore> = Arc::new(SqliteStore::open(&config).await.unwrap());
        let mut bus_config = BusConfig::default();
        bus_config.poll_interval_ms = 20;
        let publisher = Publisher::new(store.clone(), bus_config.clone());
        let subscriber = Subscriber::new(store.clone(), bus_config);
        (publisher, subscriber, store, dir)
    }

    // Insert a row with an exact ingest_ts, bypassing the publisher's clock.
    async fn publish_at(store: &Arc<dyn BusStore>, id: &str, ingest_ts: i64) {
        let msg = drover_core::types::Message {
            id: id.to_string(),
            topic: "planning".to_string(),
            session_id: None,
            task_id: None,
            agent_id: None,
            role: Role::Agent,
            payload_kind: PayloadKind::Signal,
            payload: None,
            payload_ref: None,
            priority: 0,
            ttl_ms: 0,
            lease_owner: None,
            lease_expires_ts: None,
            status: MessageStatus::Queued,
            retry_count: 0,
            published_ts: ingest_ts,
            ingest_ts,
        };
        let event = Event::for_message(EventKind::Published, &msg, json!({}));
        store.publish(&msg, &event).await.unwrap();
    }

    #[tokio::test]
    async fn replays_existing_rows_then_delivers_new_ones() {
        let (publisher, subscriber, _store, _dir) = setup().await;
        let before = publisher
            .publish(NewMessage::structured("planning", json!({"n": 1})))
            .await
            .unwrap();

        let mut sub = subscriber.subscribe(SubscribeFilter::topic("planning"));
        let first = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(first.id, before.id);

        let after = publisher
            .publish(NewMessage::structured("planning", json!({"n": 2})))
            .await
            .unwrap();
        let second = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(second.id, after.id);

        sub.close();
    }

    #[tokio::test]
    async fn same_millisecond_arrival_is_still_delivered() {
        let (_publisher, subscriber, store, _dir) = setup().await;
        let ts = now_ms();
        publish_at(&store, "m-1", ts).await;

        let mut sub = subscriber.subscribe(SubscribeFilter::topic("planning"));
        let first = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(first.id, "m-1");

        // Lands in the same millisecond as the poll's high-water mark; an
        // exclusive cursor would never surface it.
        publish_at(&store, "m-2", ts).await;
        let second = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(second.id, "m-2");

        // And the boundary rows are not redelivered on later polls.
        let extra = timeout(Duration::from_millis(300), sub.recv()).await;
        assert!(extra.is_err(), "unexpected duplicate delivery: {extra:?}");

        sub.close();
    }

    #[tokio::test]
    async fn filters_by_topic() {
        let (publisher, subscriber, _store, _dir) = setup().await;
        publisher
            .publish(NewMessage::structured("other", json!({})))
            .await
            .unwrap();
        let wanted = publisher
            .publish(NewMessage::structured("planning", json!({})))
            .await
            .unwrap();

        let mut sub = subscriber.subscribe(SubscribeFilter::topic("planning"));
        let got = timeout(WAIT, sub.recv()).await.unwrap().unwrap();
        assert_eq!(got.id, wanted.id);
        assert_eq!(got.status, MessageStatus::Queued);
        sub.close();
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let (_publisher, subscriber, _store, _dir) = setup().await;
        let mut sub = subscriber.subscribe(SubscribeFilter::topic("planning"));
        sub.close();
        let got = timeout(WAIT, sub.recv()).await.unwrap();
        assert!(got.is_none());
    }
}
