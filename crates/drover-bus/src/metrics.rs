// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tumbling-window metrics derived from the audit log.
//!
//! The aggregator tails the events log by id cursor, folds lifecycle events
//! into per-(window, agent, session) accumulators, and flushes windows to
//! the store once they close. Windows are pure derived state: dropping the
//! `metric_windows` table and re-running the aggregator from cursor zero
//! rebuilds them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drover_config::MetricsConfig;
use drover_core::types::{Event, EventKind, MetricWindow, now_ms};
use drover_core::{BusError, BusStore};

/// Events fetched per tail poll.
const POLL_BATCH: u32 = 512;

/// Attribution key for agents or sessions an event does not name.
const UNATTRIBUTED: &str = "unattributed";

type WindowKey = (i64, String, String);

#[derive(Debug, Default, Clone)]
struct Accum {
    processed: i64,
    latency_sum_ms: f64,
    latency_samples: i64,
    errors: i64,
    last_update_ts: i64,
}

impl Accum {
    fn to_window(&self, key: &WindowKey) -> MetricWindow {
        let avg_latency_ms = if self.latency_samples > 0 {
            self.latency_sum_ms / self.latency_samples as f64
        } else {
            0.0
        };
        MetricWindow {
            window_start: key.0,
            agent_id: key.1.clone(),
            session_id: key.2.clone(),
            messages_processed: self.processed,
            avg_latency_ms,
            errors: self.errors,
            last_update_ts: self.last_update_ts,
        }
    }
}

/// Folds the events log into windowed per-agent rollups.
pub struct MetricsAggregator {
    store: Arc<dyn BusStore>,
    config: MetricsConfig,
    /// Highest event id already folded in.
    cursor: i64,
    /// Claim timestamps awaiting their terminal event, keyed by message id.
    pending_claims: HashMap<String, i64>,
    open: HashMap<WindowKey, Accum>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn BusStore>, config: MetricsConfig) -> Self {
        MetricsAggregator {
            store,
            config,
            cursor: 0,
            pending_claims: HashMap::new(),
            open: HashMap::new(),
        }
    }

    fn window_start(&self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.config.window_ms)
    }

    fn key_for(&self, event: &Event) -> WindowKey {
        (
            self.window_start(event.ts),
            event
                .agent_id
                .clone()
                .unwrap_or_else(|| UNATTRIBUTED.to_string()),
            event
                .session_id
                .clone()
                .unwrap_or_else(|| UNATTRIBUTED.to_string()),
        )
    }

    /// Fold a batch of events, in order, into the open windows.
    pub fn ingest(&mut self, events: &[Event]) {
        for event in events {
            self.cursor = self.cursor.max(event.id);
            match event.kind {
                EventKind::Claimed => {
                    self.pending_claims.insert(event.message_id.clone(), event.ts);
                }
                EventKind::Ack => {
                    let key = self.key_for(event);
                    let acc = self.open.entry(key).or_default();
                    acc.processed += 1;
                    if let Some(claim_ts) = self.pending_claims.remove(&event.message_id) {
                        acc.latency_sum_ms += (event.ts - claim_ts) as f64;
                        acc.latency_samples += 1;
                    }
                    acc.last_update_ts = acc.last_update_ts.max(event.ts);
                    metrics::counter!("drover_messages_processed_total").increment(1);
                }
                EventKind::Nack | EventKind::Timeout => {
                    self.pending_claims.remove(&event.message_id);
                    // Every rejection counts, requeued or not: a retried
                    // message still failed its attempt.
                    let key = self.key_for(event);
                    let acc = self.open.entry(key).or_default();
                    acc.errors += 1;
                    acc.last_update_ts = acc.last_update_ts.max(event.ts);
                    metrics::counter!("drover_errors_total").increment(1);
                }
                EventKind::Published | EventKind::Heartbeat => {}
            }
        }
    }

    /// Tail the events log from the cursor until caught up. Returns how many
    /// events were folded in.
    pub async fn poll(&mut self) -> Result<usize, BusError> {
        let mut total = 0;
        loop {
            let batch = self.store.events_since(self.cursor, POLL_BATCH).await?;
            if batch.is_empty() {
                return Ok(total);
            }
            total += batch.len();
            self.ingest(&batch);
        }
    }

    /// Provisional snapshots of every open window, flushed or not.
    pub fn live_windows(&self) -> Vec<MetricWindow> {
        let mut windows: Vec<MetricWindow> =
            self.open.iter().map(|(k, acc)| acc.to_window(k)).collect();
        windows.sort_by(|a, b| {
            (a.window_start, &a.agent_id, &a.session_id)
                .cmp(&(b.window_start, &b.agent_id, &b.session_id))
        });
        windows
    }

    /// Persist and drop every window that closed before `now`. Returns how
    /// many were flushed.
    pub async fn flush_closed(&mut self, now: i64) -> Result<usize, BusError> {
        let closed: Vec<WindowKey> = self
            .open
            .keys()
            .filter(|k| k.0 + self.config.window_ms <= now)
            .cloned()
            .collect();
        self.flush_keys(&closed).await?;
        Ok(closed.len())
    }

    /// Persist every open window regardless of age. Shutdown path.
    pub async fn flush_all(&mut self) -> Result<usize, BusError> {
        let keys: Vec<WindowKey> = self.open.keys().cloned().collect();
        self.flush_keys(&keys).await?;
        Ok(keys.len())
    }

    async fn flush_keys(&mut self, keys: &[WindowKey]) -> Result<(), BusError> {
        if keys.is_empty() {
            return Ok(());
        }
        let windows: Vec<MetricWindow> = keys
            .iter()
            .filter_map(|k| self.open.get(k).map(|acc| acc.to_window(k)))
            .collect();
        self.store.upsert_windows(&windows).await?;
        for k in keys {
            self.open.remove(k);
        }
        debug!(count = windows.len(), "metric windows flushed");
        Ok(())
    }

    /// Flushed windows with `window_start >= since`.
    pub async fn windows_since(&self, since: i64) -> Result<Vec<MetricWindow>, BusError> {
        self.store.windows_since(since).await
    }

    /// Tail and flush at the configured cadence until cancelled, then flush
    /// everything still open.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = Duration::from_millis(self.config.flush_interval_ms.max(1) as u64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        warn!(error = %e, "metrics poll failed");
                        continue;
                    }
                    if let Err(e) = self.flush_closed(now_ms()).await {
                        warn!(error = %e, "metrics flush failed");
                    }
                }
            }
        }
        if let Err(e) = self.poll().await {
            warn!(error = %e, "final metrics poll failed");
        }
        if let Err(e) = self.flush_all().await {
            warn!(error = %e, "final metrics flush failed");
        }
        debug!("metrics aggregator stopped");
    }
}
