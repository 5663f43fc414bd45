// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL reclamation sweeper.
//!
//! Periodically scans `processing` rows whose lease expired and reclaims
//! them with the same conditional-update fencing the claimants use, so a
//! claimant that heartbeats between the scan and the reclaim keeps its
//! lease and the sweep records a conflict instead.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drover_config::BusConfig;
use drover_core::types::{Event, EventKind, MessageStatus, now_ms};
use drover_core::{BusError, BusStore};

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Leases reclaimed back to `queued`.
    pub requeued: u64,
    /// Leases whose retry budget ran out; rows moved to `expired`.
    pub expired: u64,
    /// Rows that changed under the sweeper (heartbeat or completion won).
    pub conflicts: u64,
}

/// Background reclamation of expired leases.
pub struct Sweeper {
    store: Arc<dyn BusStore>,
    config: BusConfig,
    max_retries: i64,
}

impl Sweeper {
    pub fn new(store: Arc<dyn BusStore>, config: BusConfig, max_retries: u32) -> Self {
        Sweeper {
            store,
            config,
            max_retries: i64::from(max_retries),
        }
    }

    /// One reclamation pass over every expired lease at `now`.
    pub async fn sweep_once(&self, now: i64) -> Result<SweepStats, BusError> {
        let mut stats = SweepStats::default();
        for msg in self.store.expired_processing(now).await? {
            // The processing invariant guarantees an owner; a row without one
            // is unreachable through the bus API.
            let Some(owner) = msg.lease_owner.clone() else {
                continue;
            };
            let terminal = msg.retry_count + 1 > self.max_retries;
            let to_status = if terminal {
                MessageStatus::Expired
            } else {
                MessageStatus::Queued
            };
            let event = Event::new(
                EventKind::Timeout,
                &msg.id,
                Some(owner.clone()),
                msg.session_id.clone(),
                json!({
                    "terminal": terminal,
                    "lease_expires_ts": msg.lease_expires_ts,
                    "reason": "lease_expired",
                }),
            );
            if self
                .store
                .try_reclaim(&msg.id, &owner, now, to_status, &event)
                .await?
            {
                if terminal {
                    stats.expired += 1;
                    metrics::counter!("drover_messages_expired_total").increment(1);
                } else {
                    stats.requeued += 1;
                }
                metrics::counter!("drover_lease_timeouts_total").increment(1);
                debug!(id = %msg.id, owner = %owner, terminal, "lease reclaimed");
            } else {
                stats.conflicts += 1;
            }
        }
        Ok(stats)
    }

    /// Run sweep passes at the configured cadence until cancelled. A failed
    /// pass is logged and retried at the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        let period = Duration::from_millis(self.config.sweep_interval_ms.max(1) as u64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep_once(now_ms()).await {
                        Ok(stats) if stats != SweepStats::default() => {
                            debug!(
                                requeued = stats.requeued,
                                expired = stats.expired,
                                conflicts = stats.conflicts,
                                "sweep pass complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "sweep pass failed"),
                    }
                }
            }
        }
        debug!("sweeper stopped");
    }
}
