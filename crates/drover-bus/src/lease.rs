// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim, heartbeat, ack, and nack.
//!
//! The store's conditional updates carry the actual atomicity; this module
//! layers candidate selection, TTL screening, idempotency, and the retry
//! budget on top. Claim is optimistic: losing a row to a faster claimant
//! just moves on to the next candidate.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use drover_config::BusConfig;
use drover_core::types::{ClaimFilter, Event, EventKind, Message, MessageStatus, now_ms};
use drover_core::{BusError, BusStore};

/// Candidate rows fetched per claim attempt.
const CLAIM_BATCH: u32 = 16;
/// Batches examined before a claim gives up and reports an empty queue.
const CLAIM_ROUNDS: u32 = 8;

/// Lease lifecycle operations for one bus.
pub struct LeaseManager {
    store: Arc<dyn BusStore>,
    config: BusConfig,
    /// Validated retry budget. Requeues beyond this become terminal.
    max_retries: i64,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn BusStore>, config: BusConfig, max_retries: u32) -> Self {
        LeaseManager {
            store,
            config,
            max_retries: i64::from(max_retries),
        }
    }

    /// Claim the best available queued message matching `filter` for
    /// `claimant`. Returns `Ok(None)` when nothing claimable exists.
    ///
    /// Messages whose TTL elapsed while still queued are moved to `expired`
    /// on the way past and never handed out.
    pub async fn claim(
        &self,
        filter: &ClaimFilter,
        claimant: &str,
        lease_ms: Option<i64>,
    ) -> Result<Option<Message>, BusError> {
        let lease_ms = lease_ms.unwrap_or(self.config.default_lease_ms);
        if lease_ms <= 0 {
            return Err(BusError::Validation("lease_ms must be positive".into()));
        }

        for _ in 0..CLAIM_ROUNDS {
            let now = now_ms();
            let candidates = self.store.claim_candidates(filter, CLAIM_BATCH).await?;
            if candidates.is_empty() {
                return Ok(None);
            }

            let mut all_screened = true;
            for mut candidate in candidates {
                if candidate.is_past_ttl(now) {
                    let event = Event::new(
                        EventKind::Timeout,
                        &candidate.id,
                        None,
                        candidate.session_id.clone(),
                        json!({"terminal": true, "reason": "ttl_elapsed_while_queued"}),
                    );
                    // Losing this race is fine: someone else expired it.
                    self.store.try_expire_queued(&candidate.id, &event).await?;
                    metrics::counter!("drover_messages_expired_total").increment(1);
                    continue;
                }

                all_screened = false;
                let expires = now.saturating_add(lease_ms);
                let event = Event::new(
                    EventKind::Claimed,
                    &candidate.id,
                    Some(claimant.to_string()),
                    candidate.session_id.clone(),
                    json!({"lease_expires_ts": expires, "lease_ms": lease_ms}),
                );
                if self
                    .store
                    .try_claim(&candidate.id, claimant, expires, &event)
                    .await?
                {
                    candidate.status = MessageStatus::Processing;
                    candidate.lease_owner = Some(claimant.to_string());
                    candidate.lease_expires_ts = Some(expires);
                    debug!(id = %candidate.id, claimant, expires, "claim won");
                    metrics::counter!("drover_messages_claimed_total").increment(1);
                    return Ok(Some(candidate));
                }
                // Lost the row to a concurrent claimant; try the next one.
            }

            if all_screened {
                // Every candidate was TTL-expired; refetch in case fresher
                // rows are behind them.
                continue;
            }
        }
        Ok(None)
    }

    /// Heartbeat: push the lease expiry to `now + additional_ms`. Returns the
    /// new expiry. A claimant whose lease is gone gets [`BusError::LeaseLost`]
    /// and must abandon the work.
    pub async fn extend(
        &self,
        message_id: &str,
        claimant: &str,
        additional_ms: i64,
    ) -> Result<i64, BusError> {
        if additional_ms <= 0 {
            return Err(BusError::Validation(
                "additional_ms must be positive".into(),
            ));
        }
        let now = now_ms();
        let new_expires = now.saturating_add(additional_ms);
        let event = Event::new(
            EventKind::Heartbeat,
            message_id,
            Some(claimant.to_string()),
            None,
            json!({"new_expires_ts": new_expires, "extension_ms": additional_ms}),
        );
        if self
            .store
            .try_extend(message_id, claimant, now, new_expires, &event)
            .await?
        {
            Ok(new_expires)
        } else {
            Err(BusError::LeaseLost {
                message_id: message_id.to_string(),
                claimant: claimant.to_string(),
            })
        }
    }

    /// Acknowledge completed work: `processing -> done`.
    ///
    /// Re-acking a message this claimant already acked is a no-op, so retry
    /// loops around ack are safe. Acking someone else's lease is
    /// [`BusError::LeaseLost`].
    pub async fn ack(&self, message_id: &str, claimant: &str) -> Result<(), BusError> {
        let event = Event::new(
            EventKind::Ack,
            message_id,
            Some(claimant.to_string()),
            None,
            json!({}),
        );
        if self
            .store
            .try_complete(message_id, claimant, MessageStatus::Done, &event)
            .await?
        {
            debug!(id = message_id, claimant, "acked");
            return Ok(());
        }

        // The guard failed. Distinguish "already done by us" from a real
        // ownership loss via the events log.
        let current = self.store.get_message(message_id).await?;
        if let Some(msg) = current
            && msg.status == MessageStatus::Done
            && self.store.was_acked_by(message_id, claimant).await?
        {
            return Ok(());
        }
        Err(BusError::LeaseLost {
            message_id: message_id.to_string(),
            claimant: claimant.to_string(),
        })
    }

    /// Reject work: requeue for another attempt, or park it in `error`.
    ///
    /// A requeue that would exceed the retry budget is converted into a
    /// terminal `error` instead of cycling forever.
    pub async fn nack(
        &self,
        message_id: &str,
        claimant: &str,
        requeue: bool,
        reason: Option<&str>,
    ) -> Result<(), BusError> {
        let lease_lost = || BusError::LeaseLost {
            message_id: message_id.to_string(),
            claimant: claimant.to_string(),
        };

        if requeue {
            let msg = self
                .store
                .get_message(message_id)
                .await?
                .ok_or_else(lease_lost)?;
            if msg.retry_count + 1 > self.max_retries {
                let event = Event::new(
                    EventKind::Nack,
                    message_id,
                    Some(claimant.to_string()),
                    msg.session_id.clone(),
                    json!({"requeue": false, "reason": reason, "retries_exhausted": true}),
                );
                if self
                    .store
                    .try_complete(message_id, claimant, MessageStatus::Error, &event)
                    .await?
                {
                    debug!(id = message_id, claimant, "retry budget exhausted, parked in error");
                    metrics::counter!("drover_messages_errored_total").increment(1);
                    return Ok(());
                }
                return Err(lease_lost());
            }

            let event = Event::new(
                EventKind::Nack,
                message_id,
                Some(claimant.to_string()),
                msg.session_id.clone(),
                json!({"requeue": true, "reason": reason}),
            );
            if self.store.try_requeue(message_id, claimant, &event).await? {
                debug!(id = message_id, claimant, "nacked back to queue");
                return Ok(());
            }
            return Err(lease_lost());
        }

        let event = Event::new(
            EventKind::Nack,
            message_id,
            Some(claimant.to_string()),
            None,
            json!({"requeue": false, "reason": reason}),
        );
        if self
            .store
            .try_complete(message_id, claimant, MessageStatus::Error, &event)
            .await?
        {
            debug!(id = message_id, claimant, "nacked to error");
            metrics::counter!("drover_messages_errored_total").increment(1);
            return Ok(());
        }
        Err(lease_lost())
    }
}
