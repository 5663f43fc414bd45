// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store trait for the bus's transactional keyspace.
//!
//! The backing store must provide read-modify-write atomicity per message
//! row; every `try_*` method is a single-row conditional update whose guard
//! is re-checked at commit time. A `false` return means the guard no longer
//! held — the caller lost a race, not an error. Each conditional update
//! appends its audit event in the same transaction, so the events log and
//! the message row can never disagree about a committed transition.

use async_trait::async_trait;

use crate::error::BusError;
use crate::types::{
    ClaimFilter, Event, Message, MessageStatus, MetricWindow, SubscribeFilter,
};

/// Transactional keyspace holding message, event, and metric rows.
#[async_trait]
pub trait BusStore: Send + Sync + 'static {
    /// Insert a fully defaulted message row plus its `published` event.
    async fn publish(&self, message: &Message, event: &Event) -> Result<(), BusError>;

    /// Fetch a single message row by id.
    async fn get_message(&self, id: &str) -> Result<Option<Message>, BusError>;

    /// Queued rows matching `filter`, ordered
    /// `priority DESC, published_ts ASC, id ASC`, at most `limit`.
    async fn claim_candidates(
        &self,
        filter: &ClaimFilter,
        limit: u32,
    ) -> Result<Vec<Message>, BusError>;

    /// Transition `queued -> processing`, setting the lease pair. Guarded on
    /// the row still being `queued`.
    async fn try_claim(
        &self,
        id: &str,
        claimant: &str,
        lease_expires_ts: i64,
        event: &Event,
    ) -> Result<bool, BusError>;

    /// Transition `queued -> expired` for a message whose TTL elapsed before
    /// it was ever claimed. Guarded on the row still being `queued`.
    async fn try_expire_queued(&self, id: &str, event: &Event) -> Result<bool, BusError>;

    /// Push the lease expiry forward. Guarded on ownership and on the lease
    /// not yet having expired at `now`.
    async fn try_extend(
        &self,
        id: &str,
        claimant: &str,
        now: i64,
        new_expires_ts: i64,
        event: &Event,
    ) -> Result<bool, BusError>;

    /// Transition `processing -> done|error`, clearing the lease pair.
    /// Guarded on ownership. `status` must be a terminal state.
    async fn try_complete(
        &self,
        id: &str,
        claimant: &str,
        status: MessageStatus,
        event: &Event,
    ) -> Result<bool, BusError>;

    /// Transition `processing -> queued`, clearing the lease pair and
    /// incrementing `retry_count`. Guarded on ownership.
    async fn try_requeue(&self, id: &str, claimant: &str, event: &Event)
        -> Result<bool, BusError>;

    /// Rows in `processing` whose lease expired before `now`.
    async fn expired_processing(&self, now: i64) -> Result<Vec<Message>, BusError>;

    /// Sweeper reclamation: transition an expired `processing` row to
    /// `to_status` (`queued` or `expired`), clearing the lease pair and
    /// incrementing `retry_count`. Guarded on `(owner, status, expiry < now)`
    /// so a concurrent extend under the same owner makes this a no-op.
    async fn try_reclaim(
        &self,
        id: &str,
        owner: &str,
        now: i64,
        to_status: MessageStatus,
        event: &Event,
    ) -> Result<bool, BusError>;

    /// Whether the events log records an `ack` of `id` by `claimant`.
    /// Supports idempotent re-ack on rows whose lease pair is already clear.
    async fn was_acked_by(&self, id: &str, claimant: &str) -> Result<bool, BusError>;

    /// Live-view query: rows matching `filter` with `ingest_ts` greater
    /// than or equal to `min_ingest_ts` (all matching rows when `None`), in
    /// claim order. The boundary is inclusive: millisecond timestamps tie
    /// routinely, and an exclusive cursor would silently skip rows ingested
    /// in the same millisecond as the mark. Callers deduplicate boundary
    /// rows by id.
    async fn view(
        &self,
        filter: &SubscribeFilter,
        min_ingest_ts: Option<i64>,
    ) -> Result<Vec<Message>, BusError>;

    /// Append a standalone audit event.
    async fn append_event(&self, event: &Event) -> Result<(), BusError>;

    /// All events for one message in arrival order.
    async fn events_for_message(&self, message_id: &str) -> Result<Vec<Event>, BusError>;

    /// Events with id strictly greater than `after_id`, in arrival order,
    /// at most `limit`. This is the aggregator's feed.
    async fn events_since(&self, after_id: i64, limit: u32) -> Result<Vec<Event>, BusError>;

    /// Upsert flushed metric windows keyed by
    /// `(window_start, agent_id, session_id)`.
    async fn upsert_windows(&self, windows: &[MetricWindow]) -> Result<(), BusError>;

    /// Flushed windows with `window_start >= since`.
    async fn windows_since(&self, since: i64) -> Result<Vec<MetricWindow>, BusError>;
}
