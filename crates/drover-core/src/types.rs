// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types exchanged over the bus.
//!
//! All timestamps are epoch milliseconds. Lease expiry and window
//! arithmetic are plain integer comparisons, both in Rust and in SQL.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status of a message row.
///
/// The row value is a cache of the latest transition; the events log is the
/// authoritative record (see [`crate::replay_status`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Processing,
    Done,
    Error,
    Expired,
}

impl MessageStatus {
    /// Terminal states are retained for audit and never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Done | MessageStatus::Error | MessageStatus::Expired
        )
    }
}

/// Originator role of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Agent,
}

/// Shape of a message's payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Structured,
    BinaryRef,
    Signal,
}

/// Lifecycle transition recorded in the append-only events log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Published,
    Claimed,
    Ack,
    Nack,
    Heartbeat,
    Timeout,
}

/// A unit of work exchanged between agents.
///
/// Invariant: `lease_owner` and `lease_expires_ts` are both set exactly when
/// `status` is [`MessageStatus::Processing`]; both are `None` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub topic: String,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub role: Role,
    pub payload_kind: PayloadKind,
    /// Inline structured payload. Oversized payloads must use `payload_ref`.
    pub payload: Option<Value>,
    /// Pointer to an externally stored blob.
    pub payload_ref: Option<String>,
    /// Higher priority is claimed first.
    pub priority: i64,
    /// Visibility/lease duration for this message.
    pub ttl_ms: i64,
    pub lease_owner: Option<String>,
    pub lease_expires_ts: Option<i64>,
    pub status: MessageStatus,
    /// Incremented on each nack-requeue and each sweeper reclamation.
    pub retry_count: i64,
    /// Publisher-supplied timestamp.
    pub published_ts: i64,
    /// Store-assigned timestamp.
    pub ingest_ts: i64,
}

impl Message {
    /// True when the message's TTL has elapsed relative to `now`. The
    /// deadline saturates so absurd TTLs mean "never expires" instead of
    /// overflowing.
    pub fn is_past_ttl(&self, now: i64) -> bool {
        self.ttl_ms > 0 && now > self.published_ts.saturating_add(self.ttl_ms)
    }
}

/// Publish-time input. Unset fields are defaulted by the publisher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: Option<String>,
    pub topic: String,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub role: Option<Role>,
    pub payload_kind: Option<PayloadKind>,
    pub payload: Option<Value>,
    pub payload_ref: Option<String>,
    pub priority: Option<i64>,
    pub ttl_ms: Option<i64>,
    pub published_ts: Option<i64>,
}

impl NewMessage {
    /// A plain text work item.
    pub fn text(topic: impl Into<String>, body: impl Into<String>) -> Self {
        NewMessage {
            topic: topic.into(),
            role: Some(Role::Agent),
            payload_kind: Some(PayloadKind::Text),
            payload: Some(Value::String(body.into())),
            ..Default::default()
        }
    }

    /// A structured work item carrying an inline JSON payload.
    pub fn structured(topic: impl Into<String>, payload: Value) -> Self {
        NewMessage {
            topic: topic.into(),
            role: Some(Role::Agent),
            payload_kind: Some(PayloadKind::Structured),
            payload: Some(payload),
            ..Default::default()
        }
    }
}

/// Append-only audit record for a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned arrival-order id; 0 before insertion.
    pub id: i64,
    pub ts: i64,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub message_id: String,
    pub kind: EventKind,
    /// Structured metadata for idempotency and troubleshooting.
    pub details: Value,
}

impl Event {
    /// Build an event stamped with the current time.
    pub fn new(
        kind: EventKind,
        message_id: impl Into<String>,
        agent_id: Option<String>,
        session_id: Option<String>,
        details: Value,
    ) -> Self {
        Event {
            id: 0,
            ts: now_ms(),
            agent_id,
            session_id,
            message_id: message_id.into(),
            kind,
            details,
        }
    }

    /// Build an event whose identity fields are taken from a message.
    pub fn for_message(kind: EventKind, message: &Message, details: Value) -> Self {
        Event::new(
            kind,
            message.id.clone(),
            message.agent_id.clone(),
            message.session_id.clone(),
            details,
        )
    }
}

/// Tumbling-window rollup keyed by `(window_start, agent_id, session_id)`.
///
/// Pure derived state, recomputable from the events log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricWindow {
    pub window_start: i64,
    pub agent_id: String,
    pub session_id: String,
    pub messages_processed: i64,
    pub avg_latency_ms: f64,
    pub errors: i64,
    pub last_update_ts: i64,
}

/// Predicate narrowing which queued messages a claim considers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub topic: Option<String>,
    pub session_id: Option<String>,
}

impl ClaimFilter {
    pub fn topic(topic: impl Into<String>) -> Self {
        ClaimFilter {
            topic: Some(topic.into()),
            session_id: None,
        }
    }
}

/// Predicate for the subscriber's live view.
///
/// The view is advisory: it surfaces candidates, but only a successful
/// claim grants exclusive processing rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub topic: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub statuses: Vec<MessageStatus>,
}

impl Default for SubscribeFilter {
    fn default() -> Self {
        SubscribeFilter {
            topic: None,
            session_id: None,
            agent_id: None,
            statuses: vec![MessageStatus::Queued, MessageStatus::Processing],
        }
    }
}

impl SubscribeFilter {
    pub fn topic(topic: impl Into<String>) -> Self {
        SubscribeFilter {
            topic: Some(topic.into()),
            ..Default::default()
        }
    }
}
