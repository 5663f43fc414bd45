// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read and append access to the audit log.

use std::sync::Arc;

use drover_core::replay_status;
use drover_core::types::{Event, EventKind, MessageStatus, now_ms};
use drover_core::{BusError, BusStore};
use serde_json::Value;

/// Audit-log facade: custom event emission, per-message history, cursor
/// paging, and status replay.
pub struct EventRecorder {
    store: Arc<dyn BusStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn BusStore>) -> Self {
        EventRecorder { store }
    }

    /// Append an event outside the built-in lifecycle transitions (which
    /// record their own events atomically).
    pub async fn record(
        &self,
        kind: EventKind,
        message_id: &str,
        agent_id: Option<String>,
        session_id: Option<String>,
        details: Value,
    ) -> Result<(), BusError> {
        let event = Event {
            id: 0,
            ts: now_ms(),
            agent_id,
            session_id,
            message_id: message_id.to_string(),
            kind,
            details,
        };
        self.store.append_event(&event).await
    }

    /// Full history for one message, in arrival order.
    pub async fn events_for_message(&self, message_id: &str) -> Result<Vec<Event>, BusError> {
        self.store.events_for_message(message_id).await
    }

    /// Cursor-paged read over the whole log.
    pub async fn events_since(&self, after_id: i64, limit: u32) -> Result<Vec<Event>, BusError> {
        self.store.events_since(after_id, limit).await
    }

    /// Reconstruct a message's status purely from its audit log. `None` when
    /// the log holds no events for the message.
    pub async fn replay(&self, message_id: &str) -> Result<Option<MessageStatus>, BusError> {
        let events = self.store.events_for_message(message_id).await?;
        Ok(replay_status(&events))
    }
}
