// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publish-side validation and defaulting.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use drover_config::BusConfig;
use drover_core::types::{Event, EventKind, Message, MessageStatus, NewMessage, PayloadKind, now_ms};
use drover_core::{BusError, BusStore};

/// Validates and defaults incoming messages, then writes them to the store
/// together with their `published` audit event.
pub struct Publisher {
    store: Arc<dyn BusStore>,
    config: BusConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn BusStore>, config: BusConfig) -> Self {
        Publisher { store, config }
    }

    /// Validate `new`, fill unset fields, and insert the queued row. Returns
    /// the message as stored. Rejection happens before any row is written.
    pub async fn publish(&self, new: NewMessage) -> Result<Message, BusError> {
        if new.topic.trim().is_empty() {
            return Err(BusError::Validation("topic must not be empty".into()));
        }
        let role = new
            .role
            .ok_or_else(|| BusError::Validation("role is required".into()))?;
        let payload_kind = new
            .payload_kind
            .ok_or_else(|| BusError::Validation("payload_kind is required".into()))?;

        match payload_kind {
            PayloadKind::BinaryRef => {
                if new.payload_ref.is_none() {
                    return Err(BusError::Validation(
                        "binary_ref messages must carry a payload_ref".into(),
                    ));
                }
            }
            PayloadKind::Text | PayloadKind::Structured => {
                if new.payload.is_none() {
                    return Err(BusError::Validation(format!(
                        "{payload_kind} messages must carry an inline payload"
                    )));
                }
            }
            PayloadKind::Signal => {}
        }

        if let Some(payload) = &new.payload {
            let size = payload.to_string().len();
            if size > self.config.max_inline_payload_bytes {
                return Err(BusError::Validation(format!(
                    "inline payload is {size} bytes, ceiling is {}; use payload_ref",
                    self.config.max_inline_payload_bytes
                )));
            }
        }

        let ttl_ms = new.ttl_ms.unwrap_or(self.config.default_ttl_ms);
        if ttl_ms < 0 {
            return Err(BusError::Validation("ttl_ms must not be negative".into()));
        }

        let now = now_ms();
        let message = Message {
            id: new.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            topic: new.topic,
            session_id: new.session_id,
            task_id: new.task_id,
            agent_id: new.agent_id,
            role,
            payload_kind,
            payload: new.payload,
            payload_ref: new.payload_ref,
            priority: new.priority.unwrap_or(0),
            ttl_ms,
            lease_owner: None,
            lease_expires_ts: None,
            status: MessageStatus::Queued,
            retry_count: 0,
            published_ts: new.published_ts.unwrap_or(now),
            ingest_ts: now,
        };

        let event = Event::for_message(
            EventKind::Published,
            &message,
            json!({
                "topic": message.topic,
                "payload_kind": message.payload_kind.to_string(),
                "priority": message.priority,
            }),
        );
        self.store.publish(&message, &event).await?;
        debug!(id = %message.id, topic = %message.topic, "message published");
        metrics::counter!("drover_messages_published_total").increment(1);
        Ok(message)
    }
}
