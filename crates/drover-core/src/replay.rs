// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconstruct a message's status from its audit log.
//!
//! The events log is the authoritative record of lifecycle transitions; the
//! `status` column on the message row is a cache that may briefly lag but
//! must never regress. Replaying a message's events in arrival order always
//! yields its current status.

use crate::types::{Event, EventKind, MessageStatus};

/// Fold a message's event sequence into its resulting status.
///
/// Events must be in arrival order (ascending `id`), as returned by the
/// store's per-message query. Returns `None` for an empty sequence.
pub fn replay_status(events: &[Event]) -> Option<MessageStatus> {
    let mut status = None;
    for event in events {
        status = Some(apply(status, event));
    }
    status
}

fn apply(current: Option<MessageStatus>, event: &Event) -> MessageStatus {
    match event.kind {
        EventKind::Published => MessageStatus::Queued,
        EventKind::Claimed => MessageStatus::Processing,
        EventKind::Ack => MessageStatus::Done,
        // Heartbeats extend the lease without changing status.
        EventKind::Heartbeat => current.unwrap_or(MessageStatus::Processing),
        EventKind::Nack => {
            if event.details.get("requeue").and_then(|v| v.as_bool()) == Some(false) {
                MessageStatus::Error
            } else {
                MessageStatus::Queued
            }
        }
        EventKind::Timeout => {
            if event.details.get("terminal").and_then(|v| v.as_bool()) == Some(true) {
                MessageStatus::Expired
            } else {
                MessageStatus::Queued
            }
        }
    }
}
