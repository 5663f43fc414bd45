// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Drover message bus.
//!
//! This crate defines the domain types exchanged over the bus (messages,
//! audit events, metric windows), the error taxonomy shared by every bus
//! operation, the [`BusStore`] trait implemented by persistence backends,
//! and the event-replay helper that reconstructs a message's status from
//! its audit log.

pub mod error;
pub mod replay;
pub mod traits;
pub mod types;

pub use error::BusError;
pub use replay::replay_status;
pub use traits::BusStore;
pub use types::{
    ClaimFilter, Event, EventKind, Message, MessageStatus, MetricWindow, NewMessage, PayloadKind,
    Role, SubscribeFilter, now_ms,
};
