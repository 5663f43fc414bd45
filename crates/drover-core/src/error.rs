// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Drover message bus.

use thiserror::Error;

/// The primary error type used across all bus operations.
///
/// Two protocol signals deliberately do not appear here because they are
/// expected control flow rather than failures: an empty claim returns
/// `Ok(None)`, and a reclamation conflict is absorbed by the sweeper.
#[derive(Debug, Error)]
pub enum BusError {
    /// Malformed publish input, rejected before any row is written.
    #[error("validation error: {0}")]
    Validation(String),

    /// Ownership race detected on extend/ack/nack. Fatal to the current
    /// processing attempt; must not be retried.
    #[error("lease lost for message {message_id} (claimant {claimant})")]
    LeaseLost { message_id: String, claimant: String },

    /// Underlying keyspace unreachable or failed. Operations fail closed;
    /// no partial writes were committed.
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (missing required fields, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BusError {
    /// Wrap an arbitrary backend failure as a store error.
    pub fn store(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        BusError::Store {
            source: Box::new(source),
        }
    }

    /// True when the error is a lease-ownership race.
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, BusError::LeaseLost { .. })
    }
}
