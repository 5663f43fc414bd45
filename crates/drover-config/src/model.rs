// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Drover message bus.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Drover configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional except `bus.max_retries`, which has
/// no universally correct default and must be supplied (see
/// [`crate::validate_config`]).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DroverConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Work-queue protocol settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Metrics aggregation settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("drover").join("drover.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "drover.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Work-queue protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Default message TTL when the publisher leaves it unset.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: i64,

    /// Default lease duration granted by `claim`.
    #[serde(default = "default_lease_ms")]
    pub default_lease_ms: i64,

    /// Recommended heartbeat cadence for claimants. The lease duration must
    /// exceed this by a wide margin to ride out clock skew.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: i64,

    /// Reclamation sweep cadence.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: i64,

    /// Retries (nack-requeue or reclamation) permitted before a message is
    /// moved to a terminal state. Required; no default is provided.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Ceiling on inline payload size; larger payloads must use a
    /// `payload_ref`.
    #[serde(default = "default_max_inline_payload_bytes")]
    pub max_inline_payload_bytes: usize,

    /// Subscriber live-view poll cadence.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: i64,

    /// Bound on each subscription's delivery channel.
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            default_lease_ms: default_lease_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_retries: None,
            max_inline_payload_bytes: default_max_inline_payload_bytes(),
            poll_interval_ms: default_poll_interval_ms(),
            subscription_buffer: default_subscription_buffer(),
        }
    }
}

fn default_ttl_ms() -> i64 {
    5 * 60 * 1000
}

fn default_lease_ms() -> i64 {
    60_000
}

fn default_heartbeat_interval_ms() -> i64 {
    15_000
}

fn default_sweep_interval_ms() -> i64 {
    5_000
}

fn default_max_inline_payload_bytes() -> usize {
    64 * 1024
}

fn default_poll_interval_ms() -> i64 {
    1_000
}

fn default_subscription_buffer() -> usize {
    256
}

/// Metrics aggregation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Tumbling window size.
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,

    /// Cadence at which closed windows are flushed to the store.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: i64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_window_ms() -> i64 {
    60_000
}

fn default_flush_interval_ms() -> i64 {
    5_000
}
