// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: required settings, positive durations, and the lease-vs-
//! heartbeat safety margin.

use crate::diagnostic::ConfigError;
use crate::model::DroverConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DroverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    match config.bus.max_retries {
        None => errors.push(ConfigError::Validation {
            message: "bus.max_retries is required and has no default".to_string(),
        }),
        Some(0) => errors.push(ConfigError::Validation {
            message: "bus.max_retries must be at least 1".to_string(),
        }),
        Some(_) => {}
    }

    for (key, value) in [
        ("bus.default_ttl_ms", config.bus.default_ttl_ms),
        ("bus.default_lease_ms", config.bus.default_lease_ms),
        ("bus.heartbeat_interval_ms", config.bus.heartbeat_interval_ms),
        ("bus.sweep_interval_ms", config.bus.sweep_interval_ms),
        ("bus.poll_interval_ms", config.bus.poll_interval_ms),
        ("metrics.window_ms", config.metrics.window_ms),
        ("metrics.flush_interval_ms", config.metrics.flush_interval_ms),
    ] {
        if value <= 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be positive, got {value}"),
            });
        }
    }

    // A lease is only safe under clock skew when it outlives several missed
    // heartbeats.
    if config.bus.default_lease_ms < 3 * config.bus.heartbeat_interval_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "bus.default_lease_ms ({}) must be at least 3x bus.heartbeat_interval_ms ({})",
                config.bus.default_lease_ms, config.bus.heartbeat_interval_ms
            ),
        });
    }

    if config.bus.max_inline_payload_bytes == 0 {
        errors.push(ConfigError::Validation {
            message: "bus.max_inline_payload_bytes must be positive".to_string(),
        });
    }

    if config.bus.subscription_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "bus.subscription_buffer must be positive".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
