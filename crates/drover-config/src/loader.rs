// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./drover.toml` > `~/.config/drover/drover.toml`
//! > `/etc/drover/drover.toml` with environment variable overrides via the
//! `DROVER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DroverConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/drover/drover.toml` (system-wide)
/// 3. `~/.config/drover/drover.toml` (user XDG config)
/// 4. `./drover.toml` (local directory)
/// 5. `DROVER_*` environment variables
pub fn load_config() -> Result<DroverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::file("/etc/drover/drover.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("drover/drover.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("drover.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and embedded configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<DroverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DroverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `DROVER_BUS_DEFAULT_TTL_MS` must map to
/// `bus.default_ttl_ms`, not `bus.default.ttl.ms`.
fn env_provider() -> Env {
    Env::prefixed("DROVER_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("storage_", "storage.", 1)
            .replacen("bus_", "bus.", 1)
            .replacen("metrics_", "metrics.", 1);
        mapped.into()
    })
}
