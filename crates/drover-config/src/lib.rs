// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Drover message bus.
//!
//! Layered TOML loading via figment (defaults < system < user < local file)
//! with `DROVER_` environment variable overrides, followed by semantic
//! validation of the values serde cannot check on its own.

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::ConfigError;
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{BusConfig, DroverConfig, MetricsConfig, StorageConfig};
pub use validation::validate_config;
