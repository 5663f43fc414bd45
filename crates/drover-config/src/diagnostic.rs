// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Miette diagnostics for configuration failures.

use miette::Diagnostic;
use thiserror::Error;

/// A configuration error with diagnostic help text.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// Loading or deserialization failed (bad TOML, wrong type, unknown key).
    #[error("failed to load configuration: {source}")]
    #[diagnostic(
        code(drover::config::load),
        help("check drover.toml against the documented keys; unknown keys are rejected")
    )]
    Load {
        #[source]
        source: figment::Error,
    },

    /// A validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(drover::config::validation))]
    Validation {
        /// What failed and which key it concerns.
        message: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(source: figment::Error) -> Self {
        ConfigError::Load { source }
    }
}
