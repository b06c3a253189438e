// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Zapline ingestion pipeline.

use thiserror::Error;

/// The primary error type used across all Zapline adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ZaplineError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, constraint
    /// failures other than the expected uniqueness conflicts).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A webhook payload could not be parsed into any known provider shape.
    #[error("payload error: {message}")]
    Payload { message: String },

    /// Realtime broadcaster failures. Never fatal for ingestion.
    #[error("broadcast error: {message}")]
    Broadcast {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound messaging provider failures (send, history fetch).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Adapter health check failed.
    #[error("health check failed for {name}: {source}")]
    HealthCheckFailed {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ZaplineError {
    /// Whether this error means the primary conversation/message write failed.
    ///
    /// Webhook handlers answer with a failure status only for these, so the
    /// upstream provider redelivers; everything else is acknowledged.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal(_))
    }

    /// Shorthand for a [`ZaplineError::Payload`].
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }
}
