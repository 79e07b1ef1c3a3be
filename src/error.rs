// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the inlay completion engine.
//!
//! This module provides strongly-typed errors for chunk-stream production,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error
//! propagation at the application boundary.
//!
//! Errors produced by an underlying completion stream never surface through
//! the readers of a broadcast generator; they are funneled to the generator's
//! error sink exactly once and the stream simply ends early. See
//! [`crate::generation::BroadcastGenerator`].

use thiserror::Error;

/// Errors that can occur while producing a completion chunk stream.
///
/// These cross the factory boundary: the transport or provider adapter that
/// opens the stream reports failures as `Err` items, and the drain loop hands
/// them to the configured [`ErrorSink`](crate::types::ErrorSink).
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Response parsing error: {0}")]
    Parse(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Retry policy itself lives outside this crate, wrapped around the
    /// stream factory; this only classifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Check if this error represents cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

/// Convert any error type that implements std::error::Error to an anyhow::Error.
pub fn to_anyhow<E: std::error::Error + Send + Sync + 'static>(err: E) -> anyhow::Error {
    anyhow::Error::new(err)
}
