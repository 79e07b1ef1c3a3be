// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core type definitions for the inlay completion engine.
//!
//! The engine's only boundary is a function signature: it consumes a factory
//! that produces an asynchronous sequence of text chunks, and exposes an
//! asynchronous sequence of text chunks truncated and deduplicated against a
//! given prefix. Everything a collaborator needs to plug in lives here:
//!
//! - [`ChunkStream`] - the asynchronous chunk sequence a factory returns
//! - [`ErrorSink`] - the side channel for stream-production failures
//! - [`CompletionRequest`] - prefix + options for one autocomplete request
//! - [`CompletionSource`] - trait seam for provider adapters
//! - [`GenerationId`] - correlates log lines for one generation

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::StreamError;

// ============================================================================
// Stream Types
// ============================================================================

/// An asynchronous sequence of chunks produced by a completion source.
///
/// Each `Err` item is a production failure; the drain loop reports it to the
/// generator's [`ErrorSink`] and treats the stream as ended. Readers never
/// observe the error itself, only early termination.
pub type ChunkStream<T = String> =
    Pin<Box<dyn Stream<Item = Result<T, StreamError>> + Send + 'static>>;

/// Side channel for stream-production errors.
///
/// Invoked at most once per broadcast generator, never awaited. Intended for
/// logging and telemetry, not recovery.
pub type ErrorSink = Arc<dyn Fn(StreamError) + Send + Sync>;

// ============================================================================
// Completion Request
// ============================================================================

/// One inline-autocomplete request: the text before the cursor plus options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Text already present before the cursor when the request was issued.
    pub prefix: String,

    /// Whether the completion may span multiple lines. When false, output is
    /// cut at the first newline.
    pub multiline: bool,
}

impl CompletionRequest {
    /// Create a single-line request for the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            multiline: false,
        }
    }

    /// Allow the completion to span multiple lines.
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }
}

// ============================================================================
// Generation Id
// ============================================================================

/// A unique identifier for one background generation.
///
/// Tags log lines emitted by the drain task and the reuse coordinator so a
/// single generation can be traced across async boundaries.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenerationId(Uuid);

impl GenerationId {
    /// Generate a new random generation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get a short representation (first 8 characters).
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenerationId({})", self.short())
    }
}

// ============================================================================
// Completion Source Trait
// ============================================================================

use async_trait::async_trait;

/// Trait for anything that can open a completion chunk stream.
///
/// Provider adapters (HTTP transports, local models) implement this; the
/// engine itself only ever sees the resulting [`ChunkStream`]. The cancel
/// receiver is a read-only view of the generation's cancellation channel so
/// the transport can stop producing when the generation is abandoned.
///
/// # Example
///
/// ```rust,ignore
/// use inlay::types::{ChunkStream, CompletionRequest, CompletionSource};
///
/// struct MySource;
///
/// #[async_trait]
/// impl CompletionSource for MySource {
///     async fn stream_completion(
///         &self,
///         request: &CompletionRequest,
///         cancel: watch::Receiver<bool>,
///     ) -> Result<ChunkStream, StreamError> {
///         // Open the transport, return the chunk stream...
///     }
///
///     fn name(&self) -> &str {
///         "my-source"
///     }
/// }
/// ```
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Open a fresh chunk stream for the given request.
    ///
    /// Called at most once per generation; every call must return a new
    /// stream.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<ChunkStream, StreamError>;

    /// Get the name of this source for display purposes.
    fn name(&self) -> &str;
}

/// A boxed completion source for dynamic dispatch.
pub type BoxedSource = Box<dyn CompletionSource>;

/// Arc-wrapped completion source for shared ownership.
pub type SharedSource = Arc<dyn CompletionSource>;
