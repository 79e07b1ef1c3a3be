// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Inlay - streaming-generator reuse for AI inline autocomplete.
//!
//! Fast typing fires overlapping completion requests, each of which would
//! normally open (and abandon) its own LLM token stream. Inlay shares one
//! in-flight stream across requests instead: buffered output is replayed to
//! late subscribers, a new prefix that continues the generation picks it up
//! with the overlap stripped, backspace forces a clean restart, and
//! single-line requests are cut at the first newline without killing the
//! generation underneath.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Boundary types (chunk streams, requests, the source trait)
//! - [`error`] - Error types and result aliases
//! - [`generation`] - The core: broadcast generator and reuse coordinator
//! - [`telemetry`] - Tracing, metrics, and observability infrastructure
//!
//! Everything around the core - provider HTTP adapters, prompt construction,
//! editor rendering, retry, completion caches - lives in the embedding
//! application. The engine only ever sees a factory producing a chunk stream
//! and hands back a shaped chunk stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use inlay::generation::ReuseCoordinator;
//!
//! let mut coordinator = ReuseCoordinator::new(Arc::new(|err| {
//!     eprintln!("completion stream failed: {err}");
//! }));
//!
//! // Keystroke 1: open a stream for the current prefix.
//! let mut stream = coordinator.get_generator("he", open_stream, false);
//!
//! // Keystroke 2: the user typed what was being generated; no new stream.
//! let mut stream = coordinator.get_generator("hello ", open_stream, false);
//! while let Some(chunk) = stream.next().await {
//!     show_ghost_text(&chunk);
//! }
//! ```

pub mod error;
pub mod generation;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{Result, StreamError};
pub use generation::{BroadcastGenerator, CompletionStream, ReuseCoordinator, TeeReader};
pub use types::{
    BoxedSource, ChunkStream, CompletionRequest, CompletionSource, ErrorSink, GenerationId,
    SharedSource,
};

/// Inlay version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
