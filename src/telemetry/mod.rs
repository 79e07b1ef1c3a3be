// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! This module provides observability for the completion engine:
//!
//! - **Tracing**: structured logging with generation IDs for following one
//!   generation across the drain task, listeners, and readers
//! - **Metrics**: counters for generations and chunks, timings for the
//!   reuse-decision path
//!
//! # Usage
//!
//! Initialize telemetry once where the engine is embedded:
//!
//! ```rust,ignore
//! use inlay::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```
//!
//! The error sink handed to a [`ReuseCoordinator`](crate::generation::ReuseCoordinator)
//! is the intended place for logging stream failures; readers never see them.

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    ChunkCounters, GenerationCounters, GenerationSnapshot, Metrics, MetricsSnapshot,
    OperationMetrics, GLOBAL_METRICS,
};
