// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for the completion engine.
//!
//! Lightweight, dependency-free counters and timings. An editor extension
//! host polls these for status displays; a full observability stack would be
//! overkill at this layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Generation lifecycle counters.
    pub generations: GenerationCounters,

    /// Chunk flow counters.
    pub chunks: ChunkCounters,

    /// Named operation timings (e.g. the reuse-decision path).
    operations: RwLock<HashMap<String, OperationMetrics>>,

    /// Start time for calculating uptime.
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            generations: GenerationCounters::new(),
            chunks: ChunkCounters::new(),
            operations: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a named operation timing.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        let mut ops = self.operations.write().unwrap();
        let metrics = ops.entry(name.to_string()).or_insert_with(OperationMetrics::new);
        metrics.record(duration);
    }

    /// Get metrics for a specific operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations.read().unwrap().get(name).cloned()
    }

    /// Get uptime since metrics were initialized.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            generations: self.generations.snapshot(),
            chunks: self.chunks.snapshot(),
            operations: self.operations.read().unwrap().clone(),
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.generations.reset();
        self.chunks.reset();
        self.operations.write().unwrap().clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe generation lifecycle counters.
///
/// A generation is `started` once per factory invocation; it later lands in
/// exactly one of `completed`, `errored`, or `cancelled`. `reused` counts
/// requests answered from an in-flight generation without a factory call.
#[derive(Debug)]
pub struct GenerationCounters {
    started: AtomicU64,
    reused: AtomicU64,
    completed: AtomicU64,
    errored: AtomicU64,
    cancelled: AtomicU64,
}

impl GenerationCounters {
    fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    /// Record a fresh generation (one factory invocation).
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request served from the in-flight generation.
    pub fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a source that ran to exhaustion.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a source that failed.
    pub fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a generation abandoned via cancel.
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of requests answered without a factory call (0.0 to 1.0).
    pub fn reuse_rate(&self) -> f64 {
        let started = self.started.load(Ordering::Relaxed);
        let reused = self.reused.load(Ordering::Relaxed);
        let total = started + reused;
        if total == 0 {
            0.0
        } else {
            reused as f64 / total as f64
        }
    }

    /// Current counter values.
    pub fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            started: self.started.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.started.store(0, Ordering::Relaxed);
        self.reused.store(0, Ordering::Relaxed);
        self.completed.store(0, Ordering::Relaxed);
        self.errored.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time generation counter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSnapshot {
    pub started: u64,
    pub reused: u64,
    pub completed: u64,
    pub errored: u64,
    pub cancelled: u64,
}

/// Thread-safe chunk flow counters.
///
/// `produced` counts chunks drained from sources into buffers; `delivered`
/// counts shaped chunks handed to callers. Delivered can exceed produced
/// (replay to multiple readers) or trail it (stripping, truncation).
#[derive(Debug)]
pub struct ChunkCounters {
    produced: AtomicU64,
    delivered: AtomicU64,
}

impl ChunkCounters {
    fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Record a chunk drained from a source.
    pub fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a shaped chunk handed to a caller.
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values as (produced, delivered).
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.produced.load(Ordering::Relaxed),
            self.delivered.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.produced.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
    }
}

/// Timing metrics for a named operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    /// Number of operations.
    pub count: u64,

    /// Total duration.
    pub total_duration: Duration,

    /// Minimum duration.
    pub min_duration: Duration,

    /// Maximum duration.
    pub max_duration: Duration,
}

impl OperationMetrics {
    /// Create new operation metrics.
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }

    /// Record an operation.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average duration.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Generation lifecycle counters.
    pub generations: GenerationSnapshot,

    /// Chunk counters as (produced, delivered).
    pub chunks: (u64, u64),

    /// Operation metrics by name.
    pub operations: HashMap<String, OperationMetrics>,

    /// Uptime when snapshot was taken.
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Metrics Report ===\n\n");
        report.push_str(&format!("Uptime: {:.2?}\n", self.uptime));
        report.push_str(&format!(
            "Generations: {} started, {} reused, {} completed, {} errored, {} cancelled\n",
            self.generations.started,
            self.generations.reused,
            self.generations.completed,
            self.generations.errored,
            self.generations.cancelled,
        ));
        report.push_str(&format!(
            "Chunks: {} produced, {} delivered\n\n",
            self.chunks.0, self.chunks.1
        ));

        if !self.operations.is_empty() {
            report.push_str("Operation Metrics:\n");
            for (name, metrics) in &self.operations {
                report.push_str(&format!(
                    "  {}: {} ops, avg {:.2?}, max {:.2?}\n",
                    name,
                    metrics.count,
                    metrics.avg_duration(),
                    metrics.max_duration,
                ));
            }
        }

        report
    }
}

/// Convenience function to record an operation to global metrics.
pub fn record_operation(name: &str, duration: Duration) {
    GLOBAL_METRICS.record_operation(name, duration);
}
