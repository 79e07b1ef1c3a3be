// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Broadcast generator - multi-consumer fan-out over a single-consumer stream.
//!
//! An LLM completion stream can only be consumed once, but fast typing means
//! several overlapping autocomplete requests may want the same in-flight
//! generation. [`BroadcastGenerator`] drains the underlying stream exactly
//! once into an append-only buffer and lets arbitrarily many readers replay
//! from the start and then follow live, via [`BroadcastGenerator::tee`].
//!
//! The buffer is the single source of truth: readers are only ever *woken* by
//! notifications and then re-read committed entries, because several chunks
//! can land between two polls of a waiting reader. Production errors never
//! surface through readers; they go to the error sink once and the stream
//! simply ends early.

use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

use crate::error::StreamError;
use crate::types::{ErrorSink, GenerationId};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Callback registered via [`BroadcastGenerator::listen`].
///
/// Receives `Some(chunk)` for every chunk, in production order, and `None`
/// exactly once when the stream ends. Must not call back into the generator
/// it is registered on; it is invoked with the internal state locked.
type Listener<T> = Box<dyn FnMut(Option<&T>) + Send>;

struct State<T> {
    /// Committed chunks, append-only. Never truncated or mutated once pushed.
    buffer: Vec<T>,
    /// True once the source is exhausted, errored, or cancelled.
    ended: bool,
    /// Live listener callbacks; dropped when the stream ends.
    listeners: Vec<Listener<T>>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Wakes readers blocked in `TeeReader::next`. A wake means "at least one
    /// new value or end", not "exactly one" - readers re-check the buffer.
    notify: Notify,
}

impl<T> Shared<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                buffer: Vec::new(),
                ended: false,
                listeners: Vec::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Append a chunk and fan it out. The chunk is committed to the buffer
    /// before any listener or reader can observe it.
    fn push(&self, value: T) {
        let mut state = self.state.lock().unwrap();
        if state.ended {
            // Raced with cancellation; the chunk is dropped, not buffered.
            return;
        }
        let State {
            buffer, listeners, ..
        } = &mut *state;
        buffer.push(value);
        if let Some(last) = buffer.last() {
            for listener in listeners.iter_mut() {
                listener(Some(last));
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// Mark the stream ended, deliver the end marker to every listener, and
    /// wake all waiting readers. Idempotent.
    fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        if state.ended {
            return;
        }
        state.ended = true;
        let mut listeners = std::mem::take(&mut state.listeners);
        for listener in listeners.iter_mut() {
            listener(None);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    fn is_ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }

    fn buffered(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }
}

/// Multi-consumer, replayable, cancellable wrapper around a single-consumer
/// chunk stream.
///
/// Construction immediately spawns a background drain task; accumulation
/// starts before any reader attaches. The generator owns cancellation of the
/// underlying source: readers that stop iterating do *not* cancel it, only
/// [`cancel`](Self::cancel) does.
///
/// Dropping the generator does not stop the drain task; an uncancelled drain
/// runs until its source ends. The reuse coordinator always cancels before
/// letting go of a generator.
pub struct BroadcastGenerator<T> {
    shared: Arc<Shared<T>>,
    cancel_tx: watch::Sender<bool>,
    id: GenerationId,
}

impl<T> BroadcastGenerator<T>
where
    T: Clone + Send + 'static,
{
    /// Wrap a source stream, creating a private cancellation channel.
    ///
    /// Use [`with_cancel`](Self::with_cancel) when the transport needs to
    /// observe cancellation too (hand it `cancel_tx.subscribe()` first).
    pub fn new<S>(source: S, on_error: ErrorSink) -> Self
    where
        S: Stream<Item = Result<T, StreamError>> + Send + 'static,
    {
        let (cancel_tx, _) = watch::channel(false);
        Self::with_cancel(source, on_error, cancel_tx)
    }

    /// Wrap a source stream using an existing cancellation channel.
    ///
    /// The generator takes ownership of the write half; `subscribe()` views
    /// handed out earlier (e.g. to the transport) all observe `cancel()`.
    pub fn with_cancel<S>(source: S, on_error: ErrorSink, cancel_tx: watch::Sender<bool>) -> Self
    where
        S: Stream<Item = Result<T, StreamError>> + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let id = GenerationId::new();

        let worker = Arc::clone(&shared);
        let mut cancel_rx = cancel_tx.subscribe();
        let mut source = source.boxed();
        tokio::spawn(async move {
            debug!(generation = %id.short(), "drain task started");
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.generations.record_started();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel_rx) => {
                        debug!(generation = %id.short(), "drain task cancelled");
                        #[cfg(feature = "telemetry")]
                        GLOBAL_METRICS.generations.record_cancelled();
                        break;
                    }
                    item = source.next() => item,
                };
                match next {
                    Some(Ok(chunk)) => {
                        trace!(generation = %id.short(), "chunk received");
                        #[cfg(feature = "telemetry")]
                        GLOBAL_METRICS.chunks.record_produced();
                        worker.push(chunk);
                    }
                    Some(Err(err)) => {
                        warn!(generation = %id.short(), error = %err, "source stream failed");
                        #[cfg(feature = "telemetry")]
                        GLOBAL_METRICS.generations.record_errored();
                        on_error(err);
                        break;
                    }
                    None => {
                        debug!(generation = %id.short(), "source stream exhausted");
                        #[cfg(feature = "telemetry")]
                        GLOBAL_METRICS.generations.record_completed();
                        break;
                    }
                }
            }
            worker.finish();
        });

        Self {
            shared,
            cancel_tx,
            id,
        }
    }

    /// Cancel the generation.
    ///
    /// Signals the cancellation channel (the drain loop and any subscribed
    /// transport stop at their next suspension point), immediately marks the
    /// stream ended, and wakes every waiting reader. Already-buffered chunks
    /// stay available. Safe to call any number of times, at any point in the
    /// lifecycle.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
        self.shared.finish();
    }

    /// Register a listener invoked for every chunk, then once with `None`.
    ///
    /// Before returning, synchronously replays every chunk already buffered,
    /// in order; a listener therefore sees the entire stream no matter when
    /// it attaches, each chunk exactly once. If the stream has already ended,
    /// the end marker follows the replay immediately and the callback is not
    /// retained.
    pub fn listen<F>(&self, mut callback: F)
    where
        F: FnMut(Option<&T>) + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        for value in &state.buffer {
            callback(Some(value));
        }
        if state.ended {
            callback(None);
            return;
        }
        state.listeners.push(Box::new(callback));
    }

    /// Create an independent reader over the full stream.
    ///
    /// Each call returns a fresh [`TeeReader`] that replays the buffer from
    /// the beginning and then follows live production. Concurrent readers do
    /// not disturb each other and all observe the identical sequence.
    pub fn tee(&self) -> TeeReader<T> {
        TeeReader {
            shared: Arc::clone(&self.shared),
            cursor: 0,
        }
    }

    /// Whether the stream has ended (exhausted, errored, or cancelled).
    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    /// Number of chunks buffered so far.
    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    /// Identifier tying this generation's log lines together.
    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// A read-only view of the cancellation channel, for transports.
    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

/// Resolves once the watch flag flips to true. If the channel closes without
/// a cancellation, never resolves - the drain then runs until its source ends.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flag| *flag).await.is_err() {
        futures::future::pending::<()>().await;
    }
}

/// One reader's cursor over a [`BroadcastGenerator`]'s buffer.
///
/// Created by [`BroadcastGenerator::tee`]. Yields every chunk in production
/// order with no gaps and no duplicates, then `None` once the stream has
/// ended and the cursor has caught up. The reader outlives the generator
/// handle; it holds the shared buffer alive on its own.
pub struct TeeReader<T> {
    shared: Arc<Shared<T>>,
    cursor: usize,
}

impl<T: Clone> TeeReader<T> {
    /// Await the next chunk, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            // Arm the waiter before checking state, so a chunk pushed between
            // the check and the await still wakes us.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.shared.state.lock().unwrap();
                if self.cursor < state.buffer.len() {
                    let value = state.buffer[self.cursor].clone();
                    self.cursor += 1;
                    return Some(value);
                }
                if state.ended {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Drain the rest of the stream into a vector.
    pub async fn collect(mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(value) = self.next().await {
            out.push(value);
        }
        out
    }
}
