// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Generator reuse for overlapping autocomplete requests.
//!
//! Fast typing fires a completion request on nearly every keystroke. Opening
//! a fresh LLM stream for each would discard perfectly good in-flight output,
//! so the [`ReuseCoordinator`] keeps the current [`BroadcastGenerator`] alive
//! across requests and answers each new prefix from it when the prefix is a
//! continuation of what has already been typed plus generated. Otherwise it
//! cancels the old generation and starts fresh.
//!
//! The coordinator also shapes the output stream: the part of the new prefix
//! the user already typed is stripped from the front of the replayed chunks,
//! and single-line requests are cut at the first newline - without cancelling
//! the generator, which keeps running for the next keystroke.
//!
//! One coordinator per editor session; construct it where the session is
//! wired up and pass it down.

use std::sync::{Arc, Mutex};

#[cfg(feature = "telemetry")]
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::debug;

use crate::types::{ChunkStream, CompletionRequest, ErrorSink, SharedSource};

use super::broadcast::{BroadcastGenerator, TeeReader};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

/// Coordinator state. Replaced as a whole on every transition so the prefix,
/// the accumulated completion, and the generator handle can never be torn.
enum GeneratorState {
    /// No generation in flight.
    Idle,
    /// One live generation serving `prefix`.
    Active {
        /// The prefix the generator was started from.
        prefix: String,
        /// Everything the generator has produced so far. Updated by a
        /// `listen` callback at the moment each chunk is committed, so it
        /// tracks generation progress even when no reader is pulling.
        completion: Arc<Mutex<String>>,
        generator: BroadcastGenerator<String>,
    },
}

/// Decides continue-vs-restart for each autocomplete request and shapes the
/// resulting chunk stream.
///
/// Owns at most one live [`BroadcastGenerator`]; starting a new one always
/// cancels the previous one first, so there is never an orphaned background
/// drain. Long-lived: one per editor session.
///
/// # Example
///
/// ```rust,ignore
/// use inlay::generation::ReuseCoordinator;
///
/// let mut coordinator = ReuseCoordinator::default();
/// let mut stream = coordinator.get_generator("fn mai", factory, false);
/// while let Some(chunk) = stream.next().await {
///     render_ghost_text(&chunk);
/// }
/// ```
pub struct ReuseCoordinator {
    state: GeneratorState,
    on_error: ErrorSink,
}

impl ReuseCoordinator {
    /// Create a coordinator with the given error sink.
    ///
    /// The sink receives stream-production failures, at most once per
    /// generation; readers only ever observe early end-of-stream.
    pub fn new(on_error: ErrorSink) -> Self {
        Self {
            state: GeneratorState::Idle,
            on_error,
        }
    }

    /// Serve one completion request.
    ///
    /// Reuses the in-flight generation when `prefix` continues it (see
    /// [`Self::would_reuse`]); otherwise cancels it and invokes `factory`
    /// exactly once for a fresh chunk stream. The factory receives a
    /// read-only view of the new generation's cancellation channel.
    ///
    /// The returned [`CompletionStream`] is fresh per call and independent of
    /// streams returned earlier; dropping it or stopping early does not
    /// cancel the underlying generation.
    pub fn get_generator<F>(
        &mut self,
        prefix: &str,
        factory: F,
        multiline: bool,
    ) -> CompletionStream
    where
        F: FnOnce(watch::Receiver<bool>) -> ChunkStream,
    {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        if self.would_reuse(prefix) {
            if let GeneratorState::Active {
                prefix: pending,
                generator,
                ..
            } = &self.state
            {
                debug!(
                    generation = %generator.id().short(),
                    typed = prefix.len() - pending.len(),
                    "reusing in-flight generation"
                );
                #[cfg(feature = "telemetry")]
                {
                    GLOBAL_METRICS.generations.record_reused();
                    GLOBAL_METRICS.record_operation("reuse.get_generator", start.elapsed());
                }
                let already_typed = prefix[pending.len()..].to_string();
                return CompletionStream::new(generator.tee(), already_typed, multiline);
            }
        }

        // Fresh start. Cancel the old generation before its replacement
        // exists, so at most one background drain is ever live.
        if let GeneratorState::Active { generator, .. } = &self.state {
            generator.cancel();
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let source = factory(cancel_rx);
        let generator = BroadcastGenerator::with_cancel(source, Arc::clone(&self.on_error), cancel_tx);
        debug!(
            generation = %generator.id().short(),
            prefix_len = prefix.len(),
            multiline,
            "starting fresh generation"
        );

        // The accumulation listener is what keeps the completion text correct
        // between get_generator calls, even if no reader consumes the stream.
        let completion = Arc::new(Mutex::new(String::new()));
        let accumulated = Arc::clone(&completion);
        generator.listen(move |chunk| {
            if let Some(chunk) = chunk {
                accumulated.lock().unwrap().push_str(chunk);
            }
        });

        let stream = CompletionStream::new(generator.tee(), String::new(), multiline);
        self.state = GeneratorState::Active {
            prefix: prefix.to_string(),
            completion,
            generator,
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("reuse.get_generator", start.elapsed());

        stream
    }

    /// Serve one completion request by opening a stream from `source`.
    ///
    /// Convenience wrapper over [`Self::get_generator`] for callers holding a
    /// [`CompletionSource`](crate::types::CompletionSource) rather than a raw
    /// factory closure. The source is only consulted when the request cannot
    /// reuse the in-flight generation.
    pub fn complete(&mut self, request: &CompletionRequest, source: SharedSource) -> CompletionStream {
        let request_for_factory = request.clone();
        self.get_generator(
            &request.prefix,
            move |cancel| {
                futures::stream::once(async move {
                    source
                        .stream_completion(&request_for_factory, cancel)
                        .await
                })
                .map(|opened| match opened {
                    Ok(stream) => stream,
                    Err(err) => futures::stream::iter(vec![Err(err)]).boxed(),
                })
                .flatten()
                .boxed()
            },
            request.multiline,
        )
    }

    /// Whether a request for `prefix` would reuse the in-flight generation.
    ///
    /// All of the following must hold: a generation is active; the text it
    /// has accounted for so far (its starting prefix plus everything it has
    /// produced) starts with `prefix`; and `prefix` is no shorter than the
    /// starting prefix. The length guard rejects backspace/deletion, which
    /// always forces a fresh generation even when the shorter text is a
    /// literal prefix of the produced output.
    pub fn would_reuse(&self, prefix: &str) -> bool {
        match &self.state {
            GeneratorState::Idle => false,
            GeneratorState::Active {
                prefix: pending,
                completion,
                ..
            } => {
                if pending.len() > prefix.len() || !prefix.starts_with(pending.as_str()) {
                    return false;
                }
                let completion = completion.lock().unwrap();
                completion.starts_with(&prefix[pending.len()..])
            }
        }
    }

    /// The prefix the current generation was started from, if any.
    pub fn pending_prefix(&self) -> Option<&str> {
        match &self.state {
            GeneratorState::Idle => None,
            GeneratorState::Active { prefix, .. } => Some(prefix),
        }
    }

    /// Everything the current generation has produced so far, if any.
    pub fn pending_completion(&self) -> Option<String> {
        match &self.state {
            GeneratorState::Idle => None,
            GeneratorState::Active { completion, .. } => {
                Some(completion.lock().unwrap().clone())
            }
        }
    }

    /// Whether a generation is currently in flight.
    pub fn has_active_generation(&self) -> bool {
        matches!(self.state, GeneratorState::Active { .. })
    }
}

impl Default for ReuseCoordinator {
    /// Coordinator whose error sink logs through `tracing`.
    fn default() -> Self {
        Self::new(Arc::new(|err| {
            tracing::warn!(error = %err, "completion stream failed");
        }))
    }
}

impl Drop for ReuseCoordinator {
    fn drop(&mut self) {
        // The session is going away; stop the in-flight generation instead of
        // letting the drain run against a stream nobody can reuse.
        if let GeneratorState::Active { generator, .. } = &self.state {
            generator.cancel();
        }
    }
}

/// The shaped output of one `get_generator` call.
///
/// Yields the generation's chunks with the already-typed overlap stripped
/// from the front and, for single-line requests, stops at the first newline.
/// Stopping - for any reason - leaves the underlying generation running and
/// reusable by the next request.
pub struct CompletionStream {
    reader: TeeReader<String>,
    /// Portion of the request prefix beyond the generation's starting prefix,
    /// still to be matched off against incoming chunks.
    already_typed: String,
    multiline: bool,
    done: bool,
}

impl CompletionStream {
    fn new(reader: TeeReader<String>, already_typed: String, multiline: bool) -> Self {
        Self {
            reader,
            already_typed,
            multiline,
            done: false,
        }
    }

    /// Await the next shaped chunk, or `None` when this call's output is over.
    pub async fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        while let Some(chunk) = self.reader.next().await {
            let chunk = strip_already_typed(&mut self.already_typed, &chunk);

            let chunk = if self.multiline {
                chunk
            } else if let Some(newline) = chunk.find('\n') {
                // First line only. The generator keeps running; only the
                // coordinator's reuse logic ever cancels it.
                self.done = true;
                chunk[..newline].to_string()
            } else {
                chunk
            };

            if !chunk.is_empty() {
                #[cfg(feature = "telemetry")]
                GLOBAL_METRICS.chunks.record_delivered();
                return Some(chunk);
            }
            if self.done {
                return None;
            }
            // Fully consumed by stripping: no output, but not end-of-stream.
        }
        self.done = true;
        None
    }

    /// Drain the rest of this call's output into a vector.
    pub async fn collect(mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next().await {
            out.push(chunk);
        }
        out
    }
}

/// Strip the overlap between `already_typed` and the front of `chunk`,
/// character by character, and return what remains of the chunk.
///
/// Stops at the first mismatch, leaving the rest of `already_typed` in place
/// and the rest of the chunk intact: the reuse predicate has already
/// guaranteed the match, so a divergence here means the generation's text
/// disagrees with what the user literally typed and the chunk is passed
/// through as-is from that point.
fn strip_already_typed(already_typed: &mut String, chunk: &str) -> String {
    if already_typed.is_empty() {
        return chunk.to_string();
    }

    let mut typed_at = 0;
    let mut chunk_at = 0;
    while typed_at < already_typed.len() && chunk_at < chunk.len() {
        match (
            already_typed[typed_at..].chars().next(),
            chunk[chunk_at..].chars().next(),
        ) {
            (Some(typed), Some(incoming)) if typed == incoming => {
                typed_at += typed.len_utf8();
                chunk_at += incoming.len_utf8();
            }
            _ => break,
        }
    }

    already_typed.drain(..typed_at);
    chunk[chunk_at..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(parts: &[&str]) -> ChunkStream {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(part.to_string()))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    #[test]
    fn test_strip_exact_overlap() {
        let mut typed = "llo".to_string();
        assert_eq!(strip_already_typed(&mut typed, "llo world"), " world");
        assert!(typed.is_empty());
    }

    #[test]
    fn test_strip_spans_chunks() {
        let mut typed = "hello".to_string();
        assert_eq!(strip_already_typed(&mut typed, "hel"), "");
        assert_eq!(typed, "lo");
        assert_eq!(strip_already_typed(&mut typed, "lo!"), "!");
        assert!(typed.is_empty());
    }

    #[test]
    fn test_strip_stops_at_mismatch() {
        let mut typed = "abc".to_string();
        // 'a' matches, 'b' vs 'x' does not: the rest passes through.
        assert_eq!(strip_already_typed(&mut typed, "axyz"), "xyz");
        assert_eq!(typed, "bc");
    }

    #[test]
    fn test_strip_multibyte() {
        let mut typed = "héllo".to_string();
        assert_eq!(strip_already_typed(&mut typed, "héllo!"), "!");
        assert!(typed.is_empty());
    }

    #[test]
    fn test_strip_nothing_typed() {
        let mut typed = String::new();
        assert_eq!(strip_already_typed(&mut typed, "chunk"), "chunk");
    }

    #[tokio::test]
    async fn test_reuse_continuation() {
        let mut coordinator = ReuseCoordinator::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let first = coordinator.get_generator(
            "he",
            move |_cancel| {
                counter.fetch_add(1, Ordering::SeqCst);
                chunks(&["llo ", "world"])
            },
            true,
        );
        assert_eq!(first.collect().await, vec!["llo ", "world"]);
        assert_eq!(coordinator.pending_completion().as_deref(), Some("llo world"));

        // The user typed what the model was generating; continue from it.
        assert!(coordinator.would_reuse("hello "));
        let counter = Arc::clone(&calls);
        let second = coordinator.get_generator(
            "hello ",
            move |_cancel| {
                counter.fetch_add(1, Ordering::SeqCst);
                chunks(&["unused"])
            },
            true,
        );
        assert_eq!(second.collect().await, vec!["world"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backspace_never_reuses() {
        let mut coordinator = ReuseCoordinator::default();
        let first = coordinator.get_generator("hello world", |_| chunks(&["!"]), true);
        first.collect().await;

        // "hello worl" is a literal prefix of everything produced, but it is
        // shorter than the starting prefix: deletion forces a fresh start.
        assert!(!coordinator.would_reuse("hello worl"));
    }

    #[tokio::test]
    async fn test_single_line_stops_at_newline() {
        let mut coordinator = ReuseCoordinator::default();
        let stream =
            coordinator.get_generator("x", |_| chunks(&["first line\n", "second line"]), false);
        assert_eq!(stream.collect().await, vec!["first line"]);
    }

    #[tokio::test]
    async fn test_multiline_passes_newlines_through() {
        let mut coordinator = ReuseCoordinator::default();
        let stream =
            coordinator.get_generator("x", |_| chunks(&["first line\n", "second line"]), true);
        assert_eq!(stream.collect().await, vec!["first line\n", "second line"]);
    }
}
