// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Generation module - streaming-generator reuse for inline autocomplete.
//!
//! Two tightly coupled pieces:
//!
//! - [`BroadcastGenerator`] turns a single-consumer chunk stream into a
//!   multi-consumer, replayable, cancellable broadcast: one background drain,
//!   an append-only buffer, any number of [`TeeReader`]s that replay from the
//!   start and follow live.
//! - [`ReuseCoordinator`] decides, per autocomplete request, whether the
//!   in-flight generation is a valid continuation of the new prefix. Reuse
//!   replays the generation with the already-typed overlap stripped; anything
//!   else cancels it and starts fresh. Single-line requests are cut at the
//!   first newline without disturbing the generation.
//!
//! Control flow:
//!
//! ```text
//! caller -> ReuseCoordinator::get_generator(prefix, factory, multiline)
//!        -> [ reuse: BroadcastGenerator::tee | fresh: factory() + new generator ]
//!        -> strip already-typed prefix -> optional newline cut -> chunks
//! ```

mod broadcast;
mod reuse;

pub use broadcast::{BroadcastGenerator, TeeReader};
pub use reuse::{CompletionStream, ReuseCoordinator};
