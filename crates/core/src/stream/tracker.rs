//! Chunk completion tracking (diagnostic).
//!
//! Samples actual wire-completion timestamps against predictions. Chunks
//! are registered in commit order; the provider must report completions in
//! the same order — an out-of-order token means the provider's ring or the
//! scheduler's chunk accounting is corrupt, which is fatal. Everything else
//! here only logs. Disabled by default; not on the correctness path.

use std::collections::VecDeque;

use crate::provider::ChunkProvider;
use crate::{Result, St2110Error};

/// Completion margin: a chunk may finish this much later than its expected
/// delta without a warning (10%).
const MARGIN_NUM: u64 = 1;
const MARGIN_DEN: u64 = 10;

#[derive(Debug, Clone, Copy)]
struct TrackedChunk {
    token: u64,
    scheduled_ns: u64,
    expected_completion_ns: u64,
    chunk_index: usize,
}

/// Registers commits and reconciles them with provider completion records.
pub(crate) struct CompletionTracker {
    pending: VecDeque<TrackedChunk>,
    next_token: u64,
    /// Pending depth beyond which the provider is clearly not keeping up.
    backlog_watermark: usize,
}

impl CompletionTracker {
    pub fn new(chunks_per_frame: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            next_token: 0,
            backlog_watermark: (chunks_per_frame * 4).max(8),
        }
    }

    /// Register interest in the next committed chunk. Returns the token to
    /// pass to [`ChunkProvider::mark_for_tracking`].
    pub fn register(&mut self, scheduled_ns: u64, expected_delta_ns: u64, chunk_index: usize) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.pending.push_back(TrackedChunk {
            token,
            scheduled_ns,
            expected_completion_ns: scheduled_ns
                + expected_delta_ns
                + expected_delta_ns * MARGIN_NUM / MARGIN_DEN,
            chunk_index,
        });
        token
    }

    /// Drain available completion records, verify ordering, log deltas.
    ///
    /// Called once per frame before the next send begins. Records that have
    /// not arrived yet stay pending; a growing backlog is logged.
    pub fn poll_and_report(&mut self, provider: &mut dyn ChunkProvider) -> Result<()> {
        while let Some(completion) = provider.poll_completion() {
            let Some(expected) = self.pending.pop_front() else {
                tracing::warn!(token = completion.token, "completion for untracked chunk");
                continue;
            };
            if completion.token != expected.token {
                return Err(St2110Error::OutOfOrderCompletion {
                    expected: expected.token,
                    actual: completion.token,
                });
            }
            let late_ns = completion
                .completed_at_ns
                .saturating_sub(expected.expected_completion_ns);
            if late_ns > 0 {
                tracing::warn!(
                    token = completion.token,
                    chunk_index = expected.chunk_index,
                    late_ns,
                    "chunk completed beyond its expected window"
                );
            } else {
                tracing::trace!(
                    token = completion.token,
                    chunk_index = expected.chunk_index,
                    scheduled_ns = expected.scheduled_ns,
                    completed_ns = completion.completed_at_ns,
                    "chunk completion on time"
                );
            }
        }
        if self.pending.len() > self.backlog_watermark {
            tracing::warn!(
                pending = self.pending.len(),
                "completion records lagging behind commits"
            );
        }
        Ok(())
    }
}
