//! Frame lifecycle types.
//!
//! One frame moves through `Free → Reserved → Ready → Sending → Free`;
//! continuous-output mode re-sends from `Sending` without passing through
//! `Free`. Each stage has exactly one owner (producer, copy engine,
//! scheduler), so the handoffs are the only cross-thread interaction with
//! frame contents. At most one frame per stream is `Sending` at any
//! instant.

pub mod manager;
pub mod pool;

use std::sync::Arc;

use crate::alloc::FrameBuffer;
use crate::timecode::Timecode;

pub use manager::FrameManager;
pub use pool::FramePool;

/// Index of a frame slot within its stream's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub(crate) usize);

/// Lifecycle stage of a pooled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// In the pool, reusable.
    Free,
    /// Claimed by a producer, not yet filled.
    Reserved,
    /// Data copied; queued for sending.
    Ready,
    /// Owned exclusively by the scheduler.
    Sending,
}

/// Packetization progress within the frame being sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCursor {
    /// Next packet index within the frame.
    pub packet_index: usize,
    /// Next chunk index within the frame.
    pub chunk_index: usize,
    /// Row the next packet starts in.
    pub row: usize,
    /// Byte offset of the next packet within that row.
    pub row_offset: usize,
}

impl PacketCursor {
    /// Rewind to the start of the frame (chunk 0, row 0).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The scheduler's exclusive view of the frame currently on the wire.
#[derive(Debug)]
pub struct SendingFrame {
    /// Pool slot this frame occupies.
    pub id: FrameId,
    /// Backing pixel (or ancillary) data.
    pub buffer: Arc<FrameBuffer>,
    /// Producer-assigned monotonic identity.
    pub counter: u64,
    /// RTP media timestamp for the current interval (90 kHz).
    pub timestamp: u32,
    /// Timecode label for the current interval.
    pub timecode: Timecode,
    /// Packetization progress.
    pub cursor: PacketCursor,
    /// Bytes staged into the intermediate buffer so far.
    pub staged_bytes: usize,
    /// A chunk of this frame missed its wire deadline.
    pub timing_issue: bool,
}

impl SendingFrame {
    /// Rewind packetization state for a repeat transmission.
    pub fn rewind(&mut self) {
        self.cursor.reset();
        self.staged_bytes = 0;
        self.timing_issue = false;
    }
}
