//! Per-stream configuration.
//!
//! All tunables are gathered in one immutable [`OutputStreamConfig`] passed
//! at stream construction. Nothing here changes after
//! [`OutputStream::start`](crate::stream::OutputStream::start).

/// When a frame's first packet is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentMode {
    /// Target PTP frame boundaries: transmission of frame N starts at
    /// `alignment_point(N) + TRO + scheduling_offset_ns`. Multiple senders
    /// sharing a PTP clock stay phase-aligned ("genlock-free" interop).
    AlignmentPoint,
    /// Target `last_send_start + frame_interval`: the stream free-runs
    /// relative to its own previous frame instead of a shared grid.
    FrameCreation,
}

/// Whether producers block when the pool has no free frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLockingMode {
    /// Reservation is best-effort; a full pool returns an error the caller
    /// is expected to tolerate (the frame is dropped at capture).
    FreeRun,
    /// Reservation blocks on a condition variable until a frame frees up or
    /// the stream stops.
    BlockOnReservation,
}

/// Immutable per-stream option set.
///
/// Defaults follow the values the scheduler was tuned with; they are safe
/// for a 1080p60 stream on a PTP-disciplined host. Time quantities are
/// nanoseconds throughout.
#[derive(Debug, Clone)]
pub struct OutputStreamConfig {
    /// Scheduling policy for frame starts.
    pub alignment: AlignmentMode,
    /// Producer blocking policy.
    pub frame_locking: FrameLockingMode,
    /// Number of pooled frame buffers.
    pub buffer_count: usize,
    /// Re-send the current frame when no new frame is ready at the deadline.
    pub continuous_output: bool,
    /// Try GPU memory first when allocating frame buffers.
    pub use_gpu_memory: bool,
    /// Stage frame data through an intermediate transmission buffer, copied
    /// in slices ahead of the deadline. Required for GPU-resident frames.
    pub use_intermediate_buffer: bool,
    /// Video rows batched into one provider chunk.
    pub lines_per_chunk: usize,
    /// Allow packets whose payload spans two rows (two SRDs per packet).
    /// When disabled, stream creation fails if no evenly-dividing payload
    /// size exists.
    pub multi_srd: bool,
    /// Use the largest per-format fallback payload instead of the standard
    /// one when the payload search fails.
    pub maximize_packet_size: bool,
    /// Precompute static header bytes for every packet slot at stream
    /// initialization, leaving only sequence/timestamp writes on the hot
    /// path.
    pub prefill_headers: bool,
    /// How long before the schedule time the worker wakes to fill and commit
    /// chunks.
    pub wakeup_offset_ns: u64,
    /// User offset added to every schedule time (after TRO).
    pub scheduling_offset_ns: i64,
    /// If the schedule time is closer than this to "now" at first commit,
    /// commit immediately (timestamp 0) so the provider never sees a past
    /// timestamp.
    pub force_immediate_threshold_ns: u64,
    /// Replace the computed ST 2110-21 TRO with a fixed value.
    pub tro_override_ns: Option<u64>,
    /// Detect chunks that would miss their wire deadline and resynchronize
    /// on the next interval.
    pub timing_protection: bool,
    /// A chunk closer than this to its expected wire time is considered
    /// late.
    pub timing_cutoff_ns: u64,
    /// Sample actual wire-completion timestamps against predictions
    /// (diagnostic, extra provider polling per frame).
    pub completion_tracking: bool,
    /// Fraction of the frame interval before the deadline within which an
    /// early staged copy may start.
    pub early_copy_fraction: f64,
}

impl Default for OutputStreamConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentMode::AlignmentPoint,
            frame_locking: FrameLockingMode::FreeRun,
            buffer_count: 2,
            continuous_output: true,
            use_gpu_memory: false,
            use_intermediate_buffer: false,
            lines_per_chunk: 4,
            multi_srd: true,
            maximize_packet_size: false,
            prefill_headers: true,
            wakeup_offset_ns: 1_000_000,
            scheduling_offset_ns: 0,
            force_immediate_threshold_ns: 300_000,
            tro_override_ns: None,
            timing_protection: true,
            timing_cutoff_ns: 100_000,
            completion_tracking: false,
            early_copy_fraction: 0.5,
        }
    }
}

impl OutputStreamConfig {
    /// Validate option combinations that cannot work together.
    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer_count == 0 {
            return Err(crate::St2110Error::Config(
                "buffer_count must be at least 1".into(),
            ));
        }
        if self.lines_per_chunk == 0 {
            return Err(crate::St2110Error::Config(
                "lines_per_chunk must be at least 1".into(),
            ));
        }
        if self.use_gpu_memory && !self.use_intermediate_buffer {
            return Err(crate::St2110Error::Config(
                "GPU frame memory requires the intermediate buffer".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.early_copy_fraction) {
            return Err(crate::St2110Error::Config(
                "early_copy_fraction must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
