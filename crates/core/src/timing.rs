//! Stream timing: alignment points, transmit offset, chunk pacing.
//!
//! ST 2110-21 places the first packet of frame N at
//! `alignment_point(N) + TRO`, where alignment points form a frame-rate grid
//! on the PTP clock and TRO (Transmit Offset) absorbs the vertical blanking
//! interval. Everything here is computed once per stream; alignment points
//! are derived rationally in 128-bit arithmetic so a stream that runs for
//! days never drifts off the grid.

use crate::config::OutputStreamConfig;
use crate::format::{FrameRate, Scan};

/// 90 kHz RTP media clock rate for video and ancillary data.
pub const MEDIA_CLOCK_RATE: u64 = 90_000;

/// Per-stream timing constants.
#[derive(Debug, Clone, Copy)]
pub struct StreamTiming {
    rate: FrameRate,
    /// Frame interval in nanoseconds (rounded down; grid math uses the
    /// exact rational).
    pub frame_interval_ns: u64,
    /// Transmit offset after each alignment point.
    pub tro_ns: u64,
    /// Pacing delta between consecutive chunks of one frame.
    pub delta_ns_per_chunk: u64,
}

impl StreamTiming {
    /// Compute timing for a stream.
    ///
    /// `active_lines` and `scan` select the ST 2110-21 §6.3 TRO default,
    /// unless the configuration overrides it. `chunks_per_frame` spreads
    /// the post-TRO interval across the frame's chunks.
    pub fn new(
        rate: FrameRate,
        active_lines: usize,
        scan: Scan,
        chunks_per_frame: usize,
        config: &OutputStreamConfig,
    ) -> Self {
        let frame_interval_ns = rate.interval_ns();
        let tro_ns = config
            .tro_override_ns
            .unwrap_or_else(|| default_tro_ns(frame_interval_ns, active_lines, scan));
        let delta_ns_per_chunk =
            frame_interval_ns.saturating_sub(tro_ns) / chunks_per_frame.max(1) as u64;
        tracing::debug!(
            frame_interval_ns,
            tro_ns,
            delta_ns_per_chunk,
            "stream timing computed"
        );
        Self {
            rate,
            frame_interval_ns,
            tro_ns,
            delta_ns_per_chunk,
        }
    }

    /// The stream's frame rate.
    pub fn rate(&self) -> FrameRate {
        self.rate
    }

    /// Index of the alignment point at or before `now_ns`.
    pub fn frame_index_at(&self, now_ns: u64) -> u64 {
        (now_ns as u128 * self.rate.num as u128
            / (1_000_000_000u128 * self.rate.den as u128)) as u64
    }

    /// Wall-clock time of alignment point `index`, rounded up so that
    /// `frame_index_at(alignment_point_ns(n)) == n` for every n.
    pub fn alignment_point_ns(&self, index: u64) -> u64 {
        let num = self.rate.num as u128;
        let exact = index as u128 * 1_000_000_000u128 * self.rate.den as u128;
        (exact.div_ceil(num)) as u64
    }

    /// RTP media timestamp (90 kHz, truncated to 32 bits) of a wall-clock
    /// time.
    pub fn media_timestamp(&self, time_ns: u64) -> u32 {
        (time_ns as u128 * MEDIA_CLOCK_RATE as u128 / 1_000_000_000u128) as u32
    }
}

/// Default Transmit Offset per ST 2110-21 §6.3, as a fraction of the frame
/// interval keyed on scan mode and active line count.
fn default_tro_ns(frame_interval_ns: u64, active_lines: usize, scan: Scan) -> u64 {
    let (num, den): (u64, u64) = match scan {
        Scan::Progressive => {
            if active_lines >= 1080 {
                (43, 1125)
            } else {
                (28, 750)
            }
        }
        Scan::Interlaced => {
            if active_lines >= 1080 {
                (22, 1125)
            } else if active_lines >= 576 {
                (26, 625)
            } else {
                (20, 525)
            }
        }
    };
    frame_interval_ns * num / den
}
