//! Packetization geometry.
//!
//! [`StreamMemory`] is computed once at stream creation from the video
//! format and never changes: payload size, packets per line/chunk/frame,
//! chunk count. The payload-size search prefers a size that divides every
//! row evenly (exactly one SRD per packet); when no such size exists the
//! stream falls back to a fixed per-format payload and packets may straddle
//! two rows (multi-SRD mode).

use crate::format::{PixelFormat, VideoFormat};
use crate::protocol::{
    ANC_DATA_PACKET_SIZE, ANC_PAYLOAD_HEADER_SIZE, RTP_HEADER_SIZE, VIDEO_HEADER_SIZE_SINGLE,
    VIDEO_HEADER_SIZE_TWIN,
};
use crate::{Result, St2110Error};

/// Smallest payload the search will accept. Tiny payloads explode the
/// packet rate without helping pacing.
pub const MIN_PAYLOAD_SIZE: usize = 600;

/// Largest payload: a 1500-byte MTU minus IP/UDP overhead and the 26-byte
/// worst-case RTP+SRD header.
pub const MAX_PAYLOAD_SIZE: usize = 1398;

/// Fallback payload target when the search fails and packet size is not
/// maximized.
pub const STANDARD_PAYLOAD_SIZE: usize = 1200;

/// Find a payload size that divides `row_bytes` into equal packets.
///
/// Searches increasing divisor counts starting at
/// `row_bytes / MAX_PAYLOAD_SIZE`, returning the first payload `P` with
/// `MIN_PAYLOAD_SIZE <= P <= MAX_PAYLOAD_SIZE`, `row_bytes % P == 0` and
/// `P % pgroup_bytes == 0`. Returns `None` when no divisor qualifies.
pub fn find_payload_size(row_bytes: usize, pgroup_bytes: usize) -> Option<usize> {
    if row_bytes == 0 || pgroup_bytes == 0 {
        return None;
    }
    let mut divisor = (row_bytes / MAX_PAYLOAD_SIZE).max(1);
    loop {
        let payload = row_bytes / divisor;
        if payload < MIN_PAYLOAD_SIZE {
            return None;
        }
        if payload <= MAX_PAYLOAD_SIZE
            && row_bytes % divisor == 0
            && payload % pgroup_bytes == 0
        {
            return Some(payload);
        }
        divisor += 1;
    }
}

/// Fixed fallback payload for a pixel format: the target size rounded down
/// to a whole number of pixel groups.
pub fn fallback_payload_size(pixel_format: PixelFormat, maximize: bool) -> usize {
    let target = if maximize {
        MAX_PAYLOAD_SIZE
    } else {
        STANDARD_PAYLOAD_SIZE
    };
    let pg = pixel_format.pgroup_bytes();
    target / pg * pg
}

/// Options that shape the geometry, lifted from the stream configuration.
#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions {
    /// Video rows per provider chunk.
    pub lines_per_chunk: usize,
    /// Permit packets that straddle two rows.
    pub multi_srd: bool,
    /// Use the maximized fallback payload.
    pub maximize_packet_size: bool,
}

/// Immutable per-session packetization geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMemory {
    /// RTP payload bytes per full packet.
    pub payload_size: usize,
    /// Wire header bytes reserved per packet (20 single-SRD, 26 multi).
    pub header_size: usize,
    /// Packets per row in single-SRD mode; 0 in multi-SRD mode.
    pub packets_per_line: usize,
    /// Whether packets may straddle rows.
    pub multi_srd: bool,
    /// Rows batched per chunk.
    pub lines_per_chunk: usize,
    /// Packets in a full chunk.
    pub packets_per_chunk: usize,
    /// Chunks per frame.
    pub chunks_per_frame: usize,
    /// Total packets per frame.
    pub packets_per_frame: usize,
    /// Bytes in one active row.
    pub row_size: usize,
    /// Bytes in one frame.
    pub frame_size: usize,
}

impl StreamMemory {
    /// Compute the geometry for a video stream.
    pub fn for_video(format: &VideoFormat, opts: &LayoutOptions) -> Result<Self> {
        let row_size = format.row_bytes()?;
        let frame_size = format.frame_bytes()?;
        let pg = format.pixel_format.pgroup_bytes();

        if let Some(payload_size) = find_payload_size(row_size, pg) {
            let packets_per_line = row_size / payload_size;
            let lines_per_chunk = opts.lines_per_chunk.min(format.height);
            let chunks_per_frame = format.height.div_ceil(lines_per_chunk);
            let memory = Self {
                payload_size,
                header_size: VIDEO_HEADER_SIZE_SINGLE,
                packets_per_line,
                multi_srd: false,
                lines_per_chunk,
                packets_per_chunk: packets_per_line * lines_per_chunk,
                chunks_per_frame,
                packets_per_frame: packets_per_line * format.height,
                row_size,
                frame_size,
            };
            tracing::debug!(
                payload_size,
                packets_per_line,
                chunks_per_frame,
                "single-SRD geometry"
            );
            return Ok(memory);
        }

        if !opts.multi_srd {
            return Err(St2110Error::Config(format!(
                "no payload size in [{MIN_PAYLOAD_SIZE}, {MAX_PAYLOAD_SIZE}] divides a \
                 {row_size}-byte row and multi-SRD packets are disabled"
            )));
        }

        let payload_size = fallback_payload_size(format.pixel_format, opts.maximize_packet_size);
        let packets_per_frame = frame_size.div_ceil(payload_size);
        let lines_per_chunk = opts.lines_per_chunk.min(format.height);
        let chunks_per_frame = format.height.div_ceil(lines_per_chunk);
        let memory = Self {
            payload_size,
            header_size: VIDEO_HEADER_SIZE_TWIN,
            packets_per_line: 0,
            multi_srd: true,
            lines_per_chunk,
            packets_per_chunk: packets_per_frame.div_ceil(chunks_per_frame),
            chunks_per_frame,
            packets_per_frame,
            row_size,
            frame_size,
        };
        tracing::debug!(
            payload_size,
            packets_per_frame,
            chunks_per_frame,
            "multi-SRD fallback geometry"
        );
        Ok(memory)
    }

    /// Geometry of an ancillary (timecode) stream: one packet, one chunk.
    pub fn for_ancillary() -> Self {
        Self {
            payload_size: ANC_DATA_PACKET_SIZE,
            header_size: RTP_HEADER_SIZE + ANC_PAYLOAD_HEADER_SIZE,
            packets_per_line: 0,
            multi_srd: false,
            lines_per_chunk: 1,
            packets_per_chunk: 1,
            chunks_per_frame: 1,
            packets_per_frame: 1,
            row_size: ANC_DATA_PACKET_SIZE,
            frame_size: ANC_DATA_PACKET_SIZE,
        }
    }

    /// Packets in chunk `index`; the last chunk of a frame may be short.
    pub fn packets_in_chunk(&self, index: usize) -> usize {
        debug_assert!(index < self.chunks_per_frame);
        let sent = index * self.packets_per_chunk;
        self.packets_per_chunk.min(self.packets_per_frame - sent)
    }

    /// Payload bytes of packet `index`; only the frame's final packet in
    /// multi-SRD mode can be short.
    pub fn payload_bytes_of_packet(&self, index: usize) -> usize {
        debug_assert!(index < self.packets_per_frame);
        let offset = index * self.payload_size;
        self.payload_size.min(self.frame_size - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FrameRate, Scan};
    use proptest::prelude::*;

    fn format_1080p60_rgb8() -> VideoFormat {
        VideoFormat {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Rgb8,
            frame_rate: FrameRate { num: 60, den: 1 },
            scan: Scan::Progressive,
        }
    }

    fn default_opts() -> LayoutOptions {
        LayoutOptions {
            lines_per_chunk: 4,
            multi_srd: true,
            maximize_packet_size: false,
        }
    }

    // --- payload search ---

    #[test]
    fn search_1080p_rgb8() {
        // 5760-byte rows: 5760/4=1440 too big, 5760/5=1152 fits.
        let p = find_payload_size(5760, 3).unwrap();
        assert_eq!(p, 1152);
    }

    #[test]
    fn search_respects_pgroup_multiple() {
        // 4800-byte rows of 5-byte groups (1080 YUV 4:2:2 10-bit):
        // 4800/4 = 1200, multiple of 5.
        assert_eq!(find_payload_size(4800, 5), Some(1200));
    }

    #[test]
    fn search_fails_below_minimum() {
        // A prime-ish row length with no divisor in range.
        assert_eq!(find_payload_size(1399, 1), None);
    }

    #[test]
    fn search_zero_inputs() {
        assert_eq!(find_payload_size(0, 3), None);
        assert_eq!(find_payload_size(5760, 0), None);
    }

    proptest! {
        #[test]
        fn search_result_always_valid(
            groups_per_row in 1usize..4096,
            pg in prop_oneof![Just(3usize), Just(4), Just(5), Just(9), Just(15)],
        ) {
            let row = groups_per_row * pg;
            if let Some(p) = find_payload_size(row, pg) {
                prop_assert!(p >= MIN_PAYLOAD_SIZE);
                prop_assert!(p <= MAX_PAYLOAD_SIZE);
                prop_assert_eq!(row % p, 0);
                prop_assert_eq!(p % pg, 0);
            }
        }
    }

    // --- geometry ---

    #[test]
    fn geometry_1080p60_rgb8() {
        let mem = StreamMemory::for_video(&format_1080p60_rgb8(), &default_opts()).unwrap();
        assert!(!mem.multi_srd);
        assert_eq!(mem.payload_size, 1152);
        assert_eq!(mem.packets_per_line, 5);
        assert_eq!(mem.packets_per_frame, 5 * 1080);
        assert_eq!(mem.chunks_per_frame, 270);
        assert_eq!(mem.packets_per_chunk, 20);
        assert_eq!(mem.header_size, VIDEO_HEADER_SIZE_SINGLE);
        assert_eq!(mem.frame_size, 5760 * 1080);
    }

    #[test]
    fn geometry_multi_srd_fallback() {
        // 1366 px × 3 B = 4098-byte rows: 4098 = 2·3·683, no divisor yields
        // a payload within range, so the stream falls back to multi-SRD.
        let format = VideoFormat {
            width: 1366,
            height: 768,
            pixel_format: PixelFormat::Rgb8,
            frame_rate: FrameRate { num: 30, den: 1 },
            scan: Scan::Progressive,
        };
        let mem = StreamMemory::for_video(&format, &default_opts()).unwrap();
        assert!(mem.multi_srd);
        assert_eq!(mem.payload_size, STANDARD_PAYLOAD_SIZE);
        assert_eq!(mem.header_size, VIDEO_HEADER_SIZE_TWIN);
        assert_eq!(
            mem.packets_per_frame,
            (4098usize * 768).div_ceil(STANDARD_PAYLOAD_SIZE)
        );
    }

    #[test]
    fn multi_srd_disabled_fails_creation() {
        let format = VideoFormat {
            width: 1366,
            height: 768,
            pixel_format: PixelFormat::Rgb8,
            frame_rate: FrameRate { num: 30, den: 1 },
            scan: Scan::Progressive,
        };
        let opts = LayoutOptions {
            multi_srd: false,
            ..default_opts()
        };
        assert!(StreamMemory::for_video(&format, &opts).is_err());
    }

    #[test]
    fn maximized_fallback_is_pgroup_aligned() {
        let p = fallback_payload_size(PixelFormat::Rgb10, true);
        assert_eq!(p, 1395); // 1398 rounded down to a 15-byte group
        assert_eq!(p % 15, 0);
    }

    #[test]
    fn short_last_chunk() {
        // 1080 lines / 4 per chunk = 270 full chunks; with 7 lines per
        // chunk, 154 chunks and the last holds 2 lines (10 packets).
        let mut opts = default_opts();
        opts.lines_per_chunk = 7;
        let mem = StreamMemory::for_video(&format_1080p60_rgb8(), &opts).unwrap();
        assert_eq!(mem.chunks_per_frame, 155);
        assert_eq!(mem.packets_in_chunk(0), 35);
        assert_eq!(mem.packets_in_chunk(154), 5 * 1080 - 154 * 35);
    }

    #[test]
    fn final_packet_full_in_single_srd_mode() {
        let mem = StreamMemory::for_video(&format_1080p60_rgb8(), &default_opts()).unwrap();
        assert_eq!(mem.payload_bytes_of_packet(mem.packets_per_frame - 1), 1152);
    }

    #[test]
    fn ancillary_geometry_is_single_packet() {
        let mem = StreamMemory::for_ancillary();
        assert_eq!(mem.packets_per_frame, 1);
        assert_eq!(mem.chunks_per_frame, 1);
        assert_eq!(mem.packets_in_chunk(0), 1);
    }
}
