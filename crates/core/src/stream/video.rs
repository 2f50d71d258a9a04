//! Video packetization policy (ST 2110-20).
//!
//! Fills each chunk's packets with pixel data and RTP+SRD headers, walking
//! a row cursor across the frame. Two optimizations from the hot path of
//! the reference pipeline are kept:
//!
//! - **Header prefill**: all static header bytes (payload type, SSRC,
//!   marker, both SRDs) are precomputed per packet slot at stream creation;
//!   per packet only the sequence number and timestamp are patched in.
//!   Interlaced streams skip prefill — their SRD field bit changes per
//!   field.
//! - **Staged copy**: with the intermediate buffer enabled, frame bytes are
//!   staged out of (possibly device-resident) frame memory in bounded
//!   slices ahead of packetization, so no single memcopy spans a whole
//!   frame.

use crate::config::OutputStreamConfig;
use crate::format::{Scan, VideoFormat};
use crate::frame::{PacketCursor, SendingFrame};
use crate::layout::StreamMemory;
use crate::protocol::{RtpHeader, SrdHeader, VideoHeader};
use crate::provider::{ChunkMut, PacketLengths};

use super::FramePacketizer;

struct Prefill {
    /// Encoded headers, one `header_size` slot per packet of the frame.
    bytes: Vec<u8>,
    /// Actual header length per packet (20 or 26).
    sizes: Vec<u16>,
}

pub(crate) struct VideoPacketizer {
    memory: StreamMemory,
    payload_type: u8,
    ssrc: u32,
    interlaced: bool,
    field_bit: bool,
    pgroup_bytes: usize,
    pgroup_pixels: usize,
    intermediate: Option<Vec<u8>>,
    prefill: Option<Prefill>,
    srd_overflow_logged: bool,
}

impl VideoPacketizer {
    pub fn new(
        format: &VideoFormat,
        memory: StreamMemory,
        config: &OutputStreamConfig,
        payload_type: u8,
        ssrc: u32,
    ) -> Self {
        let interlaced = format.scan == Scan::Interlaced;
        let mut packetizer = Self {
            intermediate: config
                .use_intermediate_buffer
                .then(|| vec![0u8; memory.frame_size]),
            memory,
            payload_type,
            ssrc,
            interlaced,
            field_bit: false,
            pgroup_bytes: format.pixel_format.pgroup_bytes(),
            pgroup_pixels: format.pixel_format.pgroup_pixels(),
            prefill: None,
            srd_overflow_logged: false,
        };
        if config.prefill_headers {
            if interlaced {
                tracing::debug!("header prefill skipped: interlaced field bit varies per frame");
            } else {
                packetizer.build_prefill();
            }
        }
        packetizer
    }

    /// Pixel offset of a byte offset within a row, in pixel-group steps.
    fn pixel_offset(&self, row_offset: usize) -> u16 {
        (row_offset / self.pgroup_bytes * self.pgroup_pixels) as u16
    }

    /// The one or two SRDs describing a packet starting at `cursor`.
    fn srds_at(&mut self, cursor: &PacketCursor, payload_len: usize) -> (SrdHeader, Option<SrdHeader>) {
        let row_size = self.memory.row_size;
        let in_row = row_size - cursor.row_offset;
        let srd1_len = payload_len.min(in_row);
        let srd1 = SrdHeader {
            length: srd1_len as u16,
            field: self.field_bit,
            row: cursor.row as u16,
            continuation: false,
            offset: self.pixel_offset(cursor.row_offset),
        };
        let rest = payload_len - srd1_len;
        let srd2 = (rest > 0).then(|| {
            let mut length = rest;
            if length > row_size {
                // Would need a third SRD; the wire format cannot express it.
                if !self.srd_overflow_logged {
                    tracing::error!(
                        payload_len,
                        row_size,
                        "payload spans more than two rows; SRD description truncated"
                    );
                    self.srd_overflow_logged = true;
                }
                length = row_size;
            }
            SrdHeader {
                length: length as u16,
                field: self.field_bit,
                row: (cursor.row + 1) as u16,
                continuation: false,
                offset: 0,
            }
        });
        (srd1, srd2)
    }

    /// Precompute every packet's static header bytes (sequence number and
    /// timestamp zeroed, patched on the hot path).
    fn build_prefill(&mut self) {
        let header_size = self.memory.header_size;
        let packets = self.memory.packets_per_frame;
        let mut bytes = vec![0u8; packets * header_size];
        let mut sizes = vec![0u16; packets];
        let mut cursor = PacketCursor::default();
        for packet_index in 0..packets {
            let payload_len = self.memory.payload_bytes_of_packet(packet_index);
            let (srd1, srd2) = self.srds_at(&cursor, payload_len);
            let header = VideoHeader {
                rtp: RtpHeader {
                    marker: packet_index + 1 == packets,
                    payload_type: self.payload_type,
                    sequence: 0,
                    timestamp: 0,
                    ssrc: self.ssrc,
                },
                srd1,
                srd2,
            };
            let slot = &mut bytes[packet_index * header_size..(packet_index + 1) * header_size];
            sizes[packet_index] = header.encode(slot) as u16;
            advance_cursor(&mut cursor, payload_len, self.memory.row_size);
        }
        tracing::debug!(packets, "packet headers prefilled");
        self.prefill = Some(Prefill { bytes, sizes });
    }
}

impl FramePacketizer for VideoPacketizer {
    fn memory(&self) -> &StreamMemory {
        &self.memory
    }

    fn begin_frame(&mut self, frame: &mut SendingFrame) {
        debug_assert_eq!(frame.cursor, PacketCursor::default());
        if self.interlaced {
            // Producers push fields in order; parity selects the field bit.
            self.field_bit = frame.counter % 2 == 1;
        }
    }

    fn stage(&mut self, frame: &mut SendingFrame, target_bytes: usize) {
        let Some(intermediate) = &mut self.intermediate else {
            return;
        };
        let target = target_bytes.min(self.memory.frame_size);
        if target > frame.staged_bytes {
            frame
                .buffer
                .read_at(frame.staged_bytes, &mut intermediate[frame.staged_bytes..target]);
            frame.staged_bytes = target;
        }
    }

    fn fill_chunk(
        &mut self,
        frame: &mut SendingFrame,
        chunk: &mut ChunkMut<'_>,
        chunk_index: usize,
        sequence: &mut u32,
    ) -> usize {
        let packets = self.memory.packets_in_chunk(chunk_index);
        let first_packet = chunk_index * self.memory.packets_per_chunk;

        // Make sure the bytes this chunk covers are staged.
        let chunk_end =
            ((first_packet + packets) * self.memory.payload_size).min(self.memory.frame_size);
        self.stage(frame, chunk_end);

        for slot in 0..packets {
            let packet_index = frame.cursor.packet_index;
            debug_assert_eq!(packet_index, first_packet + slot);
            let payload_len = self.memory.payload_bytes_of_packet(packet_index);
            let src = packet_index * self.memory.payload_size;

            {
                let payload = chunk.payload_mut(slot);
                if let Some(intermediate) = &self.intermediate {
                    payload[..payload_len].copy_from_slice(&intermediate[src..src + payload_len]);
                } else {
                    frame.buffer.read_at(src, &mut payload[..payload_len]);
                }
            }

            let header_len = if let Some(prefill) = &self.prefill {
                let hs = self.memory.header_size;
                let template = &prefill.bytes[packet_index * hs..(packet_index + 1) * hs];
                let header = chunk.header_mut(slot);
                header[..hs].copy_from_slice(template);
                header[2..4].copy_from_slice(&(*sequence as u16).to_be_bytes());
                header[4..8].copy_from_slice(&frame.timestamp.to_be_bytes());
                header[12..14].copy_from_slice(&((*sequence >> 16) as u16).to_be_bytes());
                prefill.sizes[packet_index] as usize
            } else {
                let marker = packet_index + 1 == self.memory.packets_per_frame;
                let (srd1, srd2) = self.srds_at(&frame.cursor, payload_len);
                let header = VideoHeader {
                    rtp: RtpHeader {
                        marker,
                        payload_type: self.payload_type,
                        sequence: *sequence,
                        timestamp: frame.timestamp,
                        ssrc: self.ssrc,
                    },
                    srd1,
                    srd2,
                };
                header.encode(chunk.header_mut(slot))
            };

            chunk.lengths[slot] = PacketLengths {
                header: header_len as u16,
                payload: payload_len as u16,
            };
            advance_cursor(&mut frame.cursor, payload_len, self.memory.row_size);
            *sequence = sequence.wrapping_add(1);
        }
        packets
    }
}

/// Move the cursor past `payload_len` bytes, crossing row boundaries.
fn advance_cursor(cursor: &mut PacketCursor, payload_len: usize, row_size: usize) {
    cursor.row_offset += payload_len;
    while cursor.row_offset >= row_size {
        cursor.row_offset -= row_size;
        cursor.row += 1;
    }
    cursor.packet_index += 1;
}
