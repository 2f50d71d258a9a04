//! Ancillary packetization policy (ST 2110-40).
//!
//! One packet per frame interval: RTP header, ANC payload header, and a
//! single SMPTE timecode data packet derived from the frame's alignment
//! index. No SRD splitting, no frame pixel data — the payload is generated
//! from the interval's timecode, so repeats naturally carry fresh labels.

use crate::frame::SendingFrame;
use crate::layout::StreamMemory;
use crate::protocol::{
    AncPayloadHeader, AncTimecodePacket, RtpHeader, ANC_DATA_PACKET_SIZE, RTP_HEADER_SIZE,
};
use crate::provider::{ChunkMut, PacketLengths};

use super::FramePacketizer;

pub(crate) struct AncillaryPacketizer {
    memory: StreamMemory,
    payload_type: u8,
    ssrc: u32,
}

impl AncillaryPacketizer {
    pub fn new(memory: StreamMemory, payload_type: u8, ssrc: u32) -> Self {
        Self {
            memory,
            payload_type,
            ssrc,
        }
    }
}

impl FramePacketizer for AncillaryPacketizer {
    fn memory(&self) -> &StreamMemory {
        &self.memory
    }

    fn begin_frame(&mut self, _frame: &mut SendingFrame) {}

    fn stage(&mut self, _frame: &mut SendingFrame, _target_bytes: usize) {}

    fn fill_chunk(
        &mut self,
        frame: &mut SendingFrame,
        chunk: &mut ChunkMut<'_>,
        chunk_index: usize,
        sequence: &mut u32,
    ) -> usize {
        debug_assert_eq!(chunk_index, 0, "ancillary frames are a single chunk");

        let rtp = RtpHeader {
            // The only packet of the frame is also its last.
            marker: true,
            payload_type: self.payload_type,
            sequence: *sequence,
            timestamp: frame.timestamp,
            ssrc: self.ssrc,
        };
        let header = chunk.header_mut(0);
        rtp.encode(header);
        AncPayloadHeader {
            length: ANC_DATA_PACKET_SIZE as u16,
            anc_count: 1,
            field: 0,
        }
        .encode(&mut header[RTP_HEADER_SIZE..]);

        AncTimecodePacket::new(frame.timecode).encode(chunk.payload_mut(0));

        chunk.lengths[0] = PacketLengths {
            header: self.memory.header_size as u16,
            payload: ANC_DATA_PACKET_SIZE as u16,
        };
        frame.cursor.packet_index = 1;
        *sequence = sequence.wrapping_add(1);
        1
    }
}
