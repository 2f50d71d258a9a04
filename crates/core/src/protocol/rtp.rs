//! RTP fixed header with the ST 2110 extended sequence number.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Extended Sequence Number   |   (payload header follows)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The 16-bit extended sequence number (ST 2110-10 §6.2) widens the RTP
//! sequence space to 32 bits: it carries the high half, the base header the
//! low half. At 1080p60 a stream emits several thousand packets per frame,
//! so the 16-bit space alone wraps multiple times per second.
//!
//! Version is always 2. Padding, extension, and CSRC count are always 0 on
//! the encode path; the decode path preserves whatever the sender set.

/// RTP protocol version written into every header.
pub const RTP_VERSION: u8 = 2;

/// Size of the base RTP header, without the extended sequence number.
pub const RTP_BASE_HEADER_SIZE: usize = 12;

/// Size of the base header plus the extended sequence number.
pub const RTP_HEADER_SIZE: usize = 14;

/// Host-side view of an RTP header with a 32-bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit — set on the last packet of a frame (RFC 4175 §4.1).
    pub marker: bool,
    /// RTP payload type (7-bit, dynamic range 96–127).
    pub payload_type: u8,
    /// Full 32-bit sequence number. The low 16 bits go into the base
    /// header, the high 16 bits into the extended field.
    pub sequence: u32,
    /// Media clock timestamp (90 kHz for video and ancillary data).
    pub timestamp: u32,
    /// Synchronization source identifier.
    pub ssrc: u32,
}

impl RtpHeader {
    /// Serialize into `buf[..RTP_HEADER_SIZE]`, extended sequence included.
    ///
    /// The caller guarantees sizing; a short buffer is a programming error.
    pub fn encode(&self, buf: &mut [u8]) {
        assert!(buf.len() >= RTP_HEADER_SIZE, "RTP header buffer too small");
        buf[0] = RTP_VERSION << 6;
        buf[1] = ((self.marker as u8) << 7) | (self.payload_type & 0x7f);
        buf[2..4].copy_from_slice(&(self.sequence as u16).to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf[12..14].copy_from_slice(&((self.sequence >> 16) as u16).to_be_bytes());
    }

    /// Decode a header previously produced by [`encode`](Self::encode).
    ///
    /// Reconstructs the 32-bit sequence number from the base and extended
    /// fields. The byte order of the extended field matches the reference
    /// sender hardware; it has not been validated against third-party
    /// senders (see the crate-level notes).
    pub fn decode(buf: &[u8]) -> Self {
        assert!(buf.len() >= RTP_HEADER_SIZE, "RTP header buffer too small");
        let base = u16::from_be_bytes([buf[2], buf[3]]) as u32;
        let ext = u16::from_be_bytes([buf[12], buf[13]]) as u32;
        Self {
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7f,
            sequence: (ext << 16) | base,
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_to_array(h: &RtpHeader) -> [u8; RTP_HEADER_SIZE] {
        let mut buf = [0u8; RTP_HEADER_SIZE];
        h.encode(&mut buf);
        buf
    }

    #[test]
    fn version_is_2() {
        let h = RtpHeader {
            marker: false,
            payload_type: 96,
            sequence: 0,
            timestamp: 0,
            ssrc: 0,
        };
        let buf = encode_to_array(&h);
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf[0] & 0x3f, 0); // P, X, CC all zero
    }

    #[test]
    fn marker_and_payload_type_share_byte() {
        let h = RtpHeader {
            marker: true,
            payload_type: 97,
            sequence: 0,
            timestamp: 0,
            ssrc: 0,
        };
        let buf = encode_to_array(&h);
        assert_eq!(buf[1] & 0x80, 0x80);
        assert_eq!(buf[1] & 0x7f, 97);
    }

    #[test]
    fn sequence_split_across_base_and_extended() {
        let h = RtpHeader {
            marker: false,
            payload_type: 96,
            sequence: 0xABCD_1234,
            timestamp: 0,
            ssrc: 0,
        };
        let buf = encode_to_array(&h);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0x1234);
        assert_eq!(u16::from_be_bytes([buf[12], buf[13]]), 0xABCD);
    }

    #[test]
    fn round_trip_at_16bit_wrap() {
        for seq in [0xFFFFu32, 0x1_0000, 0x1_0001] {
            let h = RtpHeader {
                marker: true,
                payload_type: 96,
                sequence: seq,
                timestamp: 90_000,
                ssrc: 0xDEAD_BEEF,
            };
            assert_eq!(RtpHeader::decode(&encode_to_array(&h)), h);
        }
    }

    #[test]
    fn round_trip_at_32bit_wrap() {
        let h = RtpHeader {
            marker: false,
            payload_type: 100,
            sequence: u32::MAX,
            timestamp: u32::MAX,
            ssrc: 1,
        };
        assert_eq!(RtpHeader::decode(&encode_to_array(&h)), h);
        // The successor wraps to zero in both wire fields.
        let next = RtpHeader {
            sequence: h.sequence.wrapping_add(1),
            ..h
        };
        let buf = encode_to_array(&next);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0);
        assert_eq!(u16::from_be_bytes([buf[12], buf[13]]), 0);
    }

    proptest! {
        #[test]
        fn round_trip_any_fields(
            marker: bool,
            payload_type in 0u8..128,
            sequence: u32,
            timestamp: u32,
            ssrc: u32,
        ) {
            let h = RtpHeader { marker, payload_type, sequence, timestamp, ssrc };
            prop_assert_eq!(RtpHeader::decode(&encode_to_array(&h)), h);
        }
    }
}
