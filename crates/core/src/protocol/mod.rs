//! ST 2110 wire-header codec.
//!
//! Pure pack/unpack of the RTP, SRD, and ancillary-data headers to and from
//! their exact byte layouts. No I/O, no allocation on the encode path; the
//! caller supplies pre-zeroed regions of the correct size (sizes are
//! asserted, not returned as errors).
//!
//! ## Layouts (network byte order)
//!
//! ```text
//! RTP base (12B):   V(2) P(1) X(1) CC(4) | M(1) PT(7) | SEQ(16) | TS(32) | SSRC(32)
//! Ext. seq (2B):    ExtSeq(16)             — first payload-header field, ST 2110-10 §6.2
//! SRD header (6B):  Length(16) | F(1) RowNum(15) | C(1) Offset(15)
//! Video header:     RTP + ExtSeq + SRD1 [+ SRD2]          (20B or 26B)
//! ANC header (6B):  Length(16) | ANCCount(8) | F(2) rsvd(6) | rsvd(16)
//! ```
//!
//! Compiler bitfields are deliberately avoided — every field is written with
//! explicit shifts and masks and verified by round-trip tests.

pub mod anc;
pub mod rtp;
pub mod srd;

pub use anc::{AncPayloadHeader, AncTimecodePacket, ANC_DATA_PACKET_SIZE, ANC_PAYLOAD_HEADER_SIZE};
pub use rtp::{RtpHeader, RTP_BASE_HEADER_SIZE, RTP_HEADER_SIZE, RTP_VERSION};
pub use srd::{
    SrdHeader, VideoHeader, SRD_HEADER_SIZE, VIDEO_HEADER_SIZE_SINGLE, VIDEO_HEADER_SIZE_TWIN,
};
