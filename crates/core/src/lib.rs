//! SMPTE ST 2110-20/40 output: frame scheduling and RTP packetization.
//!
//! This crate turns captured video frames (and derived timecode) into
//! ST 2110-compliant RTP streams whose packets land on PTP-derived frame
//! boundaries, so independent senders stay phase-aligned without genlock.
//!
//! ```text
//! producer ──reserve/submit──▶ FrameManager ──ready FIFO──▶ Scheduler
//!                                  ▲                            │
//!                             FrameAllocator              Header codec
//!                             (async copies)                   │
//!                                                        ChunkProvider ──▶ wire
//! ```
//!
//! - [`protocol`] — bit-exact RTP / SRD / ANC header pack and unpack.
//! - [`layout`] — payload-size search and per-stream packet geometry.
//! - [`timing`] — ST 2110-21 transmit offsets and alignment-point math.
//! - [`frame`] — pooled frame lifecycle and the producer handoff.
//! - [`stream`] — the per-stream scheduler worker and its video/ancillary
//!   packetization policies.
//! - [`provider`] — the chunk transmission contract, plus a software UDP
//!   realization for hosts without vendor NIC libraries.
//!
//! External collaborators are traits the host wires in: a [`clock`]
//! (PTP-disciplined time), an [`alloc`] frame allocator (system or GPU),
//! and a [`provider`] backend.
//!
//! Known caveat: the byte order of the extended sequence number on the
//! decode path matches the reference sender hardware and has not been
//! validated against third-party senders.

pub mod alloc;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod layout;
pub mod protocol;
pub mod provider;
pub mod stream;
pub mod timecode;
pub mod timing;

pub use config::{AlignmentMode, FrameLockingMode, OutputStreamConfig};
pub use error::{Result, St2110Error};
pub use format::{FrameRate, PixelFormat, Scan, VideoFormat};
pub use stream::{OutputStream, PresentedFrame, StreamState};
pub use timecode::Timecode;
