//! Software chunk provider over a UDP socket.
//!
//! A best-effort realization of the [`ChunkProvider`] contract without
//! vendor NIC libraries: committed chunks are handed to a pacing thread
//! that sleeps until each chunk's schedule time, then writes one datagram
//! per packet (header bytes followed by payload bytes, trimmed to the
//! per-packet lengths). Emission accuracy is whatever the OS scheduler
//! gives; hardware providers pace on the wire instead.
//!
//! `NoFreeChunk` is never produced here — that status models DMA ring
//! exhaustion, which a heap-backed provider does not have. Backpressure
//! appears as `QueueFull` when the pacing thread falls behind.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::clock::PtpClock;
use crate::{Result, St2110Error};

use super::{ChunkCompletion, ChunkLayout, ChunkMut, ChunkProvider, ChunkStatus, PacketLengths};

struct CommittedChunk {
    packets: Vec<Vec<u8>>,
    schedule_time_ns: u64,
    track_token: Option<u64>,
    generation: u64,
}

/// [`ChunkProvider`] that emits packets on a UDP socket from a pacing
/// thread.
pub struct UdpChunkProvider {
    destination: SocketAddr,
    clock: Arc<dyn PtpClock>,
    layout: Option<ChunkLayout>,
    headers: Vec<u8>,
    payloads: Vec<u8>,
    lengths: Vec<PacketLengths>,
    packet_count: usize,
    pending_token: Option<u64>,
    queue: Option<SyncSender<CommittedChunk>>,
    worker: Option<JoinHandle<()>>,
    completions: Arc<Mutex<std::collections::VecDeque<ChunkCompletion>>>,
    generation: Arc<AtomicU64>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

/// Pacing sleep granularity; cancellation is honored at this resolution.
const PACER_QUANTUM_NS: u64 = 2_000_000;

impl UdpChunkProvider {
    /// Provider sending to `destination`, pacing against `clock`.
    pub fn new(destination: SocketAddr, clock: Arc<dyn PtpClock>) -> Self {
        Self {
            destination,
            clock,
            layout: None,
            headers: Vec::new(),
            payloads: Vec::new(),
            lengths: Vec::new(),
            packet_count: 0,
            pending_token: None,
            queue: None,
            worker: None,
            completions: Arc::new(Mutex::new(std::collections::VecDeque::new())),
            generation: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    fn build_packets(&self) -> Vec<Vec<u8>> {
        let layout = self.layout.as_ref().expect("provider initialized");
        (0..self.packet_count)
            .map(|i| {
                let lengths = self.lengths[i];
                let header_start = i * layout.header_stride;
                let payload_start = i * layout.payload_stride;
                let mut packet =
                    Vec::with_capacity(lengths.header as usize + lengths.payload as usize);
                packet.extend_from_slice(
                    &self.headers[header_start..header_start + lengths.header as usize],
                );
                packet.extend_from_slice(
                    &self.payloads[payload_start..payload_start + lengths.payload as usize],
                );
                packet
            })
            .collect()
    }
}

impl ChunkProvider for UdpChunkProvider {
    fn init(&mut self, layout: &ChunkLayout) -> Result<()> {
        if self.worker.is_some() {
            return Err(St2110Error::Config("provider already initialized".into()));
        }
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(self.destination)?;
        self.shutdown.store(false, Ordering::SeqCst);

        self.headers = vec![0u8; layout.packets_per_chunk * layout.header_stride];
        self.payloads = vec![0u8; layout.packets_per_chunk * layout.payload_stride];
        self.lengths = vec![PacketLengths::default(); layout.packets_per_chunk];
        self.layout = Some(*layout);

        // Enough in-flight chunks for two frames before backpressure.
        let depth = (layout.chunks_per_frame * 2).max(4);
        let (tx, rx): (SyncSender<CommittedChunk>, Receiver<CommittedChunk>) =
            mpsc::sync_channel(depth);
        let clock = self.clock.clone();
        let completions = self.completions.clone();
        let generation = self.generation.clone();
        let shutdown = self.shutdown.clone();
        let worker = std::thread::Builder::new()
            .name("st2110-udp-pacer".into())
            .spawn(move || {
                'chunks: for chunk in rx {
                    // Sleep in quanta so cancellation and shutdown interrupt
                    // a far-future schedule.
                    while chunk.schedule_time_ns > 0 {
                        if shutdown.load(Ordering::SeqCst)
                            || chunk.generation != generation.load(Ordering::SeqCst)
                        {
                            continue 'chunks;
                        }
                        let now = clock.now_ns();
                        if now >= chunk.schedule_time_ns {
                            break;
                        }
                        clock.sleep_until_ns(chunk.schedule_time_ns.min(now + PACER_QUANTUM_NS));
                    }
                    if chunk.generation != generation.load(Ordering::SeqCst) {
                        continue; // cancelled before emission
                    }
                    for packet in &chunk.packets {
                        if let Err(e) = socket.send(packet) {
                            tracing::warn!(error = %e, "UDP send failed");
                            break;
                        }
                    }
                    if let Some(token) = chunk.track_token {
                        completions.lock().push_back(ChunkCompletion {
                            token,
                            completed_at_ns: clock.now_ns(),
                        });
                    }
                }
                tracing::debug!("UDP pacer thread exited");
            })
            .expect("spawn pacer thread");

        self.queue = Some(tx);
        self.worker = Some(worker);
        tracing::info!(destination = %self.destination, depth, "UDP chunk provider ready");
        Ok(())
    }

    fn next_chunk(&mut self) -> ChunkStatus {
        if self.layout.is_none() {
            return ChunkStatus::Fatal;
        }
        self.headers.fill(0);
        self.payloads.fill(0);
        self.lengths.fill(PacketLengths::default());
        self.packet_count = 0;
        ChunkStatus::Ok
    }

    fn chunk_mut(&mut self) -> ChunkMut<'_> {
        let layout = self.layout.as_ref().expect("provider initialized");
        ChunkMut {
            header_stride: layout.header_stride,
            payload_stride: layout.payload_stride,
            headers: &mut self.headers,
            payloads: &mut self.payloads,
            lengths: &mut self.lengths,
        }
    }

    fn set_packet_count(&mut self, count: usize) {
        debug_assert!(count <= self.lengths.len());
        self.packet_count = count;
    }

    fn commit_chunk(&mut self, schedule_time_ns: u64) -> ChunkStatus {
        let Some(queue) = &self.queue else {
            return ChunkStatus::Fatal;
        };
        let chunk = CommittedChunk {
            packets: self.build_packets(),
            schedule_time_ns,
            track_token: self.pending_token.take(),
            generation: self.generation.load(Ordering::SeqCst),
        };
        match queue.try_send(chunk) {
            Ok(()) => ChunkStatus::Ok,
            Err(TrySendError::Full(_)) => ChunkStatus::QueueFull,
            Err(TrySendError::Disconnected(_)) => ChunkStatus::Fatal,
        }
    }

    fn skip_chunks(&mut self, count: usize) -> ChunkStatus {
        // No DMA ring to move; resynchronization is a no-op beyond clearing
        // the staged chunk.
        tracing::trace!(count, "skip chunks");
        self.packet_count = 0;
        ChunkStatus::Ok
    }

    fn cancel_unsent(&mut self) {
        // Queued chunks from the previous generation are dropped by the
        // pacer without emission.
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn mark_for_tracking(&mut self, token: u64) {
        self.pending_token = Some(token);
    }

    fn poll_completion(&mut self) -> Option<ChunkCompletion> {
        self.completions.lock().pop_front()
    }

    fn destroy(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.queue = None; // closes the channel
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.layout = None;
    }
}

impl Drop for UdpChunkProvider {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.destroy();
        }
    }
}
