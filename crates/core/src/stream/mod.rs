//! Output streams: the per-stream worker, its state, and the public facade.
//!
//! An [`OutputStream`] owns one worker thread running the scheduler state
//! machine ([`scheduler`]), a [`FrameManager`] feeding it, and a
//! [`ChunkProvider`] emitting to the wire. Producers interact only through
//! [`reserve`](OutputStream::reserve) / [`submit`](OutputStream::submit);
//! everything else happens on the worker.
//!
//! ## Stream lifecycle
//!
//! ```text
//! new()   -> Idle          (geometry computed, provider initialized)
//! start() -> Active        (worker thread spawned)
//! stop()  -> Stopping -> Stopped
//! fatal error            -> Stopped  (listener notified, no restart)
//! ```

pub mod ancillary;
pub mod scheduler;
pub mod tracker;
pub mod video;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use rand::RngExt;

use crate::alloc::{FrameAllocator, SystemAllocator};
use crate::clock::PtpClock;
use crate::config::OutputStreamConfig;
use crate::format::{FrameRate, VideoFormat};
use crate::frame::manager::FrameManager;
use crate::frame::{FrameId, SendingFrame};
use crate::layout::{LayoutOptions, StreamMemory};
use crate::provider::{ChunkLayout, ChunkMut, ChunkProvider};
use crate::timing::StreamTiming;
use crate::{Result, St2110Error};

use ancillary::AncillaryPacketizer;
use scheduler::Scheduler;
use video::VideoPacketizer;

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, not yet started.
    Idle,
    /// Resources being set up.
    Initializing,
    /// Worker loop running.
    Active,
    /// Stop requested; worker draining.
    Stopping,
    /// Worker exited; stream cannot be restarted.
    Stopped,
}

/// Last frame put on the wire, for external polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentedFrame {
    /// Alignment-point index the frame was scheduled on.
    pub boundary_index: u64,
    /// Producer-assigned frame counter.
    pub counter: u64,
}

/// Callback invoked from the worker thread when the stream dies.
pub type ErrorCallback = Box<dyn Fn(&St2110Error) + Send + Sync>;

/// State shared between the facade and the worker thread.
pub(crate) struct StreamShared {
    pub active: AtomicBool,
    pub state: Mutex<StreamState>,
    pub last_presented: Mutex<Option<PresentedFrame>>,
    pub on_error: Mutex<Option<ErrorCallback>>,
}

impl StreamShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(false),
            state: Mutex::new(StreamState::Idle),
            last_presented: Mutex::new(None),
            on_error: Mutex::new(None),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_state(&self, state: StreamState) {
        tracing::debug!(?state, "stream state");
        *self.state.lock() = state;
    }

    pub fn report_error(&self, error: &St2110Error) {
        tracing::error!(%error, "stream error");
        if let Some(cb) = self.on_error.lock().as_ref() {
            cb(error);
        }
    }
}

/// Packetization policy: what differs between the video and ancillary
/// variants of the scheduler state machine.
pub(crate) trait FramePacketizer: Send + Sync {
    /// Stream geometry.
    fn memory(&self) -> &StreamMemory;

    /// Prepare per-frame state; called when a frame is promoted to Sending
    /// and again before each repeat transmission.
    fn begin_frame(&mut self, frame: &mut SendingFrame);

    /// Stage frame bytes up to `target_bytes` into the intermediate buffer.
    /// No-op for policies that read frame memory directly.
    fn stage(&mut self, frame: &mut SendingFrame, target_bytes: usize);

    /// Fill every packet of chunk `chunk_index`: headers, payloads, and
    /// per-packet lengths. Advances the frame cursor and the rolling
    /// sequence number. Returns the number of packets written.
    fn fill_chunk(
        &mut self,
        frame: &mut SendingFrame,
        chunk: &mut ChunkMut<'_>,
        chunk_index: usize,
        sequence: &mut u32,
    ) -> usize;
}

/// One ST 2110 output stream (video or ancillary).
pub struct OutputStream {
    shared: Arc<StreamShared>,
    manager: Arc<FrameManager>,
    memory: StreamMemory,
    config: OutputStreamConfig,
    scheduler: Option<Scheduler>,
    worker: Option<JoinHandle<()>>,
    next_counter: AtomicU64,
    /// Ancillary streams seed themselves with one reservation on start.
    bootstrap_frame: bool,
}

impl OutputStream {
    /// Create a video stream (ST 2110-20).
    ///
    /// The provider is initialized here with the derived chunk geometry;
    /// failures (bad resolution, no usable payload size, provider setup)
    /// surface before any thread is spawned.
    pub fn video(
        config: OutputStreamConfig,
        format: VideoFormat,
        payload_type: u8,
        mut provider: Box<dyn ChunkProvider>,
        clock: Arc<dyn PtpClock>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = StreamShared::new();
        shared.set_state(StreamState::Initializing);

        let memory = StreamMemory::for_video(
            &format,
            &LayoutOptions {
                lines_per_chunk: config.lines_per_chunk,
                multi_srd: config.multi_srd,
                maximize_packet_size: config.maximize_packet_size,
            },
        )?;
        let timing = StreamTiming::new(
            format.frame_rate,
            format.height,
            format.scan,
            memory.chunks_per_frame,
            &config,
        );
        provider.init(&ChunkLayout {
            packets_per_chunk: memory.packets_per_chunk,
            chunks_per_frame: memory.chunks_per_frame,
            header_stride: memory.header_size,
            payload_stride: memory.payload_size,
        })?;

        let manager = Self::build_manager(&config, memory.frame_size, None)?;
        let ssrc = rand::rng().random::<u32>();
        let packetizer: Box<dyn FramePacketizer> = Box::new(VideoPacketizer::new(
            &format,
            memory.clone(),
            &config,
            payload_type,
            ssrc,
        ));

        tracing::info!(
            width = format.width,
            height = format.height,
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "video output stream created"
        );
        Ok(Self::assemble(
            shared, manager, memory, config, timing, provider, packetizer, clock,
        ))
    }

    /// Create an ancillary timecode stream (ST 2110-40).
    ///
    /// Sends exactly one timecode packet per frame interval. The stream
    /// bootstraps itself with a single reservation on start, so timecode
    /// flows without a producer.
    pub fn ancillary(
        config: OutputStreamConfig,
        rate: FrameRate,
        payload_type: u8,
        mut provider: Box<dyn ChunkProvider>,
        clock: Arc<dyn PtpClock>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = StreamShared::new();
        shared.set_state(StreamState::Initializing);

        let memory = StreamMemory::for_ancillary();
        let timing = StreamTiming::new(
            rate,
            0,
            crate::format::Scan::Progressive,
            memory.chunks_per_frame,
            &config,
        );
        provider.init(&ChunkLayout {
            packets_per_chunk: memory.packets_per_chunk,
            chunks_per_frame: memory.chunks_per_frame,
            header_stride: memory.header_size,
            payload_stride: memory.payload_size,
        })?;

        // One outstanding reservation is all this stream ever needs.
        let manager = Self::build_manager(&config, memory.frame_size, None)?;
        let ssrc = rand::rng().random::<u32>();
        let packetizer: Box<dyn FramePacketizer> =
            Box::new(AncillaryPacketizer::new(memory.clone(), payload_type, ssrc));

        tracing::info!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "ancillary output stream created"
        );
        let mut stream = Self::assemble(
            shared, manager, memory, config, timing, provider, packetizer, clock,
        );
        stream.bootstrap_frame = true;
        Ok(stream)
    }

    fn build_manager(
        config: &OutputStreamConfig,
        frame_size: usize,
        gpu: Option<Arc<dyn FrameAllocator>>,
    ) -> Result<Arc<FrameManager>> {
        let gpu = if config.use_gpu_memory {
            if gpu.is_none() {
                tracing::warn!("GPU memory requested but no GPU allocator wired; using system memory");
            }
            gpu
        } else {
            None
        };
        FrameManager::initialize(
            frame_size,
            config.buffer_count,
            gpu,
            Arc::new(SystemAllocator::new()),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        shared: Arc<StreamShared>,
        manager: Arc<FrameManager>,
        memory: StreamMemory,
        config: OutputStreamConfig,
        timing: StreamTiming,
        provider: Box<dyn ChunkProvider>,
        packetizer: Box<dyn FramePacketizer>,
        clock: Arc<dyn PtpClock>,
    ) -> Self {
        let scheduler = Scheduler::new(
            config.clone(),
            memory.clone(),
            timing,
            clock,
            provider,
            packetizer,
            manager.clone(),
            shared.clone(),
        );
        shared.set_state(StreamState::Idle);
        Self {
            shared,
            manager,
            memory,
            config,
            scheduler: Some(scheduler),
            worker: None,
            next_counter: AtomicU64::new(0),
            bootstrap_frame: false,
        }
    }

    /// Spawn the worker thread and begin transmitting on schedule.
    pub fn start(&mut self) -> Result<()> {
        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(St2110Error::AlreadyRunning);
        };
        self.shared.active.store(true, Ordering::SeqCst);
        let worker = std::thread::Builder::new()
            .name("st2110-output".into())
            .spawn(move || scheduler.run())
            .map_err(|e| St2110Error::Config(format!("worker spawn failed: {e}")))?;
        self.worker = Some(worker);
        if self.bootstrap_frame {
            // Timecode payloads are generated per interval; the seed frame
            // only primes the repeat path.
            self.send_frame(&[])?;
        }
        tracing::info!("output stream started");
        Ok(())
    }

    /// Stop the worker, drain in-flight state, release resources.
    ///
    /// Blocking waits and retry loops observe the cleared active flag;
    /// blocked producers are woken.
    pub fn stop(&mut self) {
        self.shared.set_state(StreamState::Stopping);
        self.shared.active.store(false, Ordering::SeqCst);
        self.manager.deactivate();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        tracing::info!("output stream stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.shared.state.lock()
    }

    /// Register the stream-error callback (invoked from the worker thread).
    pub fn on_error(&self, callback: ErrorCallback) {
        *self.shared.on_error.lock() = Some(callback);
    }

    /// Stream geometry, fixed at creation.
    pub fn memory(&self) -> &StreamMemory {
        &self.memory
    }

    /// Reserve a frame for filling, honoring the configured locking mode.
    pub fn reserve(&self) -> Result<FrameId> {
        match self.config.frame_locking {
            crate::config::FrameLockingMode::FreeRun => {
                self.manager.reserve().ok_or(St2110Error::NoFreeFrame)
            }
            crate::config::FrameLockingMode::BlockOnReservation => {
                self.manager.reserve_blocking().ok_or(St2110Error::NotActive)
            }
        }
    }

    /// Hand capture data to a reserved frame; it becomes Ready when the
    /// asynchronous copy completes.
    pub fn submit(&self, id: FrameId, data: &[u8]) -> Result<()> {
        let counter = self.next_counter.fetch_add(1, Ordering::SeqCst);
        self.manager.set_frame_data(id, data, counter)
    }

    /// Convenience: reserve + submit in one call.
    pub fn send_frame(&self, data: &[u8]) -> Result<()> {
        let id = self.reserve()?;
        self.submit(id, data)
    }

    /// The most recently transmitted frame, if any.
    pub fn last_presented(&self) -> Option<PresentedFrame> {
        *self.shared.last_presented.lock()
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory provider double shared by the stream unit tests.

    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::provider::{
        ChunkCompletion, ChunkLayout, ChunkMut, ChunkProvider, ChunkStatus, PacketLengths,
    };
    use crate::Result;

    /// One committed chunk captured for inspection.
    #[derive(Debug, Clone)]
    pub struct RecordedChunk {
        pub schedule_time_ns: u64,
        pub packets: Vec<Vec<u8>>,
        pub tracked: Option<u64>,
    }

    #[derive(Default)]
    pub struct MockLog {
        pub committed: Vec<RecordedChunk>,
        pub skips: Vec<usize>,
        pub cancelled: bool,
        pub destroyed: bool,
    }

    /// Scriptable in-memory [`ChunkProvider`].
    pub struct MockProvider {
        layout: Option<ChunkLayout>,
        headers: Vec<u8>,
        payloads: Vec<u8>,
        lengths: Vec<PacketLengths>,
        packet_count: usize,
        pending_token: Option<u64>,
        /// Statuses to return from the next `next_chunk` calls before Ok.
        pub next_chunk_faults: VecDeque<ChunkStatus>,
        /// Statuses to return from the next `commit_chunk` calls before Ok.
        pub commit_faults: VecDeque<ChunkStatus>,
        pub log: Arc<Mutex<MockLog>>,
        completions: VecDeque<ChunkCompletion>,
        /// When set, every tracked commit immediately yields a completion
        /// stamped `schedule + completion_lag_ns`.
        pub completion_lag_ns: Option<u64>,
    }

    impl MockProvider {
        pub fn new() -> (Self, Arc<Mutex<MockLog>>) {
            let log = Arc::new(Mutex::new(MockLog::default()));
            (
                Self {
                    layout: None,
                    headers: Vec::new(),
                    payloads: Vec::new(),
                    lengths: Vec::new(),
                    packet_count: 0,
                    pending_token: None,
                    next_chunk_faults: VecDeque::new(),
                    commit_faults: VecDeque::new(),
                    log: log.clone(),
                    completions: VecDeque::new(),
                    completion_lag_ns: None,
                },
                log,
            )
        }

        /// Push a completion record for `poll_completion` to return.
        pub fn push_completion(&mut self, completion: ChunkCompletion) {
            self.completions.push_back(completion);
        }
    }

    impl ChunkProvider for MockProvider {
        fn init(&mut self, layout: &ChunkLayout) -> Result<()> {
            self.headers = vec![0u8; layout.packets_per_chunk * layout.header_stride];
            self.payloads = vec![0u8; layout.packets_per_chunk * layout.payload_stride];
            self.lengths = vec![PacketLengths::default(); layout.packets_per_chunk];
            self.layout = Some(*layout);
            Ok(())
        }

        fn next_chunk(&mut self) -> ChunkStatus {
            if let Some(fault) = self.next_chunk_faults.pop_front() {
                return fault;
            }
            self.headers.fill(0);
            self.payloads.fill(0);
            self.lengths.fill(PacketLengths::default());
            self.packet_count = 0;
            ChunkStatus::Ok
        }

        fn chunk_mut(&mut self) -> ChunkMut<'_> {
            let layout = self.layout.as_ref().expect("initialized");
            ChunkMut {
                header_stride: layout.header_stride,
                payload_stride: layout.payload_stride,
                headers: &mut self.headers,
                payloads: &mut self.payloads,
                lengths: &mut self.lengths,
            }
        }

        fn set_packet_count(&mut self, count: usize) {
            self.packet_count = count;
        }

        fn commit_chunk(&mut self, schedule_time_ns: u64) -> ChunkStatus {
            if let Some(fault) = self.commit_faults.pop_front() {
                return fault;
            }
            let layout = self.layout.as_ref().expect("initialized");
            let packets = (0..self.packet_count)
                .map(|i| {
                    let lengths = self.lengths[i];
                    let mut packet = Vec::new();
                    let hs = i * layout.header_stride;
                    let ps = i * layout.payload_stride;
                    packet.extend_from_slice(&self.headers[hs..hs + lengths.header as usize]);
                    packet.extend_from_slice(&self.payloads[ps..ps + lengths.payload as usize]);
                    packet
                })
                .collect();
            let tracked = self.pending_token.take();
            if let (Some(token), Some(lag)) = (tracked, self.completion_lag_ns) {
                self.completions.push_back(ChunkCompletion {
                    token,
                    completed_at_ns: schedule_time_ns + lag,
                });
            }
            self.log.lock().committed.push(RecordedChunk {
                schedule_time_ns,
                packets,
                tracked,
            });
            ChunkStatus::Ok
        }

        fn skip_chunks(&mut self, count: usize) -> ChunkStatus {
            self.log.lock().skips.push(count);
            ChunkStatus::Ok
        }

        fn cancel_unsent(&mut self) {
            self.log.lock().cancelled = true;
        }

        fn mark_for_tracking(&mut self, token: u64) {
            self.pending_token = Some(token);
        }

        fn poll_completion(&mut self) -> Option<ChunkCompletion> {
            self.completions.pop_front()
        }

        fn destroy(&mut self) {
            self.log.lock().destroyed = true;
        }
    }
}
