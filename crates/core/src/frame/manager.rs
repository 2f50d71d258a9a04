//! Frame manager: pool + allocator coordination and the ready queue.
//!
//! Producers reserve a frame, hand over capture data, and the manager
//! bridges the allocator's asynchronous copy completion (arbitrary thread)
//! into a Ready frame on the FIFO send queue. The scheduler dequeues at its
//! own pace and releases frames after transmission, which wakes producers
//! blocked on reservation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::alloc::{FrameAllocator, FrameBuffer, MemoryKind};
use crate::{Result, St2110Error};

use super::pool::FramePool;
use super::{FrameId, FrameState};

struct Inner {
    pool: FramePool,
    ready: VecDeque<FrameId>,
}

/// A Ready frame dequeued for sending.
#[derive(Debug)]
pub struct DequeuedFrame {
    /// Pool slot now in the Sending state.
    pub id: FrameId,
    /// Frame data.
    pub buffer: Arc<FrameBuffer>,
    /// Producer-assigned identity.
    pub counter: u64,
}

/// Owns the frame pool lifecycle and the ready-to-send FIFO for one stream.
pub struct FrameManager {
    inner: Mutex<Inner>,
    frame_ready: Condvar,
    frame_available: Condvar,
    allocator: Arc<dyn FrameAllocator>,
    frame_size: usize,
    active: AtomicBool,
    copy_failed: AtomicBool,
}

impl FrameManager {
    /// Allocate `buffer_count` frames of `frame_size` bytes and build the
    /// pool.
    ///
    /// When a GPU allocator is supplied it is tried first; failure falls
    /// back to the system allocator with a log, mirroring hosts where
    /// device memory registration is optional.
    pub fn initialize(
        frame_size: usize,
        buffer_count: usize,
        gpu: Option<Arc<dyn FrameAllocator>>,
        system: Arc<dyn FrameAllocator>,
    ) -> Result<Arc<Self>> {
        if frame_size == 0 {
            return Err(St2110Error::Config("zero frame size".into()));
        }
        if buffer_count == 0 {
            return Err(St2110Error::Config("zero buffer count".into()));
        }

        let (allocator, buffers) = match gpu {
            Some(gpu) => match gpu.allocate(buffer_count, frame_size) {
                Ok(buffers) => (gpu, buffers),
                Err(e) => {
                    tracing::warn!(error = %e, "GPU allocation failed, falling back to system memory");
                    let buffers = system.allocate(buffer_count, frame_size)?;
                    (system, buffers)
                }
            },
            None => {
                let buffers = system.allocate(buffer_count, frame_size)?;
                (system, buffers)
            }
        };

        tracing::info!(
            buffer_count,
            frame_size,
            kind = ?allocator.kind(),
            "frame manager initialized"
        );

        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                pool: FramePool::new(buffers),
                ready: VecDeque::with_capacity(buffer_count),
            }),
            frame_ready: Condvar::new(),
            frame_available: Condvar::new(),
            allocator,
            frame_size,
            active: AtomicBool::new(true),
            copy_failed: AtomicBool::new(false),
        }))
    }

    /// Where the pool's memory lives.
    pub fn memory_kind(&self) -> MemoryKind {
        self.allocator.kind()
    }

    /// Frame byte size the pool was built for.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Claim a free frame without blocking.
    pub fn reserve(&self) -> Option<FrameId> {
        self.inner.lock().pool.acquire_free()
    }

    /// Claim a free frame, allocating one more buffer when the pool is
    /// empty. Never blocks; fails only if allocation does.
    pub fn reserve_or_grow(&self) -> Result<FrameId> {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.pool.acquire_free() {
            return Ok(id);
        }
        let buffer = self
            .allocator
            .allocate(1, self.frame_size)?
            .remove(0);
        let id = inner.pool.grow(buffer);
        tracing::debug!(frames = inner.pool.len(), "pool grown on demand");
        let acquired = inner.pool.acquire_free();
        debug_assert_eq!(acquired, Some(id));
        acquired.ok_or(St2110Error::NoFreeFrame)
    }

    /// Claim a free frame, blocking until one is released or the manager
    /// deactivates.
    pub fn reserve_blocking(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        loop {
            if !self.active.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(id) = inner.pool.acquire_free() {
                return Some(id);
            }
            self.frame_available.wait(&mut inner);
        }
    }

    /// Start the asynchronous copy of `data` into a reserved frame.
    ///
    /// On completion — possibly on another thread — the frame transitions
    /// Reserved → Ready, joins the FIFO, and the ready notification fires.
    /// A failed copy raises the manager's failure flag instead; the owning
    /// stream observes it and stops.
    pub fn set_frame_data(self: &Arc<Self>, id: FrameId, data: &[u8], counter: u64) -> Result<()> {
        let buffer = {
            let inner = self.inner.lock();
            let slot = inner.pool.slot(id);
            if slot.state != FrameState::Reserved {
                return Err(St2110Error::Config(format!(
                    "set_frame_data on frame in state {:?}",
                    slot.state
                )));
            }
            slot.buffer.clone()
        };

        let manager = self.clone();
        self.allocator.copy_async(
            data,
            &buffer,
            0,
            Box::new(move |ok| {
                if ok {
                    let mut inner = manager.inner.lock();
                    inner.pool.mark_ready(id, counter);
                    inner.ready.push_back(id);
                    drop(inner);
                    manager.frame_ready.notify_all();
                    tracing::trace!(frame = id.0, counter, "frame ready");
                } else {
                    tracing::error!(frame = id.0, counter, "frame copy failed");
                    manager.copy_failed.store(true, Ordering::SeqCst);
                    // Wake the scheduler so it observes the failure.
                    manager.frame_ready.notify_all();
                }
            }),
        );
        Ok(())
    }

    /// Pop the oldest Ready frame, promoting it to Sending. Non-blocking.
    pub fn dequeue_ready(&self) -> Option<DequeuedFrame> {
        let mut inner = self.inner.lock();
        let id = inner.ready.pop_front()?;
        inner.pool.mark_sending(id);
        let slot = inner.pool.slot(id);
        Some(DequeuedFrame {
            id,
            buffer: slot.buffer.clone(),
            counter: slot.counter,
        })
    }

    /// Block up to `timeout` for a Ready frame, then dequeue it.
    pub fn wait_ready(&self, timeout: Duration) -> Option<DequeuedFrame> {
        let mut inner = self.inner.lock();
        while inner.ready.is_empty() {
            if !self.active.load(Ordering::SeqCst) || self.copy_failed() {
                return None;
            }
            if self.frame_ready.wait_for(&mut inner, timeout).timed_out() {
                return None;
            }
        }
        let id = inner.ready.pop_front()?;
        inner.pool.mark_sending(id);
        let slot = inner.pool.slot(id);
        Some(DequeuedFrame {
            id,
            buffer: slot.buffer.clone(),
            counter: slot.counter,
        })
    }

    /// Whether a Ready frame is queued.
    pub fn has_ready(&self) -> bool {
        !self.inner.lock().ready.is_empty()
    }

    /// Return a frame to Free and wake producers blocked on reservation.
    pub fn release(&self, id: FrameId) {
        self.inner.lock().pool.release(id);
        self.frame_available.notify_all();
    }

    /// Whether an asynchronous copy has failed.
    pub fn copy_failed(&self) -> bool {
        self.copy_failed.load(Ordering::SeqCst)
    }

    /// Unblock every waiter; subsequent blocking calls return `None`.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.frame_ready.notify_all();
        self.frame_available.notify_all();
    }

    /// Drain the queue and free every slot.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.ready.clear();
        inner.pool.reset();
    }
}
