//! Frame memory allocation and the asynchronous copy primitive.
//!
//! The allocator exclusively owns frame buffer memory. Producers never hand
//! the engine long-lived references to their own memory; capture data is
//! copied into a pooled [`FrameBuffer`] via [`FrameAllocator::copy_async`],
//! whose completion callback may fire on **any** thread — that is the
//! contract GPU copy engines impose, and the system allocator preserves it
//! by dispatching completions on a dedicated thread even though its copies
//! finish inline.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::Result;

/// Where frame memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// No allocation performed.
    None,
    /// Host memory.
    System,
    /// Device memory; frames must be staged through an intermediate buffer
    /// before packetization.
    Gpu,
}

/// One pooled frame's backing storage.
///
/// Contents are only ever written by the owner of the frame's current
/// lifecycle stage, so the internal lock is uncontended in steady state; it
/// exists to keep the cross-thread handoffs sound.
pub struct FrameBuffer {
    size: usize,
    data: Mutex<Box<[u8]>>,
}

impl FrameBuffer {
    /// Zero-initialized buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            data: Mutex::new(vec![0u8; size].into_boxed_slice()),
        }
    }

    /// Buffer capacity in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the buffer holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Copy `src` into the buffer at `offset`.
    pub fn write_at(&self, offset: usize, src: &[u8]) {
        let mut data = self.data.lock();
        data[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Copy `dst.len()` bytes out of the buffer from `offset`.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) {
        let data = self.data.lock();
        dst.copy_from_slice(&data[offset..offset + dst.len()]);
    }

    /// Run `f` over the full buffer contents.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.lock())
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer").field("size", &self.size).finish()
    }
}

/// Callback invoked when an asynchronous copy settles; the flag reports
/// success.
pub type CopyCompletion = Box<dyn FnOnce(bool) + Send + 'static>;

/// Frame memory provider.
pub trait FrameAllocator: Send + Sync {
    /// The kind of memory this allocator hands out.
    fn kind(&self) -> MemoryKind;

    /// Allocate `count` frame buffers of `frame_size` bytes each.
    fn allocate(&self, count: usize, frame_size: usize) -> Result<Vec<Arc<FrameBuffer>>>;

    /// Start copying `src` into `dst` at `offset`; `completion` fires on an
    /// arbitrary thread once the copy settles.
    fn copy_async(
        &self,
        src: &[u8],
        dst: &Arc<FrameBuffer>,
        offset: usize,
        completion: CopyCompletion,
    );
}

/// Host-memory allocator.
///
/// Copies complete inline; the completion callback is still delivered from
/// a separate completion thread so callers cannot accidentally depend on
/// same-thread delivery.
pub struct SystemAllocator {
    completions: mpsc::Sender<(CopyCompletion, bool)>,
    worker: Option<JoinHandle<()>>,
}

impl SystemAllocator {
    /// Start the allocator and its completion thread.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<(CopyCompletion, bool)>();
        let worker = std::thread::Builder::new()
            .name("st2110-copy-completion".into())
            .spawn(move || {
                for (completion, ok) in rx {
                    completion(ok);
                }
                tracing::debug!("copy completion thread exited");
            })
            .expect("spawn completion thread");
        Self {
            completions: tx,
            worker: Some(worker),
        }
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAllocator for SystemAllocator {
    fn kind(&self) -> MemoryKind {
        MemoryKind::System
    }

    fn allocate(&self, count: usize, frame_size: usize) -> Result<Vec<Arc<FrameBuffer>>> {
        if frame_size == 0 {
            return Err(crate::St2110Error::Allocation("zero frame size".into()));
        }
        tracing::debug!(count, frame_size, "allocating system frame buffers");
        Ok((0..count).map(|_| Arc::new(FrameBuffer::new(frame_size))).collect())
    }

    fn copy_async(
        &self,
        src: &[u8],
        dst: &Arc<FrameBuffer>,
        offset: usize,
        completion: CopyCompletion,
    ) {
        let ok = offset + src.len() <= dst.len();
        if ok {
            dst.write_at(offset, src);
        } else {
            tracing::error!(
                offset,
                src_len = src.len(),
                capacity = dst.len(),
                "copy exceeds frame buffer"
            );
        }
        if self.completions.send((completion, ok)).is_err() {
            tracing::warn!("completion thread gone; copy result dropped");
        }
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        // Closing the channel lets the completion thread drain and exit.
        let (tx, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.completions, tx));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn allocate_gives_distinct_buffers() {
        let alloc = SystemAllocator::new();
        let buffers = alloc.allocate(3, 64).unwrap();
        assert_eq!(buffers.len(), 3);
        buffers[0].write_at(0, &[1, 2, 3]);
        buffers[1].with_data(|d| assert_eq!(&d[0..3], &[0, 0, 0]));
    }

    #[test]
    fn zero_size_rejected() {
        assert!(SystemAllocator::new().allocate(2, 0).is_err());
    }

    #[test]
    fn copy_completes_off_thread() {
        let alloc = SystemAllocator::new();
        let buffer = alloc.allocate(1, 16).unwrap().remove(0);
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let caller = std::thread::current().id();
        alloc.copy_async(
            &[9u8; 16],
            &buffer,
            0,
            Box::new(move |ok| {
                assert!(ok);
                assert_ne!(std::thread::current().id(), caller);
                done2.store(true, Ordering::SeqCst);
            }),
        );
        for _ in 0..100 {
            if done.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(done.load(Ordering::SeqCst));
        buffer.with_data(|d| assert_eq!(d, &[9u8; 16][..]));
    }

    #[test]
    fn oversized_copy_reports_failure() {
        let alloc = SystemAllocator::new();
        let buffer = alloc.allocate(1, 8).unwrap().remove(0);
        let failed = Arc::new(AtomicBool::new(false));
        let failed2 = failed.clone();
        alloc.copy_async(
            &[0u8; 16],
            &buffer,
            0,
            Box::new(move |ok| failed2.store(!ok, Ordering::SeqCst)),
        );
        for _ in 0..100 {
            if failed.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(failed.load(Ordering::SeqCst));
    }
}
