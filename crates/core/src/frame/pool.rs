//! Fixed-size frame pool: an arena of slots plus a free-index stack.
//!
//! Acquire pops an index, release pushes it back. No shared-ownership smart
//! pointers — ownership transfer is strictly staged through
//! [`FrameState`], and the pool validates every transition. The pool itself
//! is not synchronized; [`FrameManager`](super::FrameManager) guards it
//! together with the ready queue under one lock.

use std::sync::Arc;

use crate::alloc::FrameBuffer;

use super::{FrameId, FrameState};

/// One arena slot.
#[derive(Debug)]
pub(crate) struct FrameSlot {
    pub state: FrameState,
    pub buffer: Arc<FrameBuffer>,
    /// Producer-assigned identity, valid from Reserved onwards.
    pub counter: u64,
}

/// Arena + free-list of frame slots.
#[derive(Debug, Default)]
pub struct FramePool {
    slots: Vec<FrameSlot>,
    free: Vec<usize>,
}

impl FramePool {
    /// Pool over the given buffers, all slots Free.
    pub fn new(buffers: Vec<Arc<FrameBuffer>>) -> Self {
        let slots: Vec<FrameSlot> = buffers
            .into_iter()
            .map(|buffer| FrameSlot {
                state: FrameState::Free,
                buffer,
                counter: 0,
            })
            .collect();
        // LIFO free order keeps recently-touched buffers warm.
        let free = (0..slots.len()).rev().collect();
        Self { slots, free }
    }

    /// Add a slot backed by `buffer` and mark it free.
    pub fn grow(&mut self, buffer: Arc<FrameBuffer>) -> FrameId {
        self.slots.push(FrameSlot {
            state: FrameState::Free,
            buffer,
            counter: 0,
        });
        let index = self.slots.len() - 1;
        self.free.push(index);
        FrameId(index)
    }

    /// Pop a free slot and mark it Reserved. Never blocks.
    pub fn acquire_free(&mut self) -> Option<FrameId> {
        let index = self.free.pop()?;
        debug_assert_eq!(self.slots[index].state, FrameState::Free);
        self.slots[index].state = FrameState::Reserved;
        Some(FrameId(index))
    }

    /// Return a slot to Free. Invalid releases are logged and ignored so a
    /// misbehaving caller cannot corrupt the free list.
    pub fn release(&mut self, id: FrameId) {
        let slot = &mut self.slots[id.0];
        if slot.state == FrameState::Free {
            tracing::error!(frame = id.0, "double release of a free frame ignored");
            return;
        }
        slot.state = FrameState::Free;
        self.free.push(id.0);
    }

    /// Reserved → Ready, recording the producer counter.
    pub fn mark_ready(&mut self, id: FrameId, counter: u64) {
        let slot = &mut self.slots[id.0];
        if slot.state != FrameState::Reserved {
            tracing::error!(frame = id.0, state = ?slot.state, "mark_ready on unreserved frame");
        }
        slot.state = FrameState::Ready;
        slot.counter = counter;
    }

    /// Ready → Sending.
    pub fn mark_sending(&mut self, id: FrameId) {
        let slot = &mut self.slots[id.0];
        if slot.state != FrameState::Ready {
            tracing::error!(frame = id.0, state = ?slot.state, "mark_sending on non-ready frame");
        }
        slot.state = FrameState::Sending;
    }

    /// Drain: every slot back to Free regardless of state.
    pub fn reset(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.state = FrameState::Free;
            slot.counter = 0;
            self.free.push(index);
        }
    }

    /// Borrow a slot.
    pub(crate) fn slot(&self, id: FrameId) -> &FrameSlot {
        &self.slots[id.0]
    }

    /// Total slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Currently free slots.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
