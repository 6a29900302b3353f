//! Fixed arena of device buffers with per-slot ownership tracking.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::{BufferQueue, FrameMetadata};

/// Who currently owns a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Mapped but never handed to the device.
    Idle,
    /// Owned by the device, which may write into it.
    Queued,
    /// Owned by the application, which may read it.
    Dequeued,
}

/// Mapped buffers addressed by device index.
///
/// The slot count is fixed when the pool is built and never changes.
#[derive(Debug)]
pub struct BufferPool<Q> {
    queue: Q,
    slots: Box<[SlotState]>,
}

impl<Q: BufferQueue> BufferPool<Q> {
    /// Wrap freshly mapped buffers, all of them idle.
    pub fn new(queue: Q) -> Self {
        let slots = vec![SlotState::Idle; queue.buffer_count()].into_boxed_slice();
        Self { queue, slots }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// State of slot `index`.
    pub fn state(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).copied()
    }

    /// Number of slots currently owned by the device.
    pub fn queued_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|&&state| state == SlotState::Queued)
            .count()
    }

    /// Hand slot `index` to the device.
    pub fn queue(&mut self, index: usize) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| Error::Device(format!("buffer {index} does not exist")))?;
        if *slot == SlotState::Queued {
            return Err(Error::Device(format!("buffer {index} is already queued")));
        }

        self.queue.queue(index)?;
        *slot = SlotState::Queued;
        debug!(index, "buffer queued");
        Ok(())
    }

    /// Queue every slot not already owned by the device.
    pub fn queue_all(&mut self) -> Result<()> {
        for index in 0..self.slots.len() {
            if self.state(index) != Some(SlotState::Queued) {
                self.queue(index)?;
            }
        }
        Ok(())
    }

    /// Block until the device has a filled buffer or `timeout` elapses.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<bool> {
        self.queue.wait_ready(timeout)
    }

    /// Take a filled buffer back from the device.
    ///
    /// A known buffer the pool did not queue is handed straight back to the
    /// device before the error is returned, so no slot is lost.
    pub fn dequeue(&mut self) -> Result<FrameMetadata> {
        let meta = self.queue.dequeue()?;
        let index = meta.index;
        let state = self
            .state(index)
            .ok_or_else(|| Error::Device(format!("device returned unknown buffer {index}")))?;
        if state != SlotState::Queued {
            warn!(index, ?state, "device returned a buffer that was not queued");
            self.queue.queue(index)?;
            self.mark(index, SlotState::Queued);
            return Err(Error::Device(format!(
                "device returned buffer {index} which was not queued"
            )));
        }

        self.mark(index, SlotState::Dequeued);
        debug!(index = meta.index, sequence = meta.sequence, "buffer dequeued");
        Ok(meta)
    }

    fn mark(&mut self, index: usize, state: SlotState) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = state;
        }
    }

    /// Bytes of a dequeued slot.
    pub fn data(&self, index: usize) -> Result<&[u8]> {
        match self.state(index) {
            Some(SlotState::Dequeued) => self
                .queue
                .buffer(index)
                .ok_or_else(|| Error::Device(format!("buffer {index} is not mapped"))),
            Some(state) => Err(Error::Device(format!(
                "buffer {index} is not readable while {state:?}"
            ))),
            None => Err(Error::Device(format!("buffer {index} does not exist"))),
        }
    }

    /// Turn streaming on.
    pub fn stream_on(&mut self) -> Result<()> {
        self.queue.stream_on()
    }

    /// Turn streaming off; the device gives every buffer back.
    pub fn stream_off(&mut self) -> Result<()> {
        self.queue.stream_off()?;
        self.slots.fill(SlotState::Idle);
        Ok(())
    }

    /// Unmap every buffer.
    pub fn release(mut self) {
        self.queue.release();
    }
}
