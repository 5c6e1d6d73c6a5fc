// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use crate::{BackendError, BufferSlotProblem, BufferTag, CompletionBackend, ReadinessSet,
            TaggedBuffer, WaitRequest};

/// Where one of the two result buffers currently lives.
#[derive(Debug)]
pub enum BufferSlot {
    /// Owned by the store: drained and cleared, ready to go out again.
    Retired(TaggedBuffer),
    /// Moved into an outstanding [`WaitRequest`].
    InFlight,
}

/// The two result buffers, indexed by [`BufferTag`].
///
/// A buffer is either here ([`BufferSlot::Retired`]) or inside the one outstanding
/// request with its tag ([`BufferSlot::InFlight`]), never both. So the delivery side
/// can't write into a buffer the consumer is draining, and the consumer can't re-arm
/// a tag until it has handed the drained buffer back with [`retire()`].
///
/// [`retire()`]: Self::retire
#[derive(Debug)]
pub struct DoubleBufferedResultStore {
    slots: [BufferSlot; 2],
}

impl DoubleBufferedResultStore {
    /// Both buffers retired, each with room for `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: BufferTag::ALL
                .map(|tag| BufferSlot::Retired(TaggedBuffer::new(tag, capacity))),
        }
    }

    #[must_use]
    pub fn slot(&self, tag: BufferTag) -> &BufferSlot { &self.slots[tag.index()] }

    /// Submits a request to wait on `set`, using `tag`'s buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::BufferSlot`] if that buffer is already in flight, or
    /// whatever the backend's [`submit()`] returns. The buffer stays in flight in the
    /// latter case, since the backend may already own it.
    ///
    /// [`submit()`]: CompletionBackend::submit
    pub fn arm(
        &mut self,
        tag: BufferTag,
        set: &ReadinessSet,
        backend: &mut dyn CompletionBackend,
    ) -> Result<(), BackendError> {
        let slot = &mut self.slots[tag.index()];
        let BufferSlot::Retired(buffer) = std::mem::replace(slot, BufferSlot::InFlight)
        else {
            return Err(BackendError::BufferSlot {
                tag,
                problem: BufferSlotProblem::AlreadyInFlight,
            });
        };
        backend.submit(set, WaitRequest::new(buffer))
    }

    /// Takes back a buffer returned by a completion. Clears it first, so nothing
    /// from this round can be read as a result of the next one.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::BufferSlot`] if the buffer's tag isn't in flight.
    pub fn retire(&mut self, mut buffer: TaggedBuffer) -> Result<(), BackendError> {
        let tag = buffer.tag();
        let slot = &mut self.slots[tag.index()];
        if !matches!(slot, BufferSlot::InFlight) {
            return Err(BackendError::BufferSlot {
                tag,
                problem: BufferSlotProblem::NotInFlight,
            });
        }
        buffer.clear();
        *slot = BufferSlot::Retired(buffer);
        Ok(())
    }
}
