// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

use crate::{ReadinessSet, SourceId, WaitTimeout};
use std::fmt::{Debug, Formatter};

/// Identifies one of the two result buffers. Tag `N` always names buffer `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum BufferTag {
    #[strum(serialize = "0")]
    Zero,
    #[strum(serialize = "1")]
    One,
}

impl BufferTag {
    pub const ALL: [BufferTag; 2] = [BufferTag::Zero, BufferTag::One];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            BufferTag::Zero => 0,
            BufferTag::One => 1,
        }
    }

    /// The value carried through the kernel (or the delivery channel) to identify the
    /// request.
    #[must_use]
    pub fn user_data(self) -> u64 { self.index() as u64 }

    #[must_use]
    pub fn from_user_data(user_data: u64) -> Option<Self> {
        match user_data {
            0 => Some(BufferTag::Zero),
            1 => Some(BufferTag::One),
            _ => None,
        }
    }
}

const EMPTY_ENTRY: libc::epoll_event = libc::epoll_event { events: 0, u64: 0 };

/// A fixed-capacity result buffer that always knows its own [`BufferTag`].
///
/// The entries are a heap slice of `epoll_event` that never moves or resizes, so its
/// address can be handed to the kernel for the lifetime of a wait request. Every
/// entry is always initialized, and only the first [`len()`] are meaningful.
///
/// Only the delivery side fills it ([`harvest()`], or the kernel followed by
/// [`set_filled()`]); the consumer reads [`ready_sources()`] and then [`clear()`]s
/// it before the buffer goes out again.
///
/// [`clear()`]: Self::clear
/// [`harvest()`]: Self::harvest
/// [`len()`]: Self::len
/// [`ready_sources()`]: Self::ready_sources
/// [`set_filled()`]: Self::set_filled
pub struct TaggedBuffer {
    tag: BufferTag,
    entries: Box<[libc::epoll_event]>,
    len: usize,
}

impl TaggedBuffer {
    #[must_use]
    pub fn new(tag: BufferTag, capacity: usize) -> Self {
        Self {
            tag,
            entries: vec![EMPTY_ENTRY; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    #[must_use]
    pub fn tag(&self) -> BufferTag { self.tag }

    #[must_use]
    pub fn capacity(&self) -> usize { self.entries.len() }

    #[must_use]
    pub fn len(&self) -> usize { self.len }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Replaces the contents with what is ready in `set` right now (or once something
    /// is, for [`WaitTimeout::Forever`]). Never holds more than [`capacity()`] entries.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `epoll_wait(2)`. The buffer is left empty.
    ///
    /// [`capacity()`]: Self::capacity
    pub fn harvest(
        &mut self,
        set: &ReadinessSet,
        timeout: WaitTimeout,
    ) -> rustix::io::Result<usize> {
        self.clear();
        let mut events = Vec::with_capacity(self.capacity());
        set.wait_into(&mut events, timeout)?;
        for (slot, event) in self.entries.iter_mut().zip(&events) {
            // Copy out first, the struct is packed on some targets.
            let flags = event.flags;
            let data = event.data;
            *slot = libc::epoll_event {
                events: flags.bits(),
                u64: data.u64(),
            };
            self.len += 1;
        }
        Ok(self.len)
    }

    /// Empties the buffer and returns where the kernel may write, plus how many
    /// entries fit. The pointer stays valid until this buffer is dropped, and does
    /// not change when the buffer moves.
    pub fn kernel_target(&mut self) -> (*mut libc::epoll_event, u32) {
        self.clear();
        let max_events = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        (self.entries.as_mut_ptr(), max_events)
    }

    /// Records that the first `count` entries were written by the kernel. Clamped to
    /// [`capacity()`]; the caller decides what an oversized count means.
    ///
    /// [`capacity()`]: Self::capacity
    pub fn set_filled(&mut self, count: usize) { self.len = count.min(self.capacity()); }

    /// Sources reported ready, in the order they were reported.
    pub fn ready_sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.entries[..self.len].iter().filter_map(|entry| {
            let data = entry.u64;
            SourceId::from_u64(data)
        })
    }

    /// Zeroes the consumed entries, so nothing from this round can be read as part of
    /// the next one.
    pub fn clear(&mut self) {
        self.entries[..self.len].fill(EMPTY_ENTRY);
        self.len = 0;
    }

    /// Test helper: fills the buffer as if these sources were reported.
    #[cfg(test)]
    pub(crate) fn fill_with(&mut self, ids: &[SourceId]) {
        self.clear();
        for (slot, id) in self.entries.iter_mut().zip(ids) {
            *slot = libc::epoll_event {
                events: libc::EPOLLIN as u32,
                u64: id.as_u64(),
            };
            self.len += 1;
        }
    }
}

impl Debug for TaggedBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedBuffer")
            .field("tag", &self.tag)
            .field("capacity", &self.capacity())
            .field("ready", &self.ready_sources().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadinessFixture;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn assert_send<T: Send>() {}

    #[test_case(BufferTag::Zero, 0)]
    #[test_case(BufferTag::One, 1)]
    fn tag_maps_to_index_and_user_data(tag: BufferTag, index: usize) {
        assert_eq!(tag.index(), index);
        assert_eq!(BufferTag::from_user_data(tag.user_data()), Some(tag));
        assert_eq!(tag.to_string(), index.to_string());
    }

    #[test]
    fn foreign_user_data_has_no_tag() {
        assert_eq!(BufferTag::from_user_data(2), None);
    }

    #[test]
    fn buffer_can_cross_threads() {
        assert_send::<TaggedBuffer>();
        let buffer = TaggedBuffer::new(BufferTag::One, 2);
        let buffer = std::thread::spawn(move || buffer).join().unwrap();
        assert_eq!(
            format!("{buffer:?}"),
            "TaggedBuffer { tag: One, capacity: 2, ready: [] }"
        );
    }

    #[test]
    fn harvest_then_clear() {
        let fixture = ReadinessFixture::create(3).unwrap();
        let mut buffer = TaggedBuffer::new(BufferTag::One, fixture.set.capacity());

        assert_eq!(buffer.harvest(&fixture.set, WaitTimeout::Immediate).unwrap(), 0);
        assert!(buffer.is_empty());

        fixture.sources.get(SourceId(2)).unwrap().write_marker(b"foo").unwrap();
        assert_eq!(buffer.harvest(&fixture.set, WaitTimeout::Immediate).unwrap(), 1);
        assert_eq!(buffer.ready_sources().collect::<Vec<_>>(), vec![SourceId(2)]);

        buffer.clear();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.tag(), BufferTag::One);
        assert_eq!(buffer.capacity(), 3);
    }

    #[test]
    fn kernel_target_is_stable_across_moves() {
        let mut buffer = TaggedBuffer::new(BufferTag::Zero, 4);
        buffer.fill_with(&[SourceId(1)]);
        let (ptr, max_events) = buffer.kernel_target();
        assert_eq!(max_events, 4);
        assert!(buffer.is_empty());

        let mut moved = Box::new(buffer);
        assert_eq!(moved.kernel_target().0, ptr);
    }

    #[test]
    fn set_filled_is_clamped_to_capacity() {
        let mut buffer = TaggedBuffer::new(BufferTag::Zero, 2);
        buffer.set_filled(5);
        assert_eq!(buffer.len(), 2);
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
