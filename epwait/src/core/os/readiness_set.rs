// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words CLOEXEC EINTR epoll timespec

use super::{ReadinessSource, RegistrationOp, SetupError, SourceId};
use rustix::{buffer::spare_capacity,
             event::epoll::{self, CreateFlags, Event, EventData, EventFlags},
             io::Errno,
             time::Timespec};
use std::{os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd},
          sync::Arc};

/// How long a harvest may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Report what is ready right now (timeout `0`).
    Immediate,
    /// Block until at least one member is ready.
    Forever,
}

impl WaitTimeout {
    fn as_timespec(self) -> Option<Timespec> {
        match self {
            WaitTimeout::Immediate => Some(Timespec {
                tv_sec: 0,
                tv_nsec: 0,
            }),
            WaitTimeout::Forever => None,
        }
    }
}

/// A level-triggered epoll instance watching [`ReadinessSource`] read ends for
/// `EPOLLIN`.
///
/// Cloning is cheap and shares the same epoll instance: the consumer owns
/// registration, while backends and the watchdog hold clones to harvest and probe.
/// The instance is closed when the last clone drops.
#[derive(Debug, Clone)]
pub struct ReadinessSet {
    epoll_fd: Arc<OwnedFd>,
    capacity: usize,
}

impl ReadinessSet {
    /// `capacity` is the set's cardinality, which bounds every harvest.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::SetCreation`] if `epoll_create1(2)` fails.
    pub fn create(capacity: usize) -> Result<Self, SetupError> {
        let epoll_fd = epoll::create(CreateFlags::CLOEXEC)
            .map_err(|errno| SetupError::SetCreation(errno.into()))?;
        Ok(Self {
            epoll_fd: Arc::new(epoll_fd),
            capacity,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Whether `other` is a clone of this set, sharing its epoll instance.
    #[must_use]
    pub fn is_same_instance(&self, other: &ReadinessSet) -> bool {
        Arc::ptr_eq(&self.epoll_fd, &other.epoll_fd)
    }

    /// How many handles share the epoll instance. It closes when the last one drops.
    #[must_use]
    pub fn handle_count(&self) -> usize { Arc::strong_count(&self.epoll_fd) }

    /// # Errors
    ///
    /// Returns [`SetupError::Registration`], e.g. when the source is already a member.
    pub fn add(&self, source: &ReadinessSource) -> Result<(), SetupError> {
        epoll::add(
            self.as_fd(),
            source.read_end(),
            EventData::new_u64(source.id().as_u64()),
            EventFlags::IN,
        )
        .map_err(|errno| registration_error(RegistrationOp::Add, source.id(), errno))
    }

    /// # Errors
    ///
    /// Returns [`SetupError::Registration`], e.g. when the source isn't a member.
    pub fn remove(&self, source: &ReadinessSource) -> Result<(), SetupError> {
        epoll::delete(self.as_fd(), source.read_end()).map_err(|errno| {
            registration_error(RegistrationOp::Remove, source.id(), errno)
        })
    }

    /// Clears `entries` and fills it with up to [`capacity()`] ready members. Retries
    /// on `EINTR`.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `epoll_wait(2)`.
    ///
    /// [`capacity()`]: Self::capacity
    pub fn wait_into(
        &self,
        entries: &mut Vec<Event>,
        timeout: WaitTimeout,
    ) -> rustix::io::Result<usize> {
        entries.clear();
        entries.reserve_exact(self.capacity.max(1));
        let timespec = timeout.as_timespec();
        loop {
            match epoll::wait(self.as_fd(), spare_capacity(&mut *entries), timespec.as_ref()) {
                Ok(_) => break,
                Err(Errno::INTR) => {}
                Err(errno) => return Err(errno),
            }
        }
        // Level-triggered, so anything cut off here is reported again next time.
        entries.truncate(self.capacity);
        Ok(entries.len())
    }

    /// Direct non-blocking poll, used for diagnostics only. Doesn't touch any buffer
    /// owned by an outstanding wait request.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `epoll_wait(2)`.
    pub fn probe(&self) -> std::io::Result<usize> {
        let mut scratch = Vec::with_capacity(self.capacity.max(1));
        Ok(self.wait_into(&mut scratch, WaitTimeout::Immediate)?)
    }
}

fn registration_error(op: RegistrationOp, id: SourceId, errno: Errno) -> SetupError {
    SetupError::Registration {
        op,
        id,
        source: errno.into(),
    }
}

/// Maps a harvested event back to the source that produced it.
#[must_use]
pub fn source_id_of(event: &Event) -> Option<SourceId> {
    // Copy out first, the struct is packed on some targets.
    let data = event.data;
    SourceId::from_u64(data.u64())
}

impl AsFd for ReadinessSet {
    fn as_fd(&self) -> BorrowedFd<'_> { self.epoll_fd.as_fd() }
}

impl AsRawFd for ReadinessSet {
    fn as_raw_fd(&self) -> RawFd { self.epoll_fd.as_raw_fd() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReadinessSources;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_reports_only_ready_members() {
        let sources = ReadinessSources::create(3).unwrap();
        let set = ReadinessSet::create(sources.len()).unwrap();
        for source in &sources {
            set.add(source).unwrap();
        }

        assert_eq!(set.probe().unwrap(), 0);

        sources.get(SourceId(1)).unwrap().write_marker(b"foo").unwrap();
        let mut entries = vec![];
        assert_eq!(set.wait_into(&mut entries, WaitTimeout::Immediate).unwrap(), 1);
        assert_eq!(source_id_of(&entries[0]), Some(SourceId(1)));

        // Level-triggered: still ready until drained.
        assert_eq!(set.probe().unwrap(), 1);
        let mut chunk = [0_u8; 32];
        sources.get(SourceId(1)).unwrap().drain(&mut chunk).unwrap();
        assert_eq!(set.probe().unwrap(), 0);
    }

    #[test]
    fn removed_member_is_not_reported() {
        let sources = ReadinessSources::create(2).unwrap();
        let set = ReadinessSet::create(sources.len()).unwrap();
        for source in &sources {
            set.add(source).unwrap();
        }
        let first = sources.get(SourceId(0)).unwrap();
        set.remove(first).unwrap();
        first.write_marker(b"foo").unwrap();
        assert_eq!(set.probe().unwrap(), 0);

        // Removing twice and adding twice both fail.
        assert!(matches!(
            set.remove(first),
            Err(SetupError::Registration {
                op: RegistrationOp::Remove,
                ..
            })
        ));
        set.add(first).unwrap();
        assert!(set.add(first).is_err());
        assert_eq!(set.probe().unwrap(), 1);
    }

    #[test]
    fn clones_share_one_instance() {
        let set = ReadinessSet::create(1).unwrap();
        let other = ReadinessSet::create(1).unwrap();
        assert_eq!(set.handle_count(), 1);

        let clone = set.clone();
        assert!(clone.is_same_instance(&set));
        assert!(!other.is_same_instance(&set));
        assert_eq!(set.handle_count(), 2);

        drop(clone);
        assert_eq!(set.handle_count(), 1);
    }

    #[test]
    fn harvest_never_exceeds_capacity() {
        let sources = ReadinessSources::create(4).unwrap();
        let set = ReadinessSet::create(2).unwrap();
        for source in &sources {
            set.add(source).unwrap();
            source.write_marker(b"foo").unwrap();
        }
        let mut entries = Vec::with_capacity(16);
        assert_eq!(set.wait_into(&mut entries, WaitTimeout::Forever).unwrap(), 2);
    }
}
