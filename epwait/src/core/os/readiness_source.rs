// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words CLOEXEC FIONBIO

use super::SetupError;
use rustix::{io::Errno,
             pipe::{PipeFlags, pipe_with}};
use std::{fmt::{Display, Formatter},
          os::fd::{AsFd, BorrowedFd, OwnedFd}};

/// Index of a [`ReadinessSource`] in its [`ReadinessSources`] collection. This is also
/// the `u64` payload registered with the epoll set, so every harvested event maps back
/// to a source without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u32);

impl SourceId {
    #[must_use]
    pub fn as_u64(self) -> u64 { u64::from(self.0) }

    #[must_use]
    pub fn index(self) -> usize { self.0 as usize }

    /// Returns [`None`] if the payload didn't come from [`as_u64()`].
    ///
    /// [`as_u64()`]: Self::as_u64
    #[must_use]
    pub fn from_u64(payload: u64) -> Option<Self> { u32::try_from(payload).ok().map(Self) }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "#{}", self.0) }
}

/// A pipe pair whose readable end becomes ready when bytes are written to the writable
/// end, and goes back to not-ready once a [`drain()`] empties it.
///
/// The readable end is non-blocking so a drain can read until `EAGAIN`. The writable
/// end stays blocking; the producer's markers are tiny compared to the pipe buffer.
///
/// [`drain()`]: Self::drain
#[derive(Debug)]
pub struct ReadinessSource {
    id: SourceId,
    read_end: OwnedFd,
    write_end: OwnedFd,
}

impl ReadinessSource {
    /// # Errors
    ///
    /// Returns [`SetupError::SourceCreation`] if the pipe can't be created or its read
    /// end can't be made non-blocking.
    pub fn create(id: SourceId) -> Result<Self, SetupError> {
        let to_setup_error = |errno: Errno| SetupError::SourceCreation {
            id,
            source: errno.into(),
        };
        let (read_end, write_end) =
            pipe_with(PipeFlags::CLOEXEC).map_err(to_setup_error)?;
        rustix::io::ioctl_fionbio(&read_end, true).map_err(to_setup_error)?;
        Ok(Self {
            id,
            read_end,
            write_end,
        })
    }

    #[must_use]
    pub fn id(&self) -> SourceId { self.id }

    /// The end that gets registered on the readiness set.
    #[must_use]
    pub fn read_end(&self) -> BorrowedFd<'_> { self.read_end.as_fd() }

    /// Makes the source ready.
    ///
    /// # Errors
    ///
    /// Returns the OS error from `write(2)`.
    pub fn write_marker(&self, marker: &[u8]) -> std::io::Result<usize> {
        loop {
            match rustix::io::write(&self.write_end, marker) {
                Err(Errno::INTR) => {}
                other => return other.map_err(Into::into),
            }
        }
    }

    /// Reads and discards everything pending, `chunk.len()` bytes at a time, and returns
    /// the byte count. `Ok(0)` means the source wasn't ready (a stale entry).
    ///
    /// # Errors
    ///
    /// Returns the first OS error from `read(2)` other than `EAGAIN` and `EINTR`.
    pub fn drain(&self, chunk: &mut [u8]) -> std::io::Result<usize> {
        let mut total = 0;
        loop {
            match rustix::io::read(&self.read_end, &mut *chunk) {
                // Writer closed.
                Ok(0) => return Ok(total),
                Ok(count) => total += count,
                Err(Errno::INTR) => {}
                Err(Errno::AGAIN) => return Ok(total),
                Err(errno) => return Err(errno.into()),
            }
        }
    }
}

/// The fixed set of sources the producer writes to, indexed by [`SourceId`].
#[derive(Debug)]
pub struct ReadinessSources {
    inner: Vec<ReadinessSource>,
}

impl ReadinessSources {
    /// Creates `count` sources with ids `#0..#count`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SetupError::SourceCreation`]. Sources created before it are
    /// closed.
    pub fn create(count: u32) -> Result<Self, SetupError> {
        let inner = (0..count)
            .map(|it| ReadinessSource::create(SourceId(it)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { inner })
    }

    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<&ReadinessSource> { self.inner.get(id.index()) }

    #[must_use]
    pub fn len(&self) -> usize { self.inner.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.inner.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, ReadinessSource> { self.inner.iter() }
}

impl<'a> IntoIterator for &'a ReadinessSources {
    type Item = &'a ReadinessSource;
    type IntoIter = std::slice::Iter<'a, ReadinessSource>;

    fn into_iter(self) -> Self::IntoIter { self.inner.iter() }
}
