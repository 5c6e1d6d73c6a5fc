// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words CQE CQEs EINTR epoll errno SQPOLL taskrun

use super::{BackendError, BufferSlotProblem, BufferTag, CompletionBackend,
            CompletionOutcome, CompletionRecord, RING_ENTRIES, RingSetup, TaggedBuffer,
            WaitRequest};
use crate::{ReadinessSet, SetupError};
use io_uring::{IoUring, opcode, squeue, types};
use std::{io::ErrorKind, os::fd::AsRawFd as _};

/// User data of the cancellations pushed on drop. Never a valid [`BufferTag`].
const CANCEL_USER_DATA: u64 = u64::MAX;

/// Kernel-side wait: each request is an `IORING_OP_EPOLL_WAIT` on the set's epoll fd,
/// tagged with its [`BufferTag`] as user data. The kernel writes the ready members
/// straight into the request's buffer, and the CQE result is how many it wrote.
///
/// The backend doesn't hold on to the set. Once an SQE is issued the kernel keeps its
/// own reference to the epoll file, so the caller may close the set while a request
/// is pending.
///
/// # Buffer lifetime
///
/// A submitted buffer sits in [`in_flight`] until its CQE is reaped. Dropping the
/// backend cancels anything still pending and waits for the kernel to let go of the
/// buffers. If it can't, the buffers are leaked rather than freed under the kernel.
///
/// [`in_flight`]: Self::in_flight
#[allow(missing_debug_implementations)]
pub struct UringBackend {
    pub ring: IoUring,
    pub setup: RingSetup,
    in_flight: [Option<TaggedBuffer>; 2],
}

impl UringBackend {
    /// # Errors
    ///
    /// Returns [`SetupError::RingUnsupported`] when this host can't run `setup` (a
    /// skip), or [`SetupError::RingCreation`] for anything else.
    pub fn create(setup: RingSetup) -> Result<Self, SetupError> {
        let mut builder = IoUring::builder();
        setup.configure(&mut builder);
        let ring = builder
            .build(RING_ENTRIES)
            .map_err(|err| SetupError::from_ring_creation(setup, err))?;
        tracing::debug!(message = "ring created", %setup, entries = RING_ENTRIES);
        Ok(Self {
            ring,
            setup,
            in_flight: [None, None],
        })
    }

    fn push(&mut self, entry: &squeue::Entry) -> Result<(), BackendError> {
        // SAFETY: every entry pushed here either references no user memory, or points
        // into a buffer held in `in_flight` until its CQE is reaped.
        unsafe { self.ring.submission().push(entry) }
            .map_err(|_| BackendError::SubmissionQueueFull)
    }

    fn enter_and_wait(&mut self) -> Result<(), BackendError> {
        loop {
            match self.ring.submit_and_wait(1) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(BackendError::RingEnter(err)),
            }
        }
    }

    fn has_in_flight(&self) -> bool { self.in_flight.iter().any(Option::is_some) }

    fn reap(&mut self, result: i32, user_data: u64) -> Result<CompletionRecord, BackendError> {
        let tag = BufferTag::from_user_data(user_data)
            .ok_or(BackendError::UnknownUserData { user_data })?;
        let mut buffer =
            self.in_flight[tag.index()]
                .take()
                .ok_or(BackendError::BufferSlot {
                    tag,
                    problem: BufferSlotProblem::NotInFlight,
                })?;

        let outcome = match usize::try_from(result) {
            Ok(count) => {
                buffer.set_filled(count);
                CompletionOutcome::Ready(count)
            }
            Err(_) => CompletionOutcome::from_negative_result(result),
        };
        Ok(CompletionRecord { buffer, outcome })
    }

    fn cancel_in_flight(&mut self) -> Result<(), BackendError> {
        for tag in BufferTag::ALL {
            if self.in_flight[tag.index()].is_some() {
                let entry = opcode::AsyncCancel::new(tag.user_data())
                    .build()
                    .user_data(CANCEL_USER_DATA);
                self.push(&entry)?;
            }
        }
        while self.has_in_flight() {
            self.enter_and_wait()?;
            while let Some(cqe) = self.ring.completion().next() {
                if let Some(tag) = BufferTag::from_user_data(cqe.user_data()) {
                    self.in_flight[tag.index()] = None;
                }
            }
        }
        Ok(())
    }
}

impl CompletionBackend for UringBackend {
    fn name(&self) -> &'static str { "io_uring" }

    fn submit(&mut self, set: &ReadinessSet, request: WaitRequest) -> Result<(), BackendError> {
        let tag = request.tag();
        let slot = &mut self.in_flight[tag.index()];
        if slot.is_some() {
            return Err(BackendError::BufferSlot {
                tag,
                problem: BufferSlotProblem::AlreadyInFlight,
            });
        }
        let buffer = slot.insert(request.buffer);
        let (events, max_events) = buffer.kernel_target();
        let entry = opcode::EpollWait::new(
            types::Fd(set.as_raw_fd()),
            events.cast::<types::epoll_event>(),
            max_events,
        )
        .build()
        .user_data(tag.user_data());

        if let Err(err) = self.push(&entry) {
            self.in_flight[tag.index()] = None;
            return Err(err);
        }
        // Issues the SQE now, while the caller's set is still open.
        self.ring.submit().map_err(BackendError::RingEnter)?;
        Ok(())
    }

    fn wait_for_completion(&mut self) -> Result<CompletionRecord, BackendError> {
        loop {
            if !self.has_in_flight() {
                return Err(BackendError::NothingInFlight);
            }
            let next = self.ring.completion().next();
            match next {
                Some(cqe) => return self.reap(cqe.result(), cqe.user_data()),
                None => self.enter_and_wait()?,
            }
        }
    }

    fn try_completion(&mut self) -> Result<Option<CompletionRecord>, BackendError> {
        if !self.has_in_flight() {
            return Ok(None);
        }
        // Flushes the SQ without waiting. A DEFER_TASKRUN ring may still be holding a
        // finished request until the next blocking enter.
        self.ring.submit().map_err(BackendError::RingEnter)?;
        let next = self.ring.completion().next();
        next.map(|cqe| self.reap(cqe.result(), cqe.user_data()))
            .transpose()
    }
}

impl Drop for UringBackend {
    fn drop(&mut self) {
        if !self.has_in_flight() {
            return;
        }
        if let Err(err) = self.cancel_in_flight() {
            tracing::warn!(
                message = "couldn't cancel pending waits, leaking their buffers",
                setup = %self.setup,
                error = %err
            );
            for slot in &mut self.in_flight {
                if let Some(buffer) = slot.take() {
                    std::mem::forget(buffer);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReadinessFixture, SourceId};
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    fn request(tag: BufferTag, capacity: usize) -> WaitRequest {
        WaitRequest::new(TaggedBuffer::new(tag, capacity))
    }

    #[test]
    #[serial]
    fn kernel_writes_ready_members_into_the_buffer() {
        for setup in RingSetup::ALL {
            let fixture = ReadinessFixture::create(4).unwrap();
            let Ok(mut backend) = UringBackend::create(setup) else {
                continue;
            };
            backend.submit(&fixture.set, request(BufferTag::One, 4)).unwrap();
            for id in [SourceId(1), SourceId(3)] {
                fixture.sources.get(id).unwrap().write_marker(b"foo").unwrap();
            }

            let record = backend.wait_for_completion().unwrap();
            if record.outcome == CompletionOutcome::Unsupported {
                continue;
            }
            assert_eq!(record.tag(), BufferTag::One, "{setup}");
            let CompletionOutcome::Ready(count) = record.outcome else {
                panic!("{setup}: {:?}", record.outcome);
            };
            // The wait may fire between the two writes.
            assert!((1..=2).contains(&count), "{setup}: {count}");
            assert_eq!(record.buffer.len(), count);
            let ids: Vec<_> = record.buffer.ready_sources().collect();
            assert_eq!(ids.len(), count);
            assert!(ids.iter().all(|id| [SourceId(1), SourceId(3)].contains(id)));
        }
    }

    #[test]
    #[serial]
    fn backend_does_not_keep_the_set_open() {
        let fixture = ReadinessFixture::create(2).unwrap();
        let Ok(mut backend) = UringBackend::create(RingSetup::Default) else {
            return;
        };
        backend.submit(&fixture.set, request(BufferTag::Zero, 2)).unwrap();
        assert_eq!(fixture.set.handle_count(), 1);
    }

    #[test]
    #[serial]
    fn dropping_with_pending_waits_returns() {
        for setup in RingSetup::ALL {
            let fixture = ReadinessFixture::create(2).unwrap();
            let Ok(mut backend) = UringBackend::create(setup) else {
                continue;
            };
            backend.submit(&fixture.set, request(BufferTag::Zero, 2)).unwrap();
            backend.submit(&fixture.set, request(BufferTag::One, 2)).unwrap();
            drop(backend);
        }
    }

    #[test]
    #[serial]
    fn same_tag_twice_is_refused() {
        let fixture = ReadinessFixture::create(2).unwrap();
        let Ok(mut backend) = UringBackend::create(RingSetup::Default) else {
            return;
        };
        backend.submit(&fixture.set, request(BufferTag::Zero, 2)).unwrap();
        let result = backend.submit(&fixture.set, request(BufferTag::Zero, 2));
        assert!(matches!(
            result,
            Err(BackendError::BufferSlot {
                tag: BufferTag::Zero,
                problem: BufferSlotProblem::AlreadyInFlight
            })
        ));
    }

    #[test]
    #[serial]
    fn waiting_with_nothing_in_flight_is_an_error() {
        let Ok(mut backend) = UringBackend::create(RingSetup::Default) else {
            return;
        };
        assert!(matches!(
            backend.wait_for_completion(),
            Err(BackendError::NothingInFlight)
        ));
        assert!(backend.try_completion().unwrap().is_none());
    }
}
