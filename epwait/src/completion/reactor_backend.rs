// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words EINTR epoll

//! Userspace delivery: a dedicated thread blocks in [`mio::Poll`] on the epoll fd and
//! turns readiness into [`CompletionRecord`]s.
//!
//! # Architecture
//!
//! ```text
//! Consumer thread                         Delivery thread ("epwait-delivery")
//! ───────────────                         ───────────────────────────────────
//! submit() ──request_tx──► WaitRequest ──► serve_once()
//!                                            ├─ fault injection
//!                                            ├─ harvest (timeout 0)
//!                                            └─ empty? block in mio::Poll
//! wait_for_completion() ◄──completion_tx── CompletionRecord
//! drop ──shutdown flag + waker──────────► serve_once() returns Stop
//! ```
//!
//! The worker and its waker come from one factory call, [`DeliveryWorker::create()`],
//! because the [`mio::Waker`] must be registered with the worker's own [`mio::Poll`].
//!
//! # EINTR handling
//!
//! [`mio::Poll::poll()`] can fail with `EINTR` when a signal lands. That is retried.
//! Any other poll error ends the thread, and the consumer sees
//! [`BackendError::DeliveryDisconnected`].

use super::{BackendError, BufferSlotProblem, CompletionBackend, CompletionOutcome,
            CompletionRecord, DeliveryFaults, FaultAction, WaitRequest};
use crate::{AtomicBoolExt, Continuation, ReadinessSet, SetupError, WaitTimeout};
use mio::{Events, Interest, Poll, Token, Waker, unix::SourceFd};
use std::{io::ErrorKind,
          os::fd::AsRawFd as _,
          sync::{Arc,
                 atomic::AtomicBool,
                 mpsc::{self, Receiver, Sender, TryRecvError}},
          thread::{self, JoinHandle},
          time::{Duration, Instant}};

/// Token for the watched epoll set.
pub const SET_TOKEN: Token = Token(0);

/// Token for the shutdown [`Waker`].
pub const WAKER_TOKEN: Token = Token(1);

/// Capacity for the [`mio::Events`] buffer. Only two tokens are registered.
const EVENTS_CAPACITY: usize = 4;

/// Injected delays sleep in slices this long so shutdown isn't held up.
const DELAY_SLICE: Duration = Duration::from_millis(10);

/// Newtype wrapping [`mio::Waker`]. Waking makes the worker's blocking
/// [`mio::Poll::poll()`] return so it can notice shutdown.
#[derive(Debug)]
pub struct DeliveryWaker(pub Waker);

impl DeliveryWaker {
    /// The result is discarded: if the poll is gone the thread has already exited.
    pub fn wake_and_unblock_delivery_thread(&self) { let _unused = self.0.wake(); }
}

/// State owned by the delivery thread. See the [module docs](self).
#[allow(missing_debug_implementations)]
pub struct DeliveryWorker {
    pub poll_handle: Poll,
    pub ready_events_buffer: Events,
    pub set: ReadinessSet,
    pub request_rx: Receiver<WaitRequest>,
    pub completion_tx: Sender<CompletionRecord>,
    pub faults: DeliveryFaults,
    /// Completions sent so far, including injected ones.
    pub delivered: u64,
    pub shutdown: Arc<AtomicBool>,
}

impl DeliveryWorker {
    /// Creates the worker and its paired waker.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the [`mio::Poll`] or [`mio::Waker`] can't be created,
    /// or the epoll fd can't be registered.
    pub fn create(
        set: ReadinessSet,
        faults: DeliveryFaults,
        request_rx: Receiver<WaitRequest>,
        completion_tx: Sender<CompletionRecord>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(Self, DeliveryWaker), SetupError> {
        let poll_handle = Poll::new().map_err(SetupError::PollCreation)?;
        let waker = Waker::new(poll_handle.registry(), WAKER_TOKEN)
            .map_err(SetupError::WakerCreation)?;
        let raw_fd = set.as_raw_fd();
        poll_handle
            .registry()
            .register(&mut SourceFd(&raw_fd), SET_TOKEN, Interest::READABLE)
            .map_err(SetupError::SetWatch)?;

        let worker = Self {
            poll_handle,
            ready_events_buffer: Events::with_capacity(EVENTS_CAPACITY),
            set,
            request_rx,
            completion_tx,
            faults,
            delivered: 0,
            shutdown,
        };
        Ok((worker, DeliveryWaker(waker)))
    }

    /// Serves one [`WaitRequest`]: receives it, applies any injected fault, blocks until
    /// the set has ready members, and sends the completion.
    ///
    /// # Returns
    ///
    /// - [`Continuation::Continue`]: Request served.
    /// - [`Continuation::Stop`]: Shutdown, the backend is gone, or the poll failed.
    pub fn serve_once(&mut self) -> Continuation {
        let Ok(mut request) = self.request_rx.recv() else {
            return Continuation::Stop;
        };
        if self.shutdown.get() {
            return Continuation::Stop;
        }

        match self.faults.action_for(self.delivered) {
            FaultAction::Deliver => {}
            FaultAction::Delay(duration) => {
                tracing::info!(
                    message = "injecting delivery delay",
                    delivered = self.delivered,
                    ?duration
                );
                if self.sleep_unless_shutdown(duration) == Continuation::Stop {
                    return Continuation::Stop;
                }
            }
            FaultAction::ReportUnsupported => {
                tracing::info!(message = "injecting unsupported completion");
                return self.send(CompletionRecord {
                    buffer: request.buffer,
                    outcome: CompletionOutcome::Unsupported,
                });
            }
            FaultAction::Fail(errno) => {
                tracing::info!(message = "injecting failed completion", %errno);
                return self.send(CompletionRecord {
                    buffer: request.buffer,
                    outcome: CompletionOutcome::Failed(errno),
                });
            }
        }

        loop {
            match request.buffer.harvest(&self.set, WaitTimeout::Immediate) {
                Ok(0) => {}
                harvest => {
                    return self.send(CompletionRecord::from_harvest(request.buffer, harvest));
                }
            }
            if self.block_until_ready() == Continuation::Stop {
                return Continuation::Stop;
            }
        }
    }

    fn block_until_ready(&mut self) -> Continuation {
        loop {
            match self.poll_handle.poll(&mut self.ready_events_buffer, None) {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    tracing::error!(message = "delivery poll failed", error = ?err);
                    return Continuation::Stop;
                }
            }
        }
        if self.shutdown.get() {
            Continuation::Stop
        } else {
            Continuation::Continue
        }
    }

    fn sleep_unless_shutdown(&self, duration: Duration) -> Continuation {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.get() {
                return Continuation::Stop;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Continuation::Continue;
            }
            thread::sleep(remaining.min(DELAY_SLICE));
        }
    }

    fn send(&mut self, record: CompletionRecord) -> Continuation {
        tracing::trace!(
            message = "delivering completion",
            tag = %record.tag(),
            outcome = ?record.outcome
        );
        self.delivered += 1;
        match self.completion_tx.send(record) {
            Ok(()) => Continuation::Continue,
            Err(_) => Continuation::Stop,
        }
    }
}

/// [`CompletionBackend`] served by a [`DeliveryWorker`] on its own thread.
///
/// The worker's [`mio::Poll`] watches one set for the backend's whole life, so every
/// request must name that set. Dropping the backend stops and joins the thread, even
/// with requests outstanding.
#[allow(missing_debug_implementations)]
pub struct ReactorBackend {
    set: ReadinessSet,
    request_tx: Option<Sender<WaitRequest>>,
    completion_rx: Receiver<CompletionRecord>,
    waker: DeliveryWaker,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
    in_flight: [bool; 2],
}

impl ReactorBackend {
    /// Spawns the delivery thread watching `set`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the worker can't be created or the thread can't be
    /// spawned.
    pub fn create(set: ReadinessSet, faults: DeliveryFaults) -> Result<Self, SetupError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (completion_tx, completion_rx) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let (mut worker, waker) = DeliveryWorker::create(
            set.clone(),
            faults,
            request_rx,
            completion_tx,
            Arc::clone(&shutdown),
        )?;

        let join_handle = thread::Builder::new()
            .name("epwait-delivery".into())
            .spawn(move || {
                while worker.serve_once() == Continuation::Continue {}
                tracing::debug!(
                    message = "delivery thread exiting",
                    delivered = worker.delivered
                );
            })
            .map_err(|source| SetupError::ThreadSpawn {
                name: "delivery",
                source,
            })?;

        Ok(Self {
            set,
            request_tx: Some(request_tx),
            completion_rx,
            waker,
            shutdown,
            join_handle: Some(join_handle),
            in_flight: [false, false],
        })
    }

    fn has_in_flight(&self) -> bool { self.in_flight.iter().any(|it| *it) }

    fn retire(&mut self, record: &CompletionRecord) {
        self.in_flight[record.tag().index()] = false;
    }
}

impl CompletionBackend for ReactorBackend {
    fn name(&self) -> &'static str { "reactor" }

    fn submit(&mut self, set: &ReadinessSet, request: WaitRequest) -> Result<(), BackendError> {
        if !set.is_same_instance(&self.set) {
            return Err(BackendError::ForeignSet);
        }
        let tag = request.tag();
        if self.in_flight[tag.index()] {
            return Err(BackendError::BufferSlot {
                tag,
                problem: BufferSlotProblem::AlreadyInFlight,
            });
        }
        let request_tx = self
            .request_tx
            .as_ref()
            .ok_or(BackendError::DeliveryDisconnected)?;
        request_tx
            .send(request)
            .map_err(|_| BackendError::DeliveryDisconnected)?;
        self.in_flight[tag.index()] = true;
        Ok(())
    }

    fn wait_for_completion(&mut self) -> Result<CompletionRecord, BackendError> {
        if !self.has_in_flight() {
            return Err(BackendError::NothingInFlight);
        }
        let record = self
            .completion_rx
            .recv()
            .map_err(|_| BackendError::DeliveryDisconnected)?;
        self.retire(&record);
        Ok(record)
    }

    fn try_completion(&mut self) -> Result<Option<CompletionRecord>, BackendError> {
        match self.completion_rx.try_recv() {
            Ok(record) => {
                self.retire(&record);
                Ok(Some(record))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) if !self.has_in_flight() => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BackendError::DeliveryDisconnected),
        }
    }
}

impl Drop for ReactorBackend {
    fn drop(&mut self) {
        self.shutdown.set(true);
        // Unblocks a worker waiting for the next request.
        drop(self.request_tx.take());
        // Unblocks a worker inside mio::Poll::poll().
        self.waker.wake_and_unblock_delivery_thread();
        if let Some(join_handle) = self.join_handle.take()
            && join_handle.join().is_err()
        {
            tracing::error!(message = "delivery thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferTag, ReadinessFixture, SourceId, TaggedBuffer};
    use pretty_assertions::assert_eq;
    use rustix::io::Errno;

    fn request(tag: BufferTag, capacity: usize) -> WaitRequest {
        WaitRequest::new(TaggedBuffer::new(tag, capacity))
    }

    #[test]
    fn delivers_after_source_becomes_ready() {
        let fixture = ReadinessFixture::create(2).unwrap();
        let mut backend =
            ReactorBackend::create(fixture.set.clone(), DeliveryFaults::none()).unwrap();

        backend.submit(&fixture.set, request(BufferTag::Zero, 2)).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(backend.try_completion().unwrap().is_none());

        fixture.sources.get(SourceId(0)).unwrap().write_marker(b"foo").unwrap();
        let record = backend.wait_for_completion().unwrap();
        assert_eq!(record.tag(), BufferTag::Zero);
        assert_eq!(record.outcome, CompletionOutcome::Ready(1));
        assert_eq!(
            record.buffer.ready_sources().collect::<Vec<_>>(),
            vec![SourceId(0)]
        );
    }

    #[test]
    fn both_tags_can_be_outstanding() {
        let fixture = ReadinessFixture::create(2).unwrap();
        let mut backend =
            ReactorBackend::create(fixture.set.clone(), DeliveryFaults::none()).unwrap();
        backend.submit(&fixture.set, request(BufferTag::Zero, 2)).unwrap();
        backend.submit(&fixture.set, request(BufferTag::One, 2)).unwrap();
        assert!(matches!(
            backend.submit(&fixture.set, request(BufferTag::One, 2)),
            Err(BackendError::BufferSlot {
                tag: BufferTag::One,
                problem: BufferSlotProblem::AlreadyInFlight
            })
        ));

        for source in &fixture.sources {
            source.write_marker(b"foo").unwrap();
        }
        let mut tags = vec![
            backend.wait_for_completion().unwrap().tag(),
            backend.wait_for_completion().unwrap().tag(),
        ];
        tags.sort_by_key(|it| it.index());
        assert_eq!(tags, vec![BufferTag::Zero, BufferTag::One]);
        assert!(matches!(
            backend.wait_for_completion(),
            Err(BackendError::NothingInFlight)
        ));
    }

    #[test]
    fn requests_on_another_set_are_refused() {
        let fixture = ReadinessFixture::create(1).unwrap();
        let other = ReadinessFixture::create(1).unwrap();
        let mut backend =
            ReactorBackend::create(fixture.set.clone(), DeliveryFaults::none()).unwrap();
        assert!(matches!(
            backend.submit(&other.set, request(BufferTag::Zero, 1)),
            Err(BackendError::ForeignSet)
        ));
        assert!(matches!(
            backend.wait_for_completion(),
            Err(BackendError::NothingInFlight)
        ));
    }

    #[test]
    fn injected_outcomes_are_delivered() {
        let fixture = ReadinessFixture::create(1).unwrap();
        let mut backend =
            ReactorBackend::create(fixture.set.clone(), DeliveryFaults::unsupported())
                .unwrap();
        backend.submit(&fixture.set, request(BufferTag::Zero, 1)).unwrap();
        let record = backend.wait_for_completion().unwrap();
        assert_eq!(record.outcome, CompletionOutcome::Unsupported);
        assert!(record.buffer.is_empty());

        let mut backend = ReactorBackend::create(
            fixture.set.clone(),
            DeliveryFaults::with_failure(0, Errno::IO),
        )
        .unwrap();
        backend.submit(&fixture.set, request(BufferTag::One, 1)).unwrap();
        let record = backend.wait_for_completion().unwrap();
        assert_eq!(record.outcome, CompletionOutcome::Failed(Errno::IO));
    }

    #[test]
    fn drop_with_pending_request_does_not_hang() {
        let fixture = ReadinessFixture::create(1).unwrap();
        let mut backend =
            ReactorBackend::create(fixture.set.clone(), DeliveryFaults::none()).unwrap();
        backend.submit(&fixture.set, request(BufferTag::Zero, 1)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        drop(backend);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn drop_during_injected_delay_does_not_wait_it_out() {
        let fixture = ReadinessFixture::create(1).unwrap();
        fixture.sources.get(SourceId(0)).unwrap().write_marker(b"foo").unwrap();
        let mut backend = ReactorBackend::create(
            fixture.set.clone(),
            DeliveryFaults::with_delay(0, Duration::from_secs(30)),
        )
        .unwrap();
        backend.submit(&fixture.set, request(BufferTag::Zero, 1)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        drop(backend);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
