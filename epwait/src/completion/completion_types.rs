// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words EINVAL EOPNOTSUPP errno

use super::{BufferTag, TaggedBuffer};
use crate::ReadinessSet;
use miette::Diagnostic;
use rustix::io::Errno;

/// A request to be told when at least one member of a set is ready. The buffer moves
/// into the request and comes back in the [`CompletionRecord`].
#[derive(Debug)]
pub struct WaitRequest {
    pub buffer: TaggedBuffer,
}

impl WaitRequest {
    #[must_use]
    pub fn new(buffer: TaggedBuffer) -> Self { Self { buffer } }

    #[must_use]
    pub fn tag(&self) -> BufferTag { self.buffer.tag() }
}

/// What a satisfied [`WaitRequest`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// This many ready members were written into the buffer.
    Ready(usize),
    /// The primitive rejected the request. The runner treats this as a skip.
    Unsupported,
    /// Any other negative result. Fatal to the race.
    Failed(Errno),
}

impl CompletionOutcome {
    /// Classifies a negative kernel result (`-errno`).
    #[must_use]
    pub fn from_negative_result(result: i32) -> Self {
        let errno = Errno::from_raw_os_error(result.saturating_neg());
        Self::from_errno(errno)
    }

    #[must_use]
    pub fn from_errno(errno: Errno) -> Self {
        match errno {
            Errno::INVAL | Errno::OPNOTSUPP => CompletionOutcome::Unsupported,
            other => CompletionOutcome::Failed(other),
        }
    }
}

/// Produced exactly once per satisfied [`WaitRequest`].
///
/// For [`CompletionOutcome::Ready(n)`], `n == buffer.len() <= buffer.capacity()`.
///
/// [`CompletionOutcome::Ready(n)`]: CompletionOutcome::Ready
#[derive(Debug)]
pub struct CompletionRecord {
    pub buffer: TaggedBuffer,
    pub outcome: CompletionOutcome,
}

impl CompletionRecord {
    /// Builds a record from a harvest of `buffer`.
    #[must_use]
    pub fn from_harvest(buffer: TaggedBuffer, harvest: rustix::io::Result<usize>) -> Self {
        let outcome = match harvest {
            Ok(count) => CompletionOutcome::Ready(count),
            Err(errno) => CompletionOutcome::from_errno(errno),
        };
        Self { buffer, outcome }
    }

    #[must_use]
    pub fn tag(&self) -> BufferTag { self.buffer.tag() }
}

/// The asynchronous wait primitive.
///
/// Up to two requests (one per [`BufferTag`]) may be outstanding, and their
/// completions may come back in either order.
pub trait CompletionBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Hands a request to wait on `set` to the primitive, with a zero timeout once it
    /// runs. Doesn't block.
    ///
    /// The backend only borrows `set` while queuing the request. Whether it keeps the
    /// set open afterwards is up to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the request can't be queued, or a request with the
    /// same tag is still outstanding.
    fn submit(&mut self, set: &ReadinessSet, request: WaitRequest) -> Result<(), BackendError>;

    /// Blocks until one outstanding request completes.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if nothing is outstanding or delivery broke down. A
    /// failed *completion* is not an error here, it is reported in
    /// [`CompletionRecord::outcome`].
    fn wait_for_completion(&mut self) -> Result<CompletionRecord, BackendError>;

    /// Returns a completion if one is already available, without blocking.
    ///
    /// # Errors
    ///
    /// Same as [`wait_for_completion()`], except that having nothing outstanding is
    /// `Ok(None)`.
    ///
    /// [`wait_for_completion()`]: Self::wait_for_completion
    fn try_completion(&mut self) -> Result<Option<CompletionRecord>, BackendError>;
}

/// Why a buffer slot operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum BufferSlotProblem {
    #[strum(serialize = "is already in flight")]
    AlreadyInFlight,
    #[strum(serialize = "is not in flight")]
    NotInFlight,
}

/// Failures of the delivery machinery itself, as opposed to a failed completion.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum BackendError {
    #[error("Buffer {tag} {problem}")]
    #[diagnostic(
        code(uring_epwait::backend::buffer_slot),
        help("Each tag may have at most one outstanding request, re-arm only after draining")
    )]
    BufferSlot {
        tag: BufferTag,
        problem: BufferSlotProblem,
    },

    #[error("No wait request is outstanding")]
    #[diagnostic(code(uring_epwait::backend::nothing_in_flight))]
    NothingInFlight,

    #[error("The submission queue is full")]
    #[diagnostic(
        code(uring_epwait::backend::submission_queue_full),
        help("At most two requests should ever be outstanding")
    )]
    SubmissionQueueFull,

    #[error("Completion carried unknown user data {user_data}")]
    #[diagnostic(code(uring_epwait::backend::unknown_user_data))]
    UnknownUserData { user_data: u64 },

    #[error("Failed to enter the io_uring ring")]
    #[diagnostic(code(uring_epwait::backend::ring_enter))]
    RingEnter(#[source] std::io::Error),

    #[error("This backend can only wait on the set it was created for")]
    #[diagnostic(code(uring_epwait::backend::foreign_set))]
    ForeignSet,

    #[error("The delivery thread is gone")]
    #[diagnostic(
        code(uring_epwait::backend::delivery_disconnected),
        help("The delivery thread exits on shutdown or when its poll fails")
    )]
    DeliveryDisconnected,
}
