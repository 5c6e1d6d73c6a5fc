// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

use super::{BackendError, BufferSlotProblem, CompletionBackend, CompletionRecord,
            TaggedBuffer, WaitRequest};
use crate::{ReadinessSet, WaitTimeout};
use std::collections::VecDeque;

/// The control: no asynchronous primitive at all. Submitting just queues the buffer
/// with a handle to its set, and [`wait_for_completion()`] blocks in `epoll_wait(2)` on
/// the caller's thread, filling the oldest queued buffer.
///
/// If the race hangs on this backend too, the problem is in the harness or the host,
/// not in the asynchronous primitive.
///
/// [`wait_for_completion()`]: CompletionBackend::wait_for_completion
#[derive(Debug, Default)]
pub struct BlockingEpollBackend {
    queued: VecDeque<(ReadinessSet, TaggedBuffer)>,
}

impl BlockingEpollBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queued: VecDeque::with_capacity(2),
        }
    }

    fn complete(&mut self, timeout: WaitTimeout) -> Option<CompletionRecord> {
        let (set, mut buffer) = self.queued.pop_front()?;
        let harvest = buffer.harvest(&set, timeout);
        if matches!(harvest, Ok(0)) {
            self.queued.push_front((set, buffer));
            return None;
        }
        Some(CompletionRecord::from_harvest(buffer, harvest))
    }
}

impl CompletionBackend for BlockingEpollBackend {
    fn name(&self) -> &'static str { "epoll" }

    fn submit(&mut self, set: &ReadinessSet, request: WaitRequest) -> Result<(), BackendError> {
        let tag = request.tag();
        if self.queued.iter().any(|(_, it)| it.tag() == tag) {
            return Err(BackendError::BufferSlot {
                tag,
                problem: BufferSlotProblem::AlreadyInFlight,
            });
        }
        self.queued.push_back((set.clone(), request.buffer));
        Ok(())
    }

    fn wait_for_completion(&mut self) -> Result<CompletionRecord, BackendError> {
        if self.queued.is_empty() {
            return Err(BackendError::NothingInFlight);
        }
        loop {
            if let Some(record) = self.complete(WaitTimeout::Forever) {
                return Ok(record);
            }
        }
    }

    fn try_completion(&mut self) -> Result<Option<CompletionRecord>, BackendError> {
        Ok(self.complete(WaitTimeout::Immediate))
    }
}
