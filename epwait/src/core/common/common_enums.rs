// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

/// Whether a loop (or the thread running it) should keep going.
///
/// Returned by one iteration of a worker loop, such as the delivery thread's
/// [`serve_once()`], instead of a bare `bool`.
///
/// [`serve_once()`]: crate::completion::reactor_backend::DeliveryWorker::serve_once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Continue to the next iteration.
    #[default]
    Continue,

    /// Stop processing and exit the loop/thread.
    Stop,
}

/// Whether the consumer is currently parked inside "wait for completion".
///
/// The consumer is the only writer; the watchdog reads it to decide whether an
/// observation window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerState {
    /// Blocked waiting for a completion record.
    Waiting,
    /// Draining, re-arming, or not started.
    #[default]
    Running,
}

impl From<bool> for ConsumerState {
    fn from(is_waiting: bool) -> Self {
        if is_waiting {
            Self::Waiting
        } else {
            Self::Running
        }
    }
}
