// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use crate::{AtomicBoolExt, AtomicU64Ext, ConsumerState};
use std::sync::atomic::{AtomicBool, AtomicU64};

/// Counters and flags observed across the race threads. No locks: every field has a
/// single writer and is only touched through atomics.
///
/// | Field              | Writer   | Readers                    |
/// | :----------------- | :------- | :------------------------- |
/// | `ticks`            | producer | watchdog, consumer         |
/// | `bytes_written`    | producer | watchdog, consumer         |
/// | `write_errors`     | producer | consumer                   |
/// | `consumer_waiting` | consumer | watchdog                   |
/// | `run`              | consumer | watchdog, producer         |
#[derive(Debug)]
pub struct SharedProgressState {
    ticks: AtomicU64,
    bytes_written: AtomicU64,
    write_errors: AtomicU64,
    consumer_waiting: AtomicBool,
    run: AtomicBool,
}

/// The producer's counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub ticks: u64,
    pub bytes: u64,
}

impl Default for SharedProgressState {
    fn default() -> Self { Self::new() }
}

impl SharedProgressState {
    /// Zeroed counters, consumer not waiting, run flag set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            consumer_waiting: AtomicBool::new(false),
            run: AtomicBool::new(true),
        }
    }

    // Producer side.

    pub fn add_bytes(&self, count: u64) { self.bytes_written.add_and_get(count); }

    pub fn record_write_error(&self) { self.write_errors.increment(); }

    pub fn record_round(&self) -> u64 { self.ticks.increment() }

    // Consumer side.

    pub fn set_consumer_state(&self, state: ConsumerState) {
        self.consumer_waiting.set(state == ConsumerState::Waiting);
    }

    pub fn stop(&self) { self.run.set(false); }

    // Readers.

    #[must_use]
    pub fn consumer_state(&self) -> ConsumerState { self.consumer_waiting.get().into() }

    #[must_use]
    pub fn is_running(&self) -> bool { self.run.get() }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            ticks: self.ticks.get(),
            bytes: self.bytes_written.get(),
        }
    }

    #[must_use]
    pub fn write_errors(&self) -> u64 { self.write_errors.get() }
}
