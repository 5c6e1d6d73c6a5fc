// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words TOCTOU

use super::{ProgressSnapshot, SharedProgressState, WatchdogConfig};
use crate::{ConsumerState, ReadinessSet};
use std::{num::NonZeroUsize,
          thread,
          time::{Duration, Instant}};

/// Window bookkeeping for the watchdog, without the thread or the clock, so the rules
/// can be tested directly.
///
/// 1. Consumer not waiting: any open window is dropped.
/// 2. Consumer waiting, no window: open one with the current counters.
/// 3. Counters moved since the window opened: reopen it with the new counters.
/// 4. Counters frozen for at least the stall window: report a stall and drop the
///    window, so the next report needs another full window of silence.
#[derive(Debug, Clone)]
pub struct StallDetector {
    stall_window: Duration,
    window: Option<ObservationWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    pub opened_at: Instant,
    pub snapshot: ProgressSnapshot,
}

/// A window that stayed silent for long enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallCandidate {
    pub elapsed: Duration,
    /// The counters when the window opened, which are also the current counters.
    pub snapshot: ProgressSnapshot,
}

impl StallDetector {
    #[must_use]
    pub fn new(stall_window: Duration) -> Self {
        Self {
            stall_window,
            window: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Option<ObservationWindow> { self.window }

    pub fn observe(
        &mut self,
        now: Instant,
        consumer: ConsumerState,
        progress: ProgressSnapshot,
    ) -> Option<StallCandidate> {
        if consumer == ConsumerState::Running {
            self.window = None;
            return None;
        }

        match self.window {
            Some(window) if window.snapshot == progress => {
                let elapsed = now.saturating_duration_since(window.opened_at);
                if elapsed < self.stall_window {
                    return None;
                }
                self.window = None;
                Some(StallCandidate {
                    elapsed,
                    snapshot: window.snapshot,
                })
            }
            Some(_) | None => {
                self.window = Some(ObservationWindow {
                    opened_at: now,
                    snapshot: progress,
                });
                None
            }
        }
    }
}

/// A stall as reported to the operator. Diagnostic only, it never fails the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    /// When the watchdog noticed the stall.
    pub reported_at: Instant,
    pub elapsed: Duration,
    pub ticks: u64,
    pub bytes: u64,
    /// Ready members seen by a direct zero-timeout poll at report time, [`None`] if
    /// the probe failed. Best effort: the set can change right after the probe.
    pub probe_ready: Option<usize>,
    /// Logical cores on the host.
    pub cores: usize,
}

/// Watches the consumer until the run flag is cleared, and returns every stall it
/// reported. Teardown can lag by up to one [`WatchdogConfig::poll_interval`].
pub fn run_watchdog(
    state: &SharedProgressState,
    set: &ReadinessSet,
    config: &WatchdogConfig,
) -> Vec<StallReport> {
    let cores = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    let mut detector = StallDetector::new(config.stall_window);
    let mut reports = vec![];

    while state.is_running() {
        thread::sleep(config.poll_interval);
        if !state.is_running() {
            break;
        }

        let now = Instant::now();
        let Some(candidate) = detector.observe(now, state.consumer_state(), state.snapshot())
        else {
            continue;
        };

        let probe_ready = match set.probe() {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!(message = "watchdog probe failed", error = ?err);
                None
            }
        };
        let report = StallReport {
            reported_at: now,
            elapsed: candidate.elapsed,
            ticks: candidate.snapshot.ticks,
            bytes: candidate.snapshot.bytes,
            probe_ready,
            cores,
        };
        tracing::warn!(
            message = "consumer stalled while waiting for a completion",
            elapsed_ms = report.elapsed.as_millis(),
            ticks = report.ticks,
            bytes = report.bytes,
            probe_ready = ?report.probe_ready,
            cores = report.cores
        );
        reports.push(report);
    }

    reports
}
