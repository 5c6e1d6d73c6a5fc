// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words errno

use super::{DoubleBufferedResultStore, ProducerReport, RaceConfig, RaceError,
            SharedProgressState, StallReport, run_producer, run_watchdog};
use crate::{BufferTag, CompletionBackend, CompletionOutcome, CompletionRecord,
            ConsumerState, ReadinessFixture, SetupError};
use std::thread;

/// How a race ended, when it didn't fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome {
    /// Every scheduled byte was drained.
    Completed(RaceReport),
    /// The backend reported the wait as unsupported. Nothing further was run.
    Skipped,
}

/// Tallies for a completed race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReport {
    pub backend: &'static str,
    pub consumer: ConsumerTally,
    pub producer: ProducerReport,
    /// Diagnostic only. A stall never fails the race.
    pub stalls: Vec<StallReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerTally {
    /// Completion records reaped.
    pub completions: u64,
    /// Ready entries across all completions.
    pub records: u64,
    /// Entries whose source had nothing to read, because another completion already
    /// drained it.
    pub stale_entries: u64,
    pub read_errors: u64,
    pub bytes_drained: u64,
}

/// Sets the run flag to false on every exit path out of the thread scope, so the
/// scope's implicit join of the helpers can't hang.
struct WatchdogStopGuard<'a>(&'a SharedProgressState);

impl Drop for WatchdogStopGuard<'_> {
    fn drop(&mut self) { self.0.stop(); }
}

/// Result of the consumer loop, before the helpers are joined.
enum LoopEnd {
    Drained(ConsumerTally),
    Unsupported,
}

/// Runs one race on `backend` against `fixture`.
///
/// 1. Arms a wait request on each buffer.
/// 2. Starts the producer and watchdog threads.
/// 3. Loops: wait for a completion, drain exactly the first `count` sources it
///    reports, hand the buffer back, re-arm the same tag. The other request stays
///    outstanding.
/// 4. Once everything the producer wrote has been drained, stops the watchdog and
///    joins it, then the producer.
///
/// # Errors
///
/// Returns [`RaceError`] for a failed or malformed completion, a backend or setup
/// failure, or a helper thread that panicked. Both helpers are stopped and joined first.
pub fn run_race(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
    config: &RaceConfig,
) -> Result<RaceOutcome, RaceError> {
    let state = SharedProgressState::new();
    let mut store = DoubleBufferedResultStore::new(fixture.set.capacity());
    for tag in BufferTag::ALL {
        store.arm(tag, &fixture.set, backend)?;
    }
    tracing::info!(
        message = "race starting",
        backend = backend.name(),
        sources = fixture.sources.len(),
        rounds = config.producer_rounds
    );

    thread::scope(|scope| -> Result<RaceOutcome, RaceError> {
        let _stop_guard = WatchdogStopGuard(&state);

        let producer = thread::Builder::new()
            .name("epwait-producer".into())
            .spawn_scoped(scope, || run_producer(&state, &fixture.sources, config))
            .map_err(|source| SetupError::ThreadSpawn {
                name: "producer",
                source,
            })?;
        let watchdog = thread::Builder::new()
            .name("epwait-watchdog".into())
            .spawn_scoped(scope, || run_watchdog(&state, &fixture.set, &config.watchdog))
            .map_err(|source| SetupError::ThreadSpawn {
                name: "watchdog",
                source,
            })?;

        let loop_end = consume(backend, &mut store, &state, fixture, config);

        state.stop();
        let stalls = watchdog.join();
        let producer = producer.join();

        let consumer = match loop_end? {
            LoopEnd::Drained(tally) => tally,
            LoopEnd::Unsupported => return Ok(RaceOutcome::Skipped),
        };
        let report = RaceReport {
            backend: backend.name(),
            consumer,
            producer: producer.map_err(|_| RaceError::HelperPanicked { which: "producer" })?,
            stalls: stalls.map_err(|_| RaceError::HelperPanicked { which: "watchdog" })?,
        };
        tracing::info!(
            message = "race done",
            backend = report.backend,
            completions = report.consumer.completions,
            records = report.consumer.records,
            stale_entries = report.consumer.stale_entries,
            read_errors = report.consumer.read_errors,
            bytes_drained = report.consumer.bytes_drained,
            bytes_written = report.producer.bytes_written,
            stalls = report.stalls.len()
        );
        Ok(RaceOutcome::Completed(report))
    })
}

fn consume(
    backend: &mut dyn CompletionBackend,
    store: &mut DoubleBufferedResultStore,
    state: &SharedProgressState,
    fixture: &ReadinessFixture,
    config: &RaceConfig,
) -> Result<LoopEnd, RaceError> {
    let mut tally = ConsumerTally::default();
    let mut chunk = vec![0_u8; config.drain_chunk_len.max(1)];

    while !is_drained(&tally, state, config) {
        state.set_consumer_state(ConsumerState::Waiting);
        let record = backend.wait_for_completion();
        state.set_consumer_state(ConsumerState::Running);
        let CompletionRecord { buffer, outcome } = record?;
        tally.completions += 1;

        let tag = buffer.tag();
        let count = match outcome {
            CompletionOutcome::Ready(count) => count,
            CompletionOutcome::Unsupported => {
                tracing::info!(
                    message = "wait request unsupported, skipping the race",
                    backend = backend.name(),
                    %tag
                );
                return Ok(LoopEnd::Unsupported);
            }
            CompletionOutcome::Failed(errno) => {
                tracing::error!(message = "wait request failed", %tag, %errno);
                return Err(RaceError::Completion { tag, errno });
            }
        };

        if count > buffer.capacity() {
            tracing::error!(message = "completion overflows its buffer", %tag, count);
            return Err(RaceError::ResultOverflow {
                tag,
                count,
                capacity: buffer.capacity(),
            });
        }
        let mut seen = Vec::with_capacity(count);
        for id in buffer.ready_sources().take(count) {
            if seen.contains(&id) {
                tracing::error!(message = "completion repeats a source", %tag, %id);
                return Err(RaceError::DuplicateEntry { tag, id });
            }
            seen.push(id);
            tally.records += 1;
            let Some(source) = fixture.sources.get(id) else {
                tracing::warn!(message = "completion reported an unknown source", %id);
                continue;
            };
            match source.drain(&mut chunk) {
                Ok(0) => tally.stale_entries += 1,
                Ok(bytes) => tally.bytes_drained += bytes as u64,
                Err(err) => {
                    tracing::warn!(message = "drain failed", source = %id, error = ?err);
                    tally.read_errors += 1;
                }
            }
        }
        tracing::trace!(
            message = "completion drained",
            completion = tally.completions,
            %tag,
            count,
            bytes_drained = tally.bytes_drained
        );

        store.retire(buffer)?;
        store.arm(tag, &fixture.set, backend)?;
    }

    Ok(LoopEnd::Drained(tally))
}

/// Everything scheduled has been drained, or the producer is done and everything it
/// actually wrote has been drained (some writes failed).
fn is_drained(tally: &ConsumerTally, state: &SharedProgressState, config: &RaceConfig) -> bool {
    if tally.bytes_drained >= config.scheduled_bytes() {
        return true;
    }
    let progress = state.snapshot();
    progress.ticks >= config.producer_rounds
        && state.write_errors() > 0
        && tally.bytes_drained >= progress.bytes
}
