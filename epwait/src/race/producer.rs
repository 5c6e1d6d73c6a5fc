// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{RaceConfig, SharedProgressState};
use crate::ReadinessSources;
use std::thread;

/// What the producer did, returned when its thread is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerReport {
    pub rounds: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

/// Makes every source ready once per round, for [`RaceConfig::producer_rounds`]
/// rounds.
///
/// Each round sleeps [`RaceConfig::producer_interval`], writes
/// [`RaceConfig::marker`] to every source, and only then bumps the tick counter. A
/// failed write is logged and counted, not fatal. Stops early once the run flag is
/// cleared, which only happens when the race is being torn down.
pub fn run_producer(
    state: &SharedProgressState,
    sources: &ReadinessSources,
    config: &RaceConfig,
) -> ProducerReport {
    let mut report = ProducerReport::default();

    for round in 0..config.producer_rounds {
        if !state.is_running() {
            tracing::debug!(message = "producer stopped early", round);
            break;
        }
        thread::sleep(config.producer_interval);

        for source in sources {
            match source.write_marker(config.marker) {
                Ok(count) => {
                    state.add_bytes(count as u64);
                    report.bytes_written += count as u64;
                }
                Err(err) => {
                    tracing::warn!(
                        message = "producer write failed",
                        source = %source.id(),
                        round,
                        error = ?err
                    );
                    state.record_write_error();
                    report.write_errors += 1;
                }
            }
        }

        report.rounds = state.record_round();
    }

    tracing::debug!(message = "producer done", ?report);
    report
}
