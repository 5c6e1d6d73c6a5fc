// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::time::Duration;

/// Knobs for one race. [`Default`] is the reference harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    /// Number of readiness sources (pipes).
    pub source_count: u32,
    /// Rounds the producer runs.
    pub producer_rounds: u64,
    /// Sleep at the start of every producer round.
    pub producer_interval: Duration,
    /// Written to every source once per round.
    pub marker: &'static [u8],
    /// Size of each `read(2)` while draining a source.
    pub drain_chunk_len: usize,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// How often the watchdog looks at the counters.
    pub poll_interval: Duration,
    /// How long the counters must stay frozen, with the consumer blocked, to count as
    /// a stall.
    pub stall_window: Duration,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            source_count: 8,
            producer_rounds: 500,
            producer_interval: Duration::from_micros(150),
            marker: b"foo",
            drain_chunk_len: 32,
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stall_window: Duration::from_millis(1_000),
        }
    }
}

impl RaceConfig {
    /// Bytes the producer writes if every write succeeds.
    #[must_use]
    pub fn scheduled_bytes(&self) -> u64 {
        self.producer_rounds * u64::from(self.source_count) * self.marker.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reference_harness_schedules_12000_bytes() {
        let config = RaceConfig::default();
        assert_eq!(config.marker.len(), 3);
        assert_eq!(config.scheduled_bytes(), 12_000);
    }
}
