// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Whole-race scenarios with real threads, pipes, and epoll. Timing-sensitive, so
//! every test is `#[serial]`.

mod race_fault_tests;
mod race_scenario_tests;

use super::{RaceConfig, WatchdogConfig};
use std::time::Duration;

/// Reference harness, with a watchdog that polls fast enough for tests to finish
/// quickly but keeps the one second window.
fn quick_watchdog_config() -> RaceConfig {
    RaceConfig {
        watchdog: WatchdogConfig {
            poll_interval: Duration::from_millis(50),
            stall_window: Duration::from_millis(1_000),
        },
        ..RaceConfig::default()
    }
}
