// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Races against a delivery thread with injected faults: a long delay must show up as
//! stalls, an unsupported first wait must skip, and a failed completion must end the
//! race with both helpers joined.

use super::{super::*, quick_watchdog_config};
use crate::{DeliveryFaults, ReactorBackend, ReadinessFixture};
use pretty_assertions::assert_eq;
use rustix::io::Errno;
use serial_test::serial;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn delayed_delivery_is_reported_as_stalls() {
    let stall_window = Duration::from_millis(500);
    let poll_interval = Duration::from_millis(100);
    let config = RaceConfig {
        producer_rounds: 50,
        producer_interval: Duration::from_millis(1),
        watchdog: WatchdogConfig {
            poll_interval,
            stall_window,
        },
        ..RaceConfig::default()
    };
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    // The first completion goes through, the second is held back long after the
    // producer is done.
    let faults = DeliveryFaults::with_delay(1, Duration::from_millis(2_200));
    let mut backend = ReactorBackend::create(fixture.set.clone(), faults).unwrap();

    let RaceOutcome::Completed(report) = run_race(&mut backend, &fixture, &config).unwrap()
    else {
        panic!("race should complete once the delay is over");
    };

    assert_eq!(report.consumer.bytes_drained, config.scheduled_bytes());
    // Counters freeze after ~50ms, so stalls land near 600, 1200 and 1800ms. A fourth
    // would need the consumer still waiting past 2350ms.
    assert!(
        (2..=3).contains(&report.stalls.len()),
        "expected one stall per silent window, got {:?}",
        report.stalls
    );
    // After a report the next window opens one poll later at the earliest.
    for pair in report.stalls.windows(2) {
        let gap = pair[1].reported_at.duration_since(pair[0].reported_at);
        assert!(gap >= stall_window + poll_interval, "stalls only {gap:?} apart");
    }
    for stall in &report.stalls {
        assert!(stall.elapsed >= stall_window);
        // Counters were frozen at their final values during the stall.
        assert_eq!(stall.ticks, config.producer_rounds);
        assert_eq!(stall.bytes, report.producer.bytes_written);
        // The producer had left data behind that nobody delivered.
        assert!(stall.probe_ready.is_some_and(|count| count > 0));
        assert!(stall.cores >= 1);
    }
}

#[test]
#[serial]
fn unsupported_first_wait_skips_the_race() {
    let config = quick_watchdog_config();
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    let mut backend =
        ReactorBackend::create(fixture.set.clone(), DeliveryFaults::unsupported()).unwrap();

    let start = Instant::now();
    let outcome = run_race(&mut backend, &fixture, &config).unwrap();
    assert_eq!(outcome, RaceOutcome::Skipped);
    // The producer was stopped, not run to completion.
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
#[serial]
fn failed_completion_is_fatal() {
    let config = quick_watchdog_config();
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    let faults = DeliveryFaults::with_failure(3, Errno::IO);
    let mut backend = ReactorBackend::create(fixture.set.clone(), faults).unwrap();

    let start = Instant::now();
    let result = run_race(&mut backend, &fixture, &config);
    assert!(matches!(
        result,
        Err(RaceError::Completion {
            errno: Errno::IO,
            ..
        })
    ));
    // Helpers were told to stop and joined, well within the producer's full run.
    assert!(start.elapsed() < Duration::from_secs(10));
}
