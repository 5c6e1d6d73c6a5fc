// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Healthy races on every backend: all bytes drained, no stalls.

use super::{super::*, quick_watchdog_config};
use crate::{BlockingEpollBackend, CompletionBackend, DeliveryFaults, ReactorBackend,
            ReadinessFixture, RingSetup, UringBackend};
use pretty_assertions::assert_eq;
use serial_test::serial;

fn assert_healthy(outcome: RaceOutcome, config: &RaceConfig) {
    let RaceOutcome::Completed(report) = outcome else {
        panic!("race should complete, got {outcome:?}");
    };
    let scheduled = config.scheduled_bytes();
    assert_eq!(
        report.producer,
        ProducerReport {
            rounds: config.producer_rounds,
            bytes_written: scheduled,
            write_errors: 0,
        }
    );
    assert_eq!(report.consumer.bytes_drained, scheduled);
    assert_eq!(report.consumer.read_errors, 0);
    assert!(report.consumer.completions >= 1);
    assert!(report.consumer.records >= report.consumer.completions);
    assert!(report.stalls.is_empty(), "unexpected stalls: {:?}", report.stalls);
}

#[test]
#[serial]
fn reactor_drains_all_12000_bytes() {
    let config = quick_watchdog_config();
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    let mut backend =
        ReactorBackend::create(fixture.set.clone(), DeliveryFaults::none()).unwrap();

    let outcome = run_race(&mut backend, &fixture, &config).unwrap();
    assert_eq!(config.scheduled_bytes(), 12_000);
    assert_healthy(outcome, &config);
    assert_eq!(fixture.set.probe().unwrap(), 0);
}

#[test]
#[serial]
fn blocking_control_drains_all_bytes() {
    let config = quick_watchdog_config();
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    let mut backend = BlockingEpollBackend::new();

    let outcome = run_race(&mut backend, &fixture, &config).unwrap();
    assert_healthy(outcome, &config);
}

#[test]
#[serial]
fn uring_drains_all_bytes_for_every_setup() {
    let config = RaceConfig {
        producer_rounds: 100,
        ..quick_watchdog_config()
    };
    for setup in RingSetup::ALL {
        let fixture = ReadinessFixture::create(config.source_count).unwrap();
        // Hosts without io_uring (or without SQPOLL privileges) skip.
        let Ok(mut backend) = UringBackend::create(setup) else {
            continue;
        };
        let outcome = run_race(&mut backend, &fixture, &config).unwrap();
        if outcome == RaceOutcome::Skipped {
            continue;
        }
        assert_healthy(outcome, &config);
        assert_eq!(backend.name(), "io_uring");
    }
}

#[test]
#[serial]
fn zero_rounds_finishes_without_waiting() {
    let config = RaceConfig {
        producer_rounds: 0,
        ..quick_watchdog_config()
    };
    let fixture = ReadinessFixture::create(config.source_count).unwrap();
    let mut backend = BlockingEpollBackend::new();

    let RaceOutcome::Completed(report) = run_race(&mut backend, &fixture, &config).unwrap()
    else {
        panic!("race should complete");
    };
    assert_eq!(report.consumer.completions, 0);
    assert_eq!(report.producer, ProducerReport::default());
}
