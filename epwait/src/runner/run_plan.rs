// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll SQPOLL

use super::HarnessVerdict;
use crate::{BlockingEpollBackend, CompletionBackend, DeliveryFaults, ProbeError,
            ProbeVerdict, RaceConfig, RaceError, RaceOutcome, ReactorBackend,
            ReadinessFixture, ReadinessSet, RingSetup, SetupError, UringBackend, run_probes,
            run_race};

/// Which asynchronous primitive to exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum BackendKind {
    /// Kernel ring. See [`UringBackend`].
    #[strum(serialize = "uring")]
    Uring,
    /// Userspace delivery thread. See [`ReactorBackend`].
    #[strum(serialize = "reactor")]
    Reactor,
    /// Plain blocking epoll. See [`BlockingEpollBackend`].
    #[strum(serialize = "control")]
    Control,
}

/// Which ring configurations to run. Only used with [`BackendKind::Uring`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupSelection {
    One(RingSetup),
    All,
}

/// Everything one invocation of the harness does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub backend: BackendKind,
    pub setups: SetupSelection,
    pub race: RaceConfig,
    /// Only honored by [`BackendKind::Reactor`].
    pub faults: DeliveryFaults,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            backend: BackendKind::Uring,
            setups: SetupSelection::All,
            race: RaceConfig::default(),
            faults: DeliveryFaults::none(),
        }
    }
}

#[must_use]
pub fn run_plan(plan: &RunPlan) -> HarnessVerdict {
    let verdict = match (plan.backend, plan.setups) {
        (BackendKind::Uring, SetupSelection::All) => run_all(&plan.race),
        (BackendKind::Uring, SetupSelection::One(setup)) => {
            run_configuration(setup, &plan.race)
        }
        (BackendKind::Reactor, _) => run_reactor(&plan.race, plan.faults),
        (BackendKind::Control, _) => run_control(&plan.race),
    };
    tracing::info!(message = "harness done", backend = %plan.backend, %verdict);
    verdict
}

/// Runs [`RingSetup::Default`] first. A skip there means io_uring isn't usable at all,
/// so everything is skipped. The other setups then run in order; a skip on one of them
/// (e.g. unprivileged SQPOLL) only skips that setup.
#[must_use]
pub fn run_all(race: &RaceConfig) -> HarnessVerdict {
    match run_configuration(RingSetup::Default, race) {
        HarnessVerdict::Pass => {}
        other => return other,
    }
    for setup in [RingSetup::DeferTaskrun, RingSetup::Sqpoll] {
        match run_configuration(setup, race) {
            HarnessVerdict::Pass => {}
            HarnessVerdict::Skip => {
                tracing::info!(message = "setup skipped", %setup);
            }
            HarnessVerdict::Fail => {
                tracing::error!(message = "setup failed", %setup);
                return HarnessVerdict::Fail;
            }
        }
    }
    HarnessVerdict::Pass
}

/// One ring configuration: probes, then the blocking control race, then the race on
/// the ring.
#[must_use]
pub fn run_configuration(setup: RingSetup, race: &RaceConfig) -> HarnessVerdict {
    let span = tracing::info_span!("configuration", %setup);
    let _enter = span.enter();

    let factory = |_set: &ReadinessSet| -> Result<Box<dyn CompletionBackend>, SetupError> {
        Ok(Box::new(UringBackend::create(setup)?))
    };
    if let Some(verdict) = probe_verdict(run_probes(&factory)) {
        return verdict;
    }

    if control_race(race) != HarnessVerdict::Pass {
        tracing::error!(
            message = "epoll-only control failed, not an io_uring specific issue"
        );
        return HarnessVerdict::Fail;
    }

    let fixture = match ReadinessFixture::create(race.source_count) {
        Ok(fixture) => fixture,
        Err(err) => return setup_verdict(&err),
    };
    let mut backend = match UringBackend::create(setup) {
        Ok(backend) => backend,
        Err(err) => return setup_verdict(&err),
    };
    race_verdict(run_race(&mut backend, &fixture, race))
}

/// Probes and race on the userspace delivery thread. `faults` only apply to the race.
#[must_use]
pub fn run_reactor(race: &RaceConfig, faults: DeliveryFaults) -> HarnessVerdict {
    let factory = |set: &ReadinessSet| -> Result<Box<dyn CompletionBackend>, SetupError> {
        Ok(Box::new(ReactorBackend::create(set.clone(), DeliveryFaults::none())?))
    };
    if let Some(verdict) = probe_verdict(run_probes(&factory)) {
        return verdict;
    }

    let fixture = match ReadinessFixture::create(race.source_count) {
        Ok(fixture) => fixture,
        Err(err) => return setup_verdict(&err),
    };
    let mut backend = match ReactorBackend::create(fixture.set.clone(), faults) {
        Ok(backend) => backend,
        Err(err) => return setup_verdict(&err),
    };
    race_verdict(run_race(&mut backend, &fixture, race))
}

/// Probes and race with plain blocking epoll.
#[must_use]
pub fn run_control(race: &RaceConfig) -> HarnessVerdict {
    let factory = |_set: &ReadinessSet| -> Result<Box<dyn CompletionBackend>, SetupError> {
        Ok(Box::new(BlockingEpollBackend::new()))
    };
    if let Some(verdict) = probe_verdict(run_probes(&factory)) {
        return verdict;
    }
    control_race(race)
}

fn control_race(race: &RaceConfig) -> HarnessVerdict {
    let fixture = match ReadinessFixture::create(race.source_count) {
        Ok(fixture) => fixture,
        Err(err) => return setup_verdict(&err),
    };
    let mut backend = BlockingEpollBackend::new();
    race_verdict(run_race(&mut backend, &fixture, race))
}

/// [`None`] means the probes passed and the run goes on.
fn probe_verdict(result: Result<ProbeVerdict, ProbeError>) -> Option<HarnessVerdict> {
    match result {
        Ok(ProbeVerdict::Passed) => None,
        Ok(ProbeVerdict::Unsupported) => {
            tracing::info!(message = "wait unsupported, skipping");
            Some(HarnessVerdict::Skip)
        }
        Err(ProbeError::Setup(err)) => Some(setup_verdict(&err)),
        Err(err) => {
            tracing::error!(message = "probe failed", error = %err);
            Some(HarnessVerdict::Fail)
        }
    }
}

fn setup_verdict(err: &SetupError) -> HarnessVerdict {
    if err.is_skip() {
        tracing::info!(message = "setup unsupported, skipping", error = %err);
        HarnessVerdict::Skip
    } else {
        tracing::error!(message = "setup failed", error = %err);
        HarnessVerdict::Fail
    }
}

fn race_verdict(result: Result<RaceOutcome, RaceError>) -> HarnessVerdict {
    match result {
        Ok(RaceOutcome::Completed(_)) => HarnessVerdict::Pass,
        Ok(RaceOutcome::Skipped) => HarnessVerdict::Skip,
        Err(RaceError::Setup(err)) => setup_verdict(&err),
        Err(err) => {
            tracing::error!(message = "race failed", error = %err);
            HarnessVerdict::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WatchdogConfig;
    use pretty_assertions::assert_eq;
    use rustix::io::Errno;
    use serial_test::serial;
    use std::time::Duration;

    fn short_race() -> RaceConfig {
        RaceConfig {
            producer_rounds: 50,
            watchdog: WatchdogConfig {
                poll_interval: Duration::from_millis(20),
                stall_window: Duration::from_millis(1_000),
            },
            ..RaceConfig::default()
        }
    }

    #[test]
    #[serial]
    fn control_passes() {
        assert_eq!(run_control(&short_race()), HarnessVerdict::Pass);
    }

    #[test]
    #[serial]
    fn reactor_verdicts_follow_faults() {
        let race = short_race();
        assert_eq!(run_reactor(&race, DeliveryFaults::none()), HarnessVerdict::Pass);
        assert_eq!(
            run_reactor(&race, DeliveryFaults::unsupported()),
            HarnessVerdict::Skip
        );
        assert_eq!(
            run_reactor(&race, DeliveryFaults::with_failure(2, Errno::IO)),
            HarnessVerdict::Fail
        );
    }

    #[test]
    #[serial]
    fn plan_dispatches_to_control() {
        let verdict = run_plan(&RunPlan {
            backend: BackendKind::Control,
            race: short_race(),
            ..RunPlan::default()
        });
        assert_eq!(verdict, HarnessVerdict::Pass);
    }

    #[test]
    fn ring_creation_failures_map_to_verdicts() {
        let skip = SetupError::from_ring_creation(
            RingSetup::Sqpoll,
            std::io::Error::from_raw_os_error(libc::EPERM),
        );
        assert_eq!(setup_verdict(&skip), HarnessVerdict::Skip);

        let fail = SetupError::from_ring_creation(
            RingSetup::Default,
            std::io::Error::from_raw_os_error(libc::ENOMEM),
        );
        assert_eq!(setup_verdict(&fail), HarnessVerdict::Fail);
    }
}
