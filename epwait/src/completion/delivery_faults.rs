// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use rustix::io::Errno;
use std::time::Duration;

/// Faults the [`ReactorBackend`] injects into its own delivery, to reproduce the
/// failure modes the race is meant to catch. [`Default`] injects nothing.
///
/// [`ReactorBackend`]: super::ReactorBackend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFaults {
    /// Stop delivering for a while, simulating a lost wakeup.
    pub delay: Option<InjectedDelay>,
    /// Report [`CompletionOutcome::Unsupported`] for the very first request.
    ///
    /// [`CompletionOutcome::Unsupported`]: super::CompletionOutcome::Unsupported
    pub unsupported_on_first_wait: bool,
    /// Fail one completion with an errno.
    pub fail_completion: Option<InjectedFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedDelay {
    /// Completions delivered normally before the delay kicks in.
    pub after_completions: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectedFailure {
    /// 0-based index of the completion to fail.
    pub at_completion: u64,
    pub errno: Errno,
}

/// What to do with the completion about to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Deliver,
    Delay(Duration),
    ReportUnsupported,
    Fail(Errno),
}

impl DeliveryFaults {
    #[must_use]
    pub fn none() -> Self { Self::default() }

    #[must_use]
    pub fn with_delay(after_completions: u64, duration: Duration) -> Self {
        Self {
            delay: Some(InjectedDelay {
                after_completions,
                duration,
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn unsupported() -> Self {
        Self {
            unsupported_on_first_wait: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_failure(at_completion: u64, errno: Errno) -> Self {
        Self {
            fail_completion: Some(InjectedFailure {
                at_completion,
                errno,
            }),
            ..Self::default()
        }
    }

    /// Decides the fate of the completion with 0-based index `delivered`, before its
    /// buffer is harvested. Delays fire once, just before delivery number
    /// `after_completions`.
    #[must_use]
    pub fn action_for(&self, delivered: u64) -> FaultAction {
        if self.unsupported_on_first_wait && delivered == 0 {
            return FaultAction::ReportUnsupported;
        }
        if let Some(failure) = self.fail_completion
            && failure.at_completion == delivered
        {
            return FaultAction::Fail(failure.errno);
        }
        if let Some(delay) = self.delay
            && delay.after_completions == delivered
        {
            return FaultAction::Delay(delay.duration);
        }
        FaultAction::Deliver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_faults_always_delivers() {
        let faults = DeliveryFaults::none();
        for delivered in 0..10 {
            assert_eq!(faults.action_for(delivered), FaultAction::Deliver);
        }
    }

    #[test]
    fn delay_fires_once() {
        let faults = DeliveryFaults::with_delay(3, Duration::from_millis(5));
        assert_eq!(faults.action_for(2), FaultAction::Deliver);
        assert_eq!(
            faults.action_for(3),
            FaultAction::Delay(Duration::from_millis(5))
        );
        assert_eq!(faults.action_for(4), FaultAction::Deliver);
    }

    #[test]
    fn unsupported_only_on_first() {
        let faults = DeliveryFaults::unsupported();
        assert_eq!(faults.action_for(0), FaultAction::ReportUnsupported);
        assert_eq!(faults.action_for(1), FaultAction::Deliver);
    }

    #[test]
    fn failure_at_index() {
        let faults = DeliveryFaults::with_failure(1, Errno::IO);
        assert_eq!(faults.action_for(0), FaultAction::Deliver);
        assert_eq!(faults.action_for(1), FaultAction::Fail(Errno::IO));
    }
}
