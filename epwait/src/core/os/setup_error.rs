// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words ENOSYS EPERM epoll SQPOLL

use super::SourceId;
use crate::RingSetup;
use miette::Diagnostic;

/// Which registration call failed on the [`ReadinessSet`].
///
/// [`ReadinessSet`]: super::ReadinessSet
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RegistrationOp {
    #[strum(serialize = "add")]
    Add,
    #[strum(serialize = "remove")]
    Remove,
}

/// Everything that can go wrong before a race or probe starts. All variants abort the
/// current configuration, except [`RingUnsupported`], which means "skip".
///
/// [`RingUnsupported`]: SetupError::RingUnsupported
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SetupError {
    #[error("Failed to create readiness source pair {id}")]
    #[diagnostic(
        code(uring_epwait::setup::source_creation),
        help("This usually means the process ran out of file descriptors")
    )]
    SourceCreation {
        id: SourceId,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create the epoll readiness set")]
    #[diagnostic(
        code(uring_epwait::setup::set_creation),
        help("This usually means the process ran out of file descriptors")
    )]
    SetCreation(#[source] std::io::Error),

    #[error("Failed to {op} readiness source {id} on the epoll set")]
    #[diagnostic(
        code(uring_epwait::setup::registration),
        help("Removing a source that isn't registered, or adding one twice, fails")
    )]
    Registration {
        op: RegistrationOp,
        id: SourceId,
        #[source]
        source: std::io::Error,
    },

    #[error("The kernel doesn't support io_uring with the {setup} setup")]
    #[diagnostic(
        code(uring_epwait::setup::ring_unsupported),
        help("io_uring may be disabled (kernel.io_uring_disabled), or SQPOLL needs privileges")
    )]
    RingUnsupported {
        setup: RingSetup,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create the io_uring ring with the {setup} setup")]
    #[diagnostic(code(uring_epwait::setup::ring_creation))]
    RingCreation {
        setup: RingSetup,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create mio::Poll for the delivery thread")]
    #[diagnostic(
        code(uring_epwait::setup::poll_creation),
        help("This usually means the process ran out of file descriptors")
    )]
    PollCreation(#[source] std::io::Error),

    #[error("Failed to create mio::Waker for the delivery thread")]
    #[diagnostic(
        code(uring_epwait::setup::waker_creation),
        help("This usually means the process ran out of file descriptors")
    )]
    WakerCreation(#[source] std::io::Error),

    #[error("Failed to watch the epoll set from the delivery thread's mio::Poll")]
    #[diagnostic(code(uring_epwait::setup::set_watch))]
    SetWatch(#[source] std::io::Error),

    #[error("Failed to spawn the {name} thread")]
    #[diagnostic(
        code(uring_epwait::setup::thread_spawn),
        help("The system may have hit its thread limit")
    )]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl SetupError {
    /// `true` when the failure means "this host can't run the configuration", which
    /// the runner reports as a skip instead of a failure.
    #[must_use]
    pub fn is_skip(&self) -> bool { matches!(self, Self::RingUnsupported { .. }) }

    /// Classifies a failed ring creation. `ENOSYS` (no io_uring), `EPERM` (disabled or
    /// unprivileged SQPOLL) and `EINVAL` (unknown setup flags) are skips.
    #[must_use]
    pub fn from_ring_creation(setup: RingSetup, source: std::io::Error) -> Self {
        let is_unsupported = matches!(
            source.raw_os_error(),
            Some(libc::ENOSYS | libc::EPERM | libc::EINVAL)
        );
        if is_unsupported {
            Self::RingUnsupported { setup, source }
        } else {
            Self::RingCreation { setup, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(libc::ENOSYS, true)]
    #[test_case(libc::EPERM, true)]
    #[test_case(libc::EINVAL, true)]
    #[test_case(libc::ENOMEM, false)]
    #[test_case(libc::EMFILE, false)]
    fn ring_creation_errno_classification(errno: i32, expected_skip: bool) {
        let err = SetupError::from_ring_creation(
            RingSetup::Sqpoll,
            std::io::Error::from_raw_os_error(errno),
        );
        assert_eq!(err.is_skip(), expected_skip);
    }

    #[test]
    fn registration_message_names_the_op() {
        let err = SetupError::Registration {
            op: RegistrationOp::Remove,
            id: SourceId(3),
            source: std::io::Error::from_raw_os_error(libc::ENOENT),
        };
        assert_eq!(
            err.to_string(),
            "Failed to remove readiness source #3 on the epoll set"
        );
        assert!(!err.is_skip());
    }
}
