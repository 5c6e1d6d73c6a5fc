// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words errno

use crate::{BackendError, BufferTag, SetupError, SourceId};
use miette::Diagnostic;
use rustix::io::Errno;

/// Why a race ended without a result. Both helper threads have always been stopped
/// and joined by the time one of these is returned.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum RaceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error("Wait request on buffer {tag} completed with error: {errno}")]
    #[diagnostic(
        code(uring_epwait::race::completion_failed),
        help("A negative result other than EINVAL/EOPNOTSUPP is a real failure")
    )]
    Completion { tag: BufferTag, errno: Errno },

    #[error("Completion on buffer {tag} reported {count} entries, more than its {capacity} slots")]
    #[diagnostic(code(uring_epwait::race::result_overflow))]
    ResultOverflow {
        tag: BufferTag,
        count: usize,
        capacity: usize,
    },

    #[error("Completion on buffer {tag} reported source {id} twice")]
    #[diagnostic(
        code(uring_epwait::race::duplicate_entry),
        help("One wait on a level-triggered set reports each ready member at most once")
    )]
    DuplicateEntry { tag: BufferTag, id: SourceId },

    #[error("The {which} thread panicked")]
    #[diagnostic(code(uring_epwait::race::helper_panicked))]
    HelperPanicked { which: &'static str },
}
