// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use crate::{BackendError, CompletionOutcome, SetupError, SourceId};
use miette::Diagnostic;

/// Names a probe in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ProbeName {
    #[strum(serialize = "ready")]
    Ready,
    #[strum(serialize = "not_ready")]
    NotReady,
    #[strum(serialize = "del")]
    Del,
    #[strum(serialize = "teardown_pending")]
    TeardownPending,
}

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ProbeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error("Probe {probe} got a failed completion: {outcome:?}")]
    #[diagnostic(code(uring_epwait::probe::completion_failed))]
    Completion {
        probe: ProbeName,
        outcome: CompletionOutcome,
    },

    #[error("Probe {probe} got a completion with no ready sources")]
    #[diagnostic(
        code(uring_epwait::probe::empty_completion),
        help("A wait request must only complete once a member is ready")
    )]
    EmptyCompletion { probe: ProbeName },

    #[error("Source {id} was reported ready after it was removed from the set")]
    #[diagnostic(code(uring_epwait::probe::removed_source_reported))]
    RemovedSourceReported { id: SourceId },
}
