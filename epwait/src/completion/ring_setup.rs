// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words SQPOLL taskrun

/// How long the SQPOLL kernel thread spins before it sleeps, in milliseconds.
pub const SQPOLL_IDLE_MS: u32 = 1_000;

/// Submission queue entries for the ring.
pub const RING_ENTRIES: u32 = 32;

/// The ring configurations each run goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum RingSetup {
    /// No setup flags.
    #[strum(serialize = "default")]
    Default,
    /// `IORING_SETUP_DEFER_TASKRUN | IORING_SETUP_SINGLE_ISSUER`: completions are only
    /// processed when the submitting thread enters the ring.
    #[strum(serialize = "defer-taskrun")]
    DeferTaskrun,
    /// `IORING_SETUP_SQPOLL`: a kernel thread polls the submission queue.
    #[strum(serialize = "sqpoll")]
    Sqpoll,
}

impl RingSetup {
    pub const ALL: [RingSetup; 3] =
        [RingSetup::Default, RingSetup::DeferTaskrun, RingSetup::Sqpoll];

    /// Applies this setup's flags to a ring builder.
    pub fn configure(self, builder: &mut io_uring::Builder) {
        match self {
            RingSetup::Default => {}
            RingSetup::DeferTaskrun => {
                builder.setup_defer_taskrun().setup_single_issuer();
            }
            RingSetup::Sqpoll => {
                builder.setup_sqpoll(SQPOLL_IDLE_MS);
            }
        }
    }
}
