// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll epwait IORING SQPOLL taskrun

//! # uring_epwait
//!
//! A race exerciser for asynchronous "wait for readiness" requests over a
//! level-triggered [`epoll`] set.
//!
//! Instead of blocking inside [`epoll_wait(2)`], a consumer submits a wait request
//! against the set and later reaps a completion record that says which members became
//! ready. This crate drives that mechanism as hard as it can:
//!
//! - A **producer** thread makes eight pipes ready every round ([`race::run_producer`]).
//! - A **consumer** keeps two wait requests in flight at all times, one per result
//!   buffer, drains exactly what each completion reports, and re-arms
//!   ([`race::run_race`]).
//! - A **watchdog** thread notices when the consumer has been blocked for a full
//!   window while the producer's counters stay frozen, probes the set directly, and
//!   reports the stall ([`race::run_watchdog`]).
//!
//! ```text
//! Producer ──write──► pipes ──ready──► epoll set ──(backend)──► completion ──► Consumer
//!    │                                    ▲                                    │
//!    └──ticks/bytes──► SharedProgressState ◄──waiting flag─────────────────────┘
//!                              │
//!                          Watchdog ──probe (timeout 0)──► epoll set
//! ```
//!
//! The wait primitive is a black box behind [`completion::CompletionBackend`]:
//!
//! | Backend                                   | Delivery                                             |
//! | :---------------------------------------- | :--------------------------------------------------- |
//! | [`completion::UringBackend`]              | Kernel [`io_uring`] ring, `EPOLL_WAIT` on the set    |
//! | [`completion::ReactorBackend`]            | Userspace delivery thread blocked in [`mio`]         |
//! | [`completion::BlockingEpollBackend`]      | Direct blocking [`epoll_wait(2)`] (the control run)  |
//!
//! The binary (`epwait`) runs the functional [`probes`] and the race for each ring
//! configuration and exits with `0` (pass), `1` (fail) or `77` (skip). See
//! [`runner::HarnessVerdict`].
//!
//! [`epoll`]: https://man7.org/linux/man-pages/man7/epoll.7.html
//! [`epoll_wait(2)`]: https://man7.org/linux/man-pages/man2/epoll_wait.2.html
//! [`io_uring`]: https://man7.org/linux/man-pages/man7/io_uring.7.html

// https://github.com/rust-lang/rust-clippy
// https://rust-lang.github.io/rust-clippy/master/index.html
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
// Production code must propagate errors; tests may unwrap.
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

// Attach.
pub mod cli;
pub mod completion;
pub mod core;
pub mod probes;
pub mod race;
pub mod runner;

// Re-export.
pub use cli::*;
pub use completion::*;
pub use core::*;
pub use probes::*;
pub use race::*;
pub use runner::*;
