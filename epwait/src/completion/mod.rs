// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

//! The asynchronous "wait for readiness" primitive, behind [`CompletionBackend`].
//!
//! A consumer hands a [`TaggedBuffer`] and a [`ReadinessSet`] to [`submit()`], and gets
//! the same buffer back in a [`CompletionRecord`] once at least one member of the set
//! is ready. Ownership of the buffer moves with the request, so a
//! buffer can only be written by the delivery side while its request is outstanding.
//!
//! | Backend                  | Where the wait happens                              |
//! | :----------------------- | :-------------------------------------------------- |
//! | [`UringBackend`]         | Kernel: `IORING_OP_EPOLL_WAIT` on the epoll fd      |
//! | [`ReactorBackend`]       | Userspace: a delivery thread blocked in [`mio`]     |
//! | [`BlockingEpollBackend`] | Caller's thread, inside [`wait_for_completion()`]   |
//!
//! [`ReadinessSet`]: crate::ReadinessSet
//! [`submit()`]: CompletionBackend::submit
//! [`wait_for_completion()`]: CompletionBackend::wait_for_completion

// Attach sources.
pub mod blocking_backend;
pub mod completion_types;
pub mod delivery_faults;
pub mod reactor_backend;
pub mod ring_setup;
pub mod tagged_buffer;
pub mod uring_backend;

// Re-export.
pub use blocking_backend::*;
pub use completion_types::*;
pub use delivery_faults::*;
pub use reactor_backend::*;
pub use ring_setup::*;
pub use tagged_buffer::*;
pub use uring_backend::*;
