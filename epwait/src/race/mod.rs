// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

//! The race: a [`run_producer`] thread makes every source ready in rounds, the
//! consumer in [`run_race`] keeps two wait requests in flight and drains whatever each
//! completion reports, and a [`run_watchdog`] thread reports when the consumer stays
//! blocked through a window in which the producer's counters didn't move.
//!
//! # Thread model
//!
//! ```text
//! run_race() [caller's thread]
//! ├─ std::thread::scope
//! │  ├─ "epwait-producer"  writes ──► sources      ticks/bytes ──► SharedProgressState
//! │  └─ "epwait-watchdog"  reads  ◄── SharedProgressState, probes ──► ReadinessSet
//! └─ consumer loop: submit ─► wait_for_completion ─► drain ─► re-arm
//! ```
//!
//! The only state shared between threads is [`SharedProgressState`], and every field
//! in it has exactly one writer.

// Attach sources.
pub mod consumer;
pub mod double_buffered_store;
pub mod producer;
pub mod race_config;
pub mod race_error;
pub mod shared_progress_state;
pub mod watchdog;

// Re-export.
pub use consumer::*;
pub use double_buffered_store::*;
pub use producer::*;
pub use race_config::*;
pub use race_error::*;
pub use shared_progress_state::*;
pub use watchdog::*;

#[cfg(test)]
mod tests;
