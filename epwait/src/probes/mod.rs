// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Single-shot functional checks of a [`CompletionBackend`], run before the race.
//! Each is a straight-line sequence on a two-source set.
//!
//! [`CompletionBackend`]: crate::CompletionBackend

// Attach sources.
pub mod probe_error;
pub mod probe_impl;

// Re-export.
pub use probe_error::*;
pub use probe_impl::*;
