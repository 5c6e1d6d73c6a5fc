// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Readiness primitives: pipe pairs ([`ReadinessSource`]) registered on a
//! level-triggered epoll instance ([`ReadinessSet`]).

// Attach sources.
pub mod readiness_fixture;
pub mod readiness_set;
pub mod readiness_source;
pub mod setup_error;

// Re-export.
pub use readiness_fixture::*;
pub use readiness_set::*;
pub use readiness_source::*;
pub use setup_error::*;
