// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{ReadinessSet, ReadinessSources, SetupError};

/// A set of sources, all registered on one [`ReadinessSet`] whose capacity is the
/// source count. Both the race and the functional probes start from one of these.
///
/// Field order matters on drop: the set closes before the pipes it watches.
#[derive(Debug)]
pub struct ReadinessFixture {
    pub set: ReadinessSet,
    pub sources: ReadinessSources,
}

impl ReadinessFixture {
    /// # Errors
    ///
    /// Any failure to create a source, the set, or a registration. These are fatal
    /// to the configuration being run.
    pub fn create(source_count: u32) -> Result<Self, SetupError> {
        let sources = ReadinessSources::create(source_count)?;
        let set = ReadinessSet::create(sources.len())?;
        for source in &sources {
            set.add(source)?;
        }
        tracing::debug!(message = "readiness fixture created", source_count);
        Ok(Self { set, sources })
    }
}
