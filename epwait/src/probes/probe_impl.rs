// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{ProbeError, ProbeName};
use crate::{BufferTag, CompletionBackend, CompletionOutcome, CompletionRecord,
            ReadinessFixture, ReadinessSet, ReadinessSources, SetupError, SourceId,
            TaggedBuffer, WaitRequest};
use std::{thread, time::Duration};

/// Sources used by the probes.
pub const PROBE_SOURCE_COUNT: u32 = 2;

const PROBE_MARKER: &[u8] = b"foo";

/// Read size for probe drains.
const PROBE_CHUNK_LEN: usize = 16;

/// Gap between writes in [`probe_not_ready()`], and before writing in
/// [`probe_teardown_pending()`].
const WRITE_GAP: Duration = Duration::from_millis(10);

/// Builds a backend for requests on a set. The teardown probe needs a backend of its
/// own.
pub type BackendFactory<'a> =
    dyn Fn(&ReadinessSet) -> Result<Box<dyn CompletionBackend>, SetupError> + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Passed,
    /// The very first wait was rejected. Nothing else was run.
    Unsupported,
}

/// What [`probe_teardown_pending()`] saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    /// Dropping the caller's set handle closed the epoll fd while the wait was still
    /// pending, because the backend kept no handle of its own.
    pub closed_set_while_pending: bool,
    /// A completion was peeked before the backend was dropped.
    pub reaped_before_teardown: bool,
}

/// Runs every probe in order, on one fixture. Teardown goes last since it throws its
/// backend away.
///
/// # Errors
///
/// Returns the first [`ProbeError`].
pub fn run_probes(factory: &BackendFactory<'_>) -> Result<ProbeVerdict, ProbeError> {
    let fixture = ReadinessFixture::create(PROBE_SOURCE_COUNT)?;
    let mut backend = factory(&fixture.set)?;

    if probe_ready(backend.as_mut(), &fixture)? == ProbeVerdict::Unsupported {
        tracing::info!(message = "wait unsupported", backend = backend.name());
        return Ok(ProbeVerdict::Unsupported);
    }
    probe_not_ready(backend.as_mut(), &fixture)?;
    probe_del(backend.as_mut(), &fixture)?;
    drop(backend);
    let teardown = probe_teardown_pending(factory, &fixture.sources)?;

    tracing::info!(message = "probes passed", ?teardown);
    Ok(ProbeVerdict::Passed)
}

/// Both sources are ready before the wait is submitted.
///
/// # Errors
///
/// Returns [`ProbeError`] for a backend failure or a failed completion.
pub fn probe_ready(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
) -> Result<ProbeVerdict, ProbeError> {
    write_all(&fixture.sources);
    let record = wait_once(backend, fixture)?;
    match record.outcome {
        CompletionOutcome::Unsupported => return Ok(ProbeVerdict::Unsupported),
        CompletionOutcome::Failed(_) => {
            return Err(ProbeError::Completion {
                probe: ProbeName::Ready,
                outcome: record.outcome,
            });
        }
        CompletionOutcome::Ready(_) => {}
    }
    drain_reported(&record, &fixture.sources);
    tracing::debug!(message = "probe passed", probe = %ProbeName::Ready);
    Ok(ProbeVerdict::Passed)
}

/// The wait is submitted first, then the sources become ready one by one.
///
/// # Errors
///
/// Returns [`ProbeError`] if the completion isn't a ready count of at least one.
pub fn probe_not_ready(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
) -> Result<(), ProbeError> {
    let probe = ProbeName::NotReady;
    submit(backend, fixture)?;
    for source in &fixture.sources {
        thread::sleep(WRITE_GAP);
        write_one(source.id(), &fixture.sources);
    }
    let record = backend.wait_for_completion()?;
    match record.outcome {
        CompletionOutcome::Ready(0) => return Err(ProbeError::EmptyCompletion { probe }),
        CompletionOutcome::Ready(_) => {}
        outcome => return Err(ProbeError::Completion { probe, outcome }),
    }
    drain_reported(&record, &fixture.sources);
    tracing::debug!(message = "probe passed", %probe);
    Ok(())
}

/// Removes a source from the set while a wait is pending. The removed source must not
/// be reported, and must be re-addable afterwards.
///
/// # Errors
///
/// Registration errors are fatal. So is a failed completion, or one that reports the
/// removed source.
pub fn probe_del(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
) -> Result<(), ProbeError> {
    let probe = ProbeName::Del;
    let removed_id = SourceId(0);
    let Some(removed) = fixture.sources.get(removed_id) else {
        return Ok(());
    };

    submit(backend, fixture)?;
    fixture.set.remove(removed)?;
    write_all(&fixture.sources);

    let record = backend.wait_for_completion()?;
    if let outcome @ (CompletionOutcome::Unsupported | CompletionOutcome::Failed(_)) =
        record.outcome
    {
        return Err(ProbeError::Completion { probe, outcome });
    }
    if record.buffer.ready_sources().any(|id| id == removed_id) {
        return Err(ProbeError::RemovedSourceReported { id: removed_id });
    }

    // Drain directly, whatever was reported.
    drain_all(&fixture.sources);
    fixture.set.add(removed)?;
    tracing::debug!(message = "probe passed", %probe);
    Ok(())
}

/// Throws a backend away while its wait is still pending, then makes the sources
/// ready. Passing means nothing hangs or crashes. A completion showing up before the
/// teardown is fine, and so is none.
///
/// Runs on a set of its own so the teardown can't disturb the caller's set. The
/// probe's handle to that set is dropped right after submitting, which closes the
/// epoll fd under the pending wait unless the backend holds a handle too.
///
/// # Errors
///
/// Returns [`ProbeError::Setup`] if the set or backend can't be created, or
/// [`ProbeError::Backend`] if the wait can't be submitted.
pub fn probe_teardown_pending(
    factory: &BackendFactory<'_>,
    sources: &ReadinessSources,
) -> Result<TeardownReport, ProbeError> {
    let probe = ProbeName::TeardownPending;
    let set = ReadinessSet::create(sources.len())?;
    for source in sources {
        set.add(source)?;
    }
    let mut backend = factory(&set)?;
    backend.submit(
        &set,
        WaitRequest::new(TaggedBuffer::new(BufferTag::Zero, set.capacity())),
    )?;
    let closed_set_while_pending = set.handle_count() == 1;
    drop(set);

    thread::sleep(WRITE_GAP);
    write_all(sources);

    let reaped_before_teardown = match backend.try_completion() {
        Ok(maybe_record) => maybe_record.is_some(),
        Err(err) => {
            tracing::debug!(message = "peek failed", %probe, error = ?err);
            false
        }
    };
    drop(backend);

    drain_all(sources);
    let report = TeardownReport {
        closed_set_while_pending,
        reaped_before_teardown,
    };
    tracing::debug!(message = "probe passed", %probe, ?report);
    Ok(report)
}

fn submit(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
) -> Result<(), ProbeError> {
    let buffer = TaggedBuffer::new(BufferTag::Zero, fixture.set.capacity());
    backend.submit(&fixture.set, WaitRequest::new(buffer))?;
    Ok(())
}

fn wait_once(
    backend: &mut dyn CompletionBackend,
    fixture: &ReadinessFixture,
) -> Result<CompletionRecord, ProbeError> {
    submit(backend, fixture)?;
    Ok(backend.wait_for_completion()?)
}

fn write_one(id: SourceId, sources: &ReadinessSources) {
    let Some(source) = sources.get(id) else {
        return;
    };
    if let Err(err) = source.write_marker(PROBE_MARKER) {
        tracing::warn!(message = "probe write failed", source = %id, error = ?err);
    }
}

fn write_all(sources: &ReadinessSources) {
    for source in sources {
        write_one(source.id(), sources);
    }
}

fn drain_reported(record: &CompletionRecord, sources: &ReadinessSources) {
    let mut chunk = [0_u8; PROBE_CHUNK_LEN];
    for id in record.buffer.ready_sources() {
        let Some(source) = sources.get(id) else {
            continue;
        };
        if let Err(err) = source.drain(&mut chunk) {
            tracing::warn!(message = "probe read failed", source = %id, error = ?err);
        }
    }
}

fn drain_all(sources: &ReadinessSources) {
    let mut chunk = [0_u8; PROBE_CHUNK_LEN];
    for source in sources {
        if let Err(err) = source.drain(&mut chunk) {
            tracing::warn!(message = "probe read failed", source = %source.id(), error = ?err);
        }
    }
}
