// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Failed to open the log file.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LogFileError {
    #[error("Log file path {} has no file name", path.display())]
    #[diagnostic(
        code(uring_epwait::log::no_file_name),
        help("Pass a path that ends in a file name, eg: `/tmp/epwait.log`")
    )]
    NoFileName { path: PathBuf },

    #[error("Can't create log file {}", path.display())]
    #[diagnostic(
        code(uring_epwait::log::create),
        help("The folder might not exist, or you don't have the required permissions")
    )]
    Create {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
}

/// Creates a non-rotating file appender for `path_str`. A bare file name is created in
/// the current folder.
///
/// Note that if you wrap this up in a non blocking writer, log lines emitted right
/// before the process exits can be lost, so it is used as-is.
///
/// # Errors
///
/// Returns an error if the path has no file name, or the file can't be created.
pub fn try_create(path_str: &str) -> Result<RollingFileAppender, LogFileError> {
    let path = PathBuf::from(path_str);

    let file_name = path
        .file_name()
        .ok_or_else(|| LogFileError::NoFileName { path: path.clone() })?
        .to_string_lossy()
        .into_owned();

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(parent)
        .map_err(|source| LogFileError::Create { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_in_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("epwait_test.log");
        let appender = try_create(file_path.to_str().unwrap());
        assert!(appender.is_ok());
        assert!(file_path.exists());
    }

    #[test]
    fn rejects_path_without_file_name() {
        let result = try_create("/");
        assert!(matches!(result, Err(LogFileError::NoFileName { .. })));
    }
}
