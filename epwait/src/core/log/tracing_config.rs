// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::fmt::Debug;
use tracing_core::LevelFilter;

/// Configure the tracing logging to suit your needs. You can display the logs to a:
/// 1. file,
/// 2. stdout or stderr,
/// 3. both.
///
/// This configuration also sets the log level. Use [`try_initialize_logging_global()`]
/// to install it for the whole process, or [`install_thread_local()`] in tests.
///
/// [`install_thread_local()`]: Self::install_thread_local
/// [`try_initialize_logging_global()`]: crate::try_initialize_logging_global
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub writer_config: WriterConfig,
    pub level_filter: LevelFilter,
}

/// Where log output goes.
///
/// - `tracing_log_file_path`: [String] is the path of the log file. Eg:
///   `/tmp/epwait.log` or `epwait.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterConfig {
    None,
    Display(DisplayPreference),
    File(String /* tracing_log_file_path */),
    DisplayAndFile(DisplayPreference, String /* tracing_log_file_path */),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPreference {
    Stdout,
    Stderr,
}

impl TracingConfig {
    /// Log to stderr only. The harness keeps stdout clean for the test runner.
    #[must_use]
    pub fn new_display(level_filter: LevelFilter) -> Self {
        Self {
            writer_config: WriterConfig::Display(DisplayPreference::Stderr),
            level_filter,
        }
    }

    /// Log to stderr and, if given, to a file.
    #[must_use]
    pub fn new_display_and_maybe_file(
        level_filter: LevelFilter,
        maybe_file_path: Option<String>,
    ) -> Self {
        let writer_config = match maybe_file_path {
            Some(path) => WriterConfig::DisplayAndFile(DisplayPreference::Stderr, path),
            None => WriterConfig::Display(DisplayPreference::Stderr),
        };
        Self {
            writer_config,
            level_filter,
        }
    }

    #[must_use]
    pub fn get_writer_config(&self) -> WriterConfig { self.writer_config.clone() }

    #[must_use]
    pub fn get_level_filter(&self) -> LevelFilter { self.level_filter }

    /// Maps a `-v` count to a level: none is `INFO`, one is `DEBUG`, more is `TRACE`.
    #[must_use]
    pub fn level_filter_from_verbosity(verbosity: u8) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, LevelFilter::INFO)]
    #[test_case(1, LevelFilter::DEBUG)]
    #[test_case(2, LevelFilter::TRACE)]
    #[test_case(9, LevelFilter::TRACE)]
    fn verbosity_maps_to_level(verbosity: u8, expected: LevelFilter) {
        assert_eq!(TracingConfig::level_filter_from_verbosity(verbosity), expected);
    }

    #[test]
    fn file_path_adds_file_writer() {
        let config = TracingConfig::new_display_and_maybe_file(
            LevelFilter::DEBUG,
            Some("epwait.log".to_string()),
        );
        assert_eq!(
            config.get_writer_config(),
            WriterConfig::DisplayAndFile(
                DisplayPreference::Stderr,
                "epwait.log".to_string()
            )
        );

        let config = TracingConfig::new_display_and_maybe_file(LevelFilter::DEBUG, None);
        assert_eq!(
            config.get_writer_config(),
            WriterConfig::Display(DisplayPreference::Stderr)
        );
    }
}
