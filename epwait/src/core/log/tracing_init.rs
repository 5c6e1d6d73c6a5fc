// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use super::{DisplayPreference, LogFileError, TracingConfig, WriterConfig,
            rolling_file_appender_impl};
use tracing_core::LevelFilter;
use tracing_subscriber::{Layer, layer::SubscriberExt, registry::LookupSpan,
                         util::SubscriberInitExt};

/// Avoid gnarly type annotations by using a macro to create the `fmt` layer. Thread
/// names are on because every line in this harness comes from one of the producer,
/// watchdog, delivery, or consumer threads.
#[macro_export]
macro_rules! create_fmt {
    () => {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_target(false)
    };
}

/// Type alias for a boxed layer.
pub type DynLayer<S> = dyn Layer<S> + Send + Sync + 'static;

/// Failed to install the global tracing subscriber.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TracingInitError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    LogFile(#[from] LogFileError),

    #[error("A global tracing subscriber is already installed")]
    #[diagnostic(
        code(uring_epwait::log::already_installed),
        help("Call `try_initialize_logging_global()` once, at the top of `main()`")
    )]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Returns the layers. This does not install them. For example, once you have the
/// layers, you can run the following:
/// `tracing_subscriber::registry().with(layers).init();`
///
/// # Errors
///
/// Returns an error if the log file can't be created.
pub fn try_create_layers(
    tracing_config: &TracingConfig,
) -> Result<Vec<Box<DynLayer<tracing_subscriber::Registry>>>, LogFileError> {
    let mut return_it: Vec<Box<DynLayer<tracing_subscriber::Registry>>> = vec![];

    // Set the level filter from the tracing configuration.
    return_it.push(Box::new(tracing_config.get_level_filter()));

    if let Some(layer) = try_create_display_layer(
        tracing_config.get_level_filter(),
        &tracing_config.get_writer_config(),
    ) {
        return_it.push(layer);
    }

    if let Some(layer) = try_create_file_layer(
        tracing_config.get_level_filter(),
        &tracing_config.get_writer_config(),
    )? {
        return_it.push(layer);
    }

    Ok(return_it)
}

/// This erases the concrete type of the writer, and returns a boxed layer.
#[must_use]
pub fn try_create_display_layer<S>(
    level_filter: LevelFilter,
    writer_config: &WriterConfig,
) -> Option<Box<DynLayer<S>>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = create_fmt!();

    match writer_config {
        WriterConfig::DisplayAndFile(display_pref, _)
        | WriterConfig::Display(display_pref) => match display_pref {
            DisplayPreference::Stdout => Some(Box::new(
                fmt_layer
                    .with_writer(std::io::stdout)
                    .with_filter(level_filter),
            )),
            DisplayPreference::Stderr => Some(Box::new(
                fmt_layer
                    .with_writer(std::io::stderr)
                    .with_filter(level_filter),
            )),
        },
        WriterConfig::File(_) | WriterConfig::None => None,
    }
}

/// This erases the concrete type of the writer, and returns a boxed layer.
///
/// # Errors
///
/// Returns an error if the log file can't be created.
pub fn try_create_file_layer<S>(
    level_filter: LevelFilter,
    writer_config: &WriterConfig,
) -> Result<Option<Box<DynLayer<S>>>, LogFileError>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let fmt_layer = create_fmt!().with_ansi(false);

    Ok(match writer_config {
        WriterConfig::DisplayAndFile(_, tracing_log_file_path)
        | WriterConfig::File(tracing_log_file_path) => {
            let file = rolling_file_appender_impl::try_create(tracing_log_file_path)?;
            Some(Box::new(
                fmt_layer.with_writer(file).with_filter(level_filter),
            ))
        }
        WriterConfig::Display(_) | WriterConfig::None => None,
    })
}

/// Installs the layers on the global registry.
///
/// # Errors
///
/// Returns an error if the log file can't be created or a global subscriber is
/// already installed.
pub fn try_initialize_logging_global(
    tracing_config: &TracingConfig,
) -> Result<(), TracingInitError> {
    let layers = try_create_layers(tracing_config)?;
    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

impl TracingConfig {
    /// Installs the layers for the current thread only, until the returned guard is
    /// dropped. Handy in tests, which can't share a global subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file can't be created.
    pub fn install_thread_local(
        &self,
    ) -> Result<tracing::subscriber::DefaultGuard, LogFileError> {
        let layers = try_create_layers(self)?;
        Ok(tracing_subscriber::registry().with(layers).set_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_try_create_display_layer() {
        let layer: Option<Box<DynLayer<tracing_subscriber::Registry>>> =
            try_create_display_layer(
                LevelFilter::DEBUG,
                &WriterConfig::Display(DisplayPreference::Stderr),
            );
        assert!(layer.is_some());

        let layer: Option<Box<DynLayer<tracing_subscriber::Registry>>> =
            try_create_display_layer(LevelFilter::DEBUG, &WriterConfig::None);
        assert!(layer.is_none());
    }

    #[test]
    fn test_try_create_both_layers() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("my_temp_log_file.log");
        let file_path = file_path.to_str().unwrap().to_string();

        let tracing_config = TracingConfig {
            writer_config: WriterConfig::DisplayAndFile(
                DisplayPreference::Stderr,
                file_path.clone(),
            ),
            level_filter: LevelFilter::DEBUG,
        };

        let layers = try_create_layers(&tracing_config).unwrap();
        assert_eq!(layers.len(), 3);
        assert!(std::path::Path::new(&file_path).exists());
    }

    #[test]
    fn test_thread_local_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("thread_local.log");
        let tracing_config = TracingConfig {
            writer_config: WriterConfig::File(file_path.to_str().unwrap().to_string()),
            level_filter: LevelFilter::INFO,
        };

        {
            let _guard = tracing_config.install_thread_local().unwrap();
            tracing::info!(message = "stall window opened", ticks = 7_u64);
            tracing::debug!(message = "filtered out");
        }

        let contents = std::fs::read_to_string(&file_path).unwrap();
        assert!(contents.contains("stall window opened"));
        assert!(contents.contains("ticks=7"));
        assert!(!contents.contains("filtered out"));
    }
}
