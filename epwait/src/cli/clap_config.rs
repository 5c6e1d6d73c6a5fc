// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll SQPOLL taskrun

use crate::{BackendKind, DeliveryFaults, RaceConfig, RingSetup, RunPlan, SetupSelection,
            TracingConfig, WatchdogConfig};
use clap::{Args, Parser, ValueEnum};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(bin_name = "epwait")]
#[command(
    about = "Race exerciser for asynchronous epoll waits: a producer makes pipes ready \
             while a consumer keeps two wait requests in flight, and a watchdog \
             reports stalls"
)]
#[command(version)]
#[command(next_line_help = true)]
/// More info:
/// - <https://docs.rs/clap/latest/clap/_derive/#overview>
pub struct CLIArg {
    #[arg(
        long,
        value_enum,
        default_value_t = BackendArg::Uring,
        help = "Asynchronous wait primitive to exercise"
    )]
    pub backend: BackendArg,

    #[arg(
        long,
        value_enum,
        default_value_t = SetupArg::All,
        help = "Ring configuration(s) to run, only used with `--backend uring`"
    )]
    pub setup: SetupArg,

    #[command(flatten)]
    pub race_options: RaceOption,

    #[command(flatten)]
    pub global_options: GlobalOption,
}

#[derive(Debug, Args)]
pub struct RaceOption {
    #[arg(long, default_value_t = 500, help = "Producer rounds")]
    pub rounds: u64,

    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..), help = "Readiness sources (pipes)")]
    pub sources: u32,

    #[arg(long, default_value_t = 150, help = "Producer sleep per round, in microseconds")]
    pub interval_us: u64,

    #[arg(long, default_value_t = 500, help = "Watchdog poll interval, in milliseconds")]
    pub watchdog_poll_ms: u64,

    #[arg(
        long,
        default_value_t = 1_000,
        help = "Silent window that counts as a stall, in milliseconds"
    )]
    pub stall_window_ms: u64,
}

#[derive(Debug, Args)]
pub struct GlobalOption {
    #[arg(long, help = "Also write the log to this file")]
    pub log_file: Option<String>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "More logging: -v for debug, -vv for trace"
    )]
    pub verbosity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    #[clap(help = "Kernel io_uring ring")]
    Uring,
    #[clap(help = "Userspace delivery thread")]
    Reactor,
    #[clap(help = "Blocking epoll, to rule out the harness")]
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SetupArg {
    #[clap(help = "No setup flags")]
    Default,
    #[clap(help = "DEFER_TASKRUN and SINGLE_ISSUER")]
    DeferTaskrun,
    #[clap(help = "SQPOLL, usually needs privileges")]
    Sqpoll,
    #[clap(help = "default, then defer-taskrun, then sqpoll")]
    All,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Uring => BackendKind::Uring,
            BackendArg::Reactor => BackendKind::Reactor,
            BackendArg::Control => BackendKind::Control,
        }
    }
}

impl From<SetupArg> for SetupSelection {
    fn from(arg: SetupArg) -> Self {
        match arg {
            SetupArg::Default => SetupSelection::One(RingSetup::Default),
            SetupArg::DeferTaskrun => SetupSelection::One(RingSetup::DeferTaskrun),
            SetupArg::Sqpoll => SetupSelection::One(RingSetup::Sqpoll),
            SetupArg::All => SetupSelection::All,
        }
    }
}

impl CLIArg {
    #[must_use]
    pub fn run_plan(&self) -> RunPlan {
        let options = &self.race_options;
        RunPlan {
            backend: self.backend.into(),
            setups: self.setup.into(),
            race: RaceConfig {
                source_count: options.sources,
                producer_rounds: options.rounds,
                producer_interval: Duration::from_micros(options.interval_us),
                watchdog: WatchdogConfig {
                    poll_interval: Duration::from_millis(options.watchdog_poll_ms),
                    stall_window: Duration::from_millis(options.stall_window_ms),
                },
                ..RaceConfig::default()
            },
            faults: DeliveryFaults::none(),
        }
    }

    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::new_display_and_maybe_file(
            TracingConfig::level_filter_from_verbosity(self.global_options.verbosity),
            self.global_options.log_file.clone(),
        )
    }
}
