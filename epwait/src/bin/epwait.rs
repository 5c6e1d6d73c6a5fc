// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words epoll

//! Entry point. Exit status: `0` pass, `1` fail, `77` skip.

use clap::Parser;
use std::process::ExitCode;
use uring_epwait::{CLIArg, run_plan, try_initialize_logging_global};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> miette::Result<ExitCode> {
    let cli_arg = CLIArg::parse();

    try_initialize_logging_global(&cli_arg.tracing_config())?;
    // % is Display, ? is Debug.
    tracing::debug!(message = "Start logging...", cli_arg = ?cli_arg);

    let verdict = run_plan(&cli_arg.run_plan());

    tracing::debug!(message = "Stop logging...", %verdict);
    Ok(verdict.into())
}
