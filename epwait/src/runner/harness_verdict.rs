// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::process::ExitCode;

/// Outcome of a whole run, as the test runner sees it through the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[repr(u8)]
pub enum HarnessVerdict {
    #[strum(serialize = "pass")]
    Pass = 0,
    #[strum(serialize = "fail")]
    Fail = 1,
    /// The host can't run the test (no io_uring, or the wait is unsupported).
    #[strum(serialize = "skip")]
    Skip = 77,
}

impl HarnessVerdict {
    #[must_use]
    pub fn exit_code(self) -> u8 { self as u8 }
}

impl From<HarnessVerdict> for ExitCode {
    fn from(verdict: HarnessVerdict) -> Self { ExitCode::from(verdict.exit_code()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(HarnessVerdict::Pass, 0)]
    #[test_case(HarnessVerdict::Fail, 1)]
    #[test_case(HarnessVerdict::Skip, 77)]
    fn exit_codes(verdict: HarnessVerdict, expected: u8) {
        assert_eq!(verdict.exit_code(), expected);
    }
}
