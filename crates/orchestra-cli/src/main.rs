//! Entry point for the `orchestra` operator binary.
//!
//! All work is delegated to [`orchestra_cli::run`] so the same code path can
//! be driven from tests with in-memory streams.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    orchestra_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
