//! Runtime for the `orchestra` operator binary.
//!
//! The binary is a thin harness over [`orchestra_plugins::Orchestrator`]: it
//! resolves configuration, installs logging, discovers plugins, and runs one
//! subcommand. Each invocation owns its plugin processes and stops them
//! before returning.
//!
//! [`run`] takes its argument list and output streams as parameters so tests
//! can drive it without spawning the binary.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use orchestra_plugins::Orchestrator;

mod cli;
mod commands;
mod config;
mod errors;
pub mod telemetry;

use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use errors::AppError;


/// Runs the CLI with the provided arguments and output streams.
///
/// Returns [`ExitCode::SUCCESS`] when the subcommand completes, the clap
/// usage code for malformed arguments, and [`ExitCode::FAILURE`] otherwise.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match execute(&args, stdout, stderr, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error)) if !error.use_stderr() => {
            drop(write!(stdout, "{error}"));
            ExitCode::SUCCESS
        }
        Err(AppError::CliUsage(error)) => {
            drop(write!(stderr, "{error}"));
            ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(1))
        }
        Err(error) => {
            drop(writeln!(stderr, "error: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W, E, L>(
    args: &[OsString],
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> Result<(), AppError>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let cli = Cli::try_parse_from(&split.command_arguments).map_err(AppError::CliUsage)?;
    let config = loader.load(&split.config_arguments)?;
    telemetry::initialise(&config)?;

    let orchestrator = Orchestrator::from_config(&config);
    let result = commands::execute(cli.command, &orchestrator, stdout, stderr);
    orchestrator.shutdown();
    result
}
