//! Subcommand execution against a freshly discovered plugin catalogue.

use std::io::Write;
use std::time::Duration;

use orchestra_plugins::{Orchestrator, PluginManifest};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cli::CliCommand;
use crate::errors::AppError;

const COMMANDS_TARGET: &str = "orchestra_cli::commands";

pub(crate) fn execute<W: Write, E: Write>(
    command: CliCommand,
    orchestrator: &Orchestrator,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<(), AppError> {
    let manifests = orchestrator.discover_plugins()?;
    for diagnostic in orchestrator.diagnostics() {
        writeln!(stderr, "warning: skipped {diagnostic}")?;
    }

    match command {
        CliCommand::Discover { json } => discover(&manifests, json, stdout),
        CliCommand::Status { plugin } => status(orchestrator, &plugin, stdout),
        CliCommand::Invoke {
            plugin,
            method,
            params,
            timeout_ms,
        } => {
            let params: Value = serde_json::from_str(&params).map_err(AppError::InvalidParams)?;
            let timeout = timeout_ms.map_or_else(|| orchestrator.call_timeout(), Duration::from_millis);
            invoke(orchestrator, &plugin, &method, params, timeout, stdout)
        }
    }
}

fn discover<W: Write>(
    manifests: &[PluginManifest],
    json: bool,
    stdout: &mut W,
) -> Result<(), AppError> {
    if json {
        return write_json(stdout, manifests);
    }
    for manifest in manifests {
        writeln!(
            stdout,
            "{}\t{}\t{}\t{}",
            manifest.id(),
            manifest.version(),
            manifest.name(),
            manifest.capabilities().join(",")
        )?;
    }
    Ok(())
}

fn status<W: Write>(orchestrator: &Orchestrator, plugin: &str, stdout: &mut W) -> Result<(), AppError> {
    let loaded = orchestrator.load_plugin(plugin);
    let state = orchestrator.status(plugin)?;
    writeln!(stdout, "{plugin}: {state}")?;
    orchestrator.unload_plugin(plugin)?;
    loaded.map_err(AppError::from)
}

fn invoke<W: Write>(
    orchestrator: &Orchestrator,
    plugin: &str,
    method: &str,
    params: Value,
    timeout: Duration,
    stdout: &mut W,
) -> Result<(), AppError> {
    orchestrator.load_plugin(plugin)?;
    debug!(target: COMMANDS_TARGET, plugin, method, "invoking plugin method");
    let outcome = orchestrator.invoke(plugin, method, params, timeout);
    orchestrator.unload_plugin(plugin)?;
    write_json(stdout, &outcome?)
}

fn write_json<W: Write, T: Serialize + ?Sized>(stdout: &mut W, value: &T) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *stdout, value).map_err(AppError::SerialiseOutput)?;
    writeln!(stdout)?;
    Ok(())
}
