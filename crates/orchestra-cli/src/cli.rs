//! Command-line argument definitions for the `orchestra` binary.

use clap::{Parser, Subcommand};

/// Operator harness for the Orchestra plugin host.
///
/// Configuration flags such as `--plugins-dir` must precede the subcommand.
#[derive(Parser, Debug)]
#[command(name = "orchestra", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Lists the plugins found in the plugins directory.
    Discover {
        /// Prints the manifests as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Starts a plugin, reports the state it reaches, and stops it again.
    Status {
        /// Plugin identifier.
        #[arg(value_name = "PLUGIN")]
        plugin: String,
    },
    /// Starts a plugin, calls one method, and prints the result as JSON.
    Invoke {
        /// Plugin identifier.
        #[arg(value_name = "PLUGIN")]
        plugin: String,
        /// Method name sent in the request.
        #[arg(value_name = "METHOD")]
        method: String,
        /// Request parameters as a JSON value.
        #[arg(long, value_name = "JSON", default_value = "{}")]
        params: String,
        /// Overrides the configured call timeout.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
}
