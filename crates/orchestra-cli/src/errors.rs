//! Errors reported by the CLI runtime.

use std::io;
use std::sync::Arc;

use orchestra_plugins::PluginError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("--params is not valid JSON: {0}")]
    InvalidParams(serde_json::Error),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(#[from] io::Error),
}
