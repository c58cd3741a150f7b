//! Output format for the host's `tracing` records.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the `orchestra` binary renders log records on stderr.
///
/// Parsed case-insensitively from `--log-format` and `ORCHESTRA_LOG_FORMAT`.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per record, with plugin ids and methods as
    /// fields.
    #[default]
    Json,
    /// Single-line text for reading plugin activity in a terminal.
    Compact,
}

/// Error returned when `--log-format` names an unknown format.
pub type LogFormatParseError = strum::ParseError;
