//! Separates configuration flags from command tokens.
//!
//! Configuration flags lead the argument list (`orchestra --plugins-dir ./p
//! invoke ...`). They are handed to `ortho_config` alongside the program name
//! while the remaining tokens go to the clap command parser.

use std::ffi::{OsStr, OsString};

use orchestra_config::Config;
use ortho_config::OrthoConfig;

use crate::errors::AppError;

/// Long flags understood by [`Config`].
///
/// Keep in step with the fields of `orchestra_config::Config`.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--plugins-dir",
    "--log-filter",
    "--log-format",
    "--startup-timeout-ms",
    "--ready-probe-ms",
    "--stop-grace-ms",
    "--call-timeout-ms",
];

pub(crate) trait ConfigLoader {
    /// Resolves configuration from the leading configuration arguments.
    ///
    /// `args` starts with the program name, as `ortho_config` expects.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loads configuration through the `ortho_config` layering.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let lossy = argument.to_string_lossy();
    let text: &str = &lossy;
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((text, false), |(flag, _)| (flag, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments split into the configuration prefix and the command.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    /// Program name followed by every leading configuration flag.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the command tokens.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit::default();
    };

    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter();
    let mut command_arguments = vec![program.clone()];

    while let Some(argument) = remaining.next() {
        match classify(argument) {
            FlagAction::Include { needs_value } => {
                config_arguments.push(argument.clone());
                if needs_value {
                    config_arguments.extend(remaining.next().cloned());
                }
            }
            FlagAction::Stop => {
                command_arguments.push(argument.clone());
                break;
            }
        }
    }
    command_arguments.extend(remaining.cloned());

    ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
