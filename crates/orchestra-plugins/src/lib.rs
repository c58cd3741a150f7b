//! Plugin orchestration for the Orchestra host.
//!
//! The `orchestra-plugins` crate discovers plugins on disk, runs each one as
//! a long-lived child process, and exchanges JSON-RPC 2.0 messages with it
//! over the process's standard streams, one JSON value per line.
//!
//! # Architecture
//!
//! - [`manifest`] and [`registry`] read `plugin.json` files from the
//!   immediate subdirectories of a plugins root and keep the valid ones.
//! - [`supervisor`] spawns a plugin process, decides when it is ready,
//!   detects its exit, and stops it.
//! - [`protocol`] and [`transport`] frame requests, parse responses, and
//!   correlate them with waiting callers by id.
//! - [`orchestrator`] ties these together behind four operations:
//!   discover, load, invoke, and unload.
//!
//! A plugin's failure never takes the host down with it: a malformed output
//! line is dropped, a timed-out call only fails that call, and a crashed
//! process fails its outstanding calls and is marked crashed. Nothing is
//! restarted automatically.
//!
//! # Example
//!
//! ```rust,no_run
//! use orchestra_plugins::{Orchestrator, SupervisorConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let orchestrator = Orchestrator::new("plugins", SupervisorConfig::default());
//! for manifest in orchestrator.discover_plugins().expect("readable plugins directory") {
//!     println!("{} v{}", manifest.id(), manifest.version());
//! }
//! orchestrator.load_plugin("docx").expect("plugin starts");
//! let rendered = orchestrator
//!     .invoke("docx", "render", json!({"template": "memo"}), Duration::from_secs(30))
//!     .expect("render succeeds");
//! println!("{rendered}");
//! ```

pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::error::PluginError;
pub use self::manifest::{PluginEntry, PluginManifest, PluginMetadata};
pub use self::orchestrator::{Orchestrator, PluginRecord, PluginState};
pub use self::registry::PluginRegistry;
pub use self::supervisor::{ExitReason, PluginStreams, ProcessSupervisor, SupervisorConfig};
pub use self::transport::RpcTransport;
