//! Plugin manifest types for describing plugin identity and capabilities.
//!
//! Each plugin lives in its own directory containing a `plugin.json`
//! manifest. A [`PluginManifest`] declares the plugin's identity
//! ([`PluginMetadata`]), the capability names it offers, how to launch it
//! ([`PluginEntry`]), and optionally the methods it answers
//! ([`PluginApi`]). Manifests are validated on load so that obviously broken
//! plugins are rejected during discovery rather than at spawn time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PluginError;

/// File name of the manifest inside each plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Command used to launch plugins whose manifest has no `entry` section.
const DEFAULT_ENTRY_COMMAND: &str = "node";

/// Script passed to [`DEFAULT_ENTRY_COMMAND`] when no `entry` is declared.
const DEFAULT_ENTRY_SCRIPT: &str = "index.js";

/// Identity fields of a plugin.
///
/// # Example
///
/// ```
/// use orchestra_plugins::PluginMetadata;
///
/// let meta = PluginMetadata::new("echo", "Echo", "1.0.0").with_category("test");
/// assert_eq!(meta.id(), "echo");
/// assert_eq!(meta.category(), "test");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
}

impl PluginMetadata {
    /// Creates metadata with the required identity fields.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the grouping category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Returns the unique plugin identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the author.
    #[must_use]
    pub const fn author(&self) -> &str {
        self.author.as_str()
    }

    /// Returns the description.
    #[must_use]
    pub const fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Returns the free-form grouping label.
    #[must_use]
    pub const fn category(&self) -> &str {
        self.category.as_str()
    }
}

/// How to launch a plugin process.
///
/// Relative commands containing a path separator are resolved against the
/// plugin directory; bare command names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

impl Default for PluginEntry {
    fn default() -> Self {
        Self {
            command: String::from(DEFAULT_ENTRY_COMMAND),
            args: vec![String::from(DEFAULT_ENTRY_SCRIPT)],
        }
    }
}

impl PluginEntry {
    /// Creates an entry from a command and its arguments.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Returns the command as written in the manifest.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Returns the arguments passed to the command.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// One parameter of a declared plugin method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodParam {
    /// Parameter name.
    pub name: String,
    /// Free-form type label, for example `string`.
    #[serde(rename = "type", default)]
    pub param_type: String,
    /// Whether callers must supply the parameter.
    #[serde(default)]
    pub required: bool,
}

/// A method the plugin declares it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMethod {
    /// JSON-RPC method name.
    pub name: String,
    /// Human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Declared parameters.
    #[serde(default)]
    pub params: Vec<MethodParam>,
    /// Free-form description of the result.
    #[serde(default)]
    pub returns: String,
}

/// Declared method surface of a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginApi {
    /// Protocol label; only `jsonrpc` is spoken by the host.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Methods the plugin answers.
    #[serde(default)]
    pub methods: Vec<PluginMethod>,
}

/// Other plugins this plugin declares it relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependencies {
    /// Identifiers of required plugins.
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// Declarative description of a plugin's identity and capabilities.
///
/// # Example
///
/// ```
/// use orchestra_plugins::PluginManifest;
/// use std::path::Path;
///
/// let json = r#"{
///     "metadata": {"id": "echo", "name": "Echo", "version": "1.0",
///                  "author": "t", "description": "d", "category": "test"},
///     "capabilities": ["echo"]
/// }"#;
/// let manifest = PluginManifest::from_json(json, Path::new("/plugins/echo"))
///     .expect("valid manifest");
/// assert_eq!(manifest.id(), "echo");
/// assert_eq!(manifest.capabilities(), &["echo"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    metadata: PluginMetadata,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    entry: PluginEntry,
    #[serde(default)]
    api: PluginApi,
    #[serde(default)]
    dependencies: PluginDependencies,
    #[serde(skip)]
    directory: PathBuf,
}

impl PluginManifest {
    /// Creates a manifest for a plugin installed in `directory`.
    #[must_use]
    pub fn new(metadata: PluginMetadata, directory: impl Into<PathBuf>) -> Self {
        Self {
            metadata,
            capabilities: Vec::new(),
            entry: PluginEntry::default(),
            api: PluginApi::default(),
            dependencies: PluginDependencies::default(),
            directory: directory.into(),
        }
    }

    /// Declares the capabilities this plugin offers.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self.dedup_capabilities();
        self
    }

    /// Overrides the launch command.
    #[must_use]
    pub fn with_entry(mut self, entry: PluginEntry) -> Self {
        self.entry = entry;
        self
    }

    /// Reads and validates `plugin.json` from a plugin directory.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestInvalid`] if the file is missing,
    /// unreadable, not valid JSON, or fails [`PluginManifest::validate`].
    pub fn load(directory: &Path) -> Result<Self, PluginError> {
        let path = directory.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path).map_err(|err| {
            let message = if err.kind() == std::io::ErrorKind::NotFound {
                format!("no {MANIFEST_FILE} in plugin directory")
            } else {
                format!("failed to read manifest: {err}")
            };
            PluginError::manifest(&path, message)
        })?;
        Self::parse(&text, directory, &path)
    }

    /// Parses and validates a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestInvalid`] if the text is not a valid
    /// manifest.
    pub fn from_json(text: &str, directory: &Path) -> Result<Self, PluginError> {
        Self::parse(text, directory, &directory.join(MANIFEST_FILE))
    }

    fn parse(text: &str, directory: &Path, path: &Path) -> Result<Self, PluginError> {
        let mut manifest: Self = serde_json::from_str(text)
            .map_err(|err| PluginError::manifest(path, format!("invalid JSON: {err}")))?;
        manifest.directory = directory.to_path_buf();
        manifest.dedup_capabilities();
        manifest
            .validate()
            .map_err(|message| PluginError::manifest(path, message))?;
        Ok(manifest)
    }

    fn dedup_capabilities(&mut self) {
        let mut seen = Vec::with_capacity(self.capabilities.len());
        self.capabilities.retain(|capability| {
            if seen.contains(capability) {
                false
            } else {
                seen.push(capability.clone());
                true
            }
        });
    }

    /// Checks the fields every plugin must provide.
    ///
    /// # Errors
    ///
    /// Returns a description of the first missing field: identifier, name,
    /// version, or entry command.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("metadata.id", self.metadata.id()),
            ("metadata.name", self.metadata.name()),
            ("metadata.version", self.metadata.version()),
            ("entry.command", self.entry.command()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(format!("missing {field}"));
            }
        }
        Ok(())
    }

    /// Returns the identity block.
    #[must_use]
    pub const fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Returns the unique plugin identifier.
    #[must_use]
    pub const fn id(&self) -> &str {
        self.metadata.id()
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.metadata.version()
    }

    /// Returns the declared capabilities in manifest order.
    #[must_use]
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Returns `true` if the plugin declares the named capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Returns the launch command.
    #[must_use]
    pub const fn entry(&self) -> &PluginEntry {
        &self.entry
    }

    /// Returns the declared method surface.
    #[must_use]
    pub const fn api(&self) -> &PluginApi {
        &self.api
    }

    /// Returns the declared plugin dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies.plugins
    }

    /// Returns the directory the plugin was loaded from.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the program to execute.
    ///
    /// Relative commands that name a path (`./bin/plugin`, `bin/plugin`) are
    /// joined onto the plugin directory so they do not depend on how the
    /// platform resolves programs relative to a child's working directory.
    #[must_use]
    pub fn program(&self) -> PathBuf {
        let command = Path::new(self.entry.command());
        let names_path = command.components().count() > 1;
        if command.is_relative() && names_path {
            self.directory.join(command)
        } else {
            command.to_path_buf()
        }
    }
}
