//! Plugin registry: discovery and lookup of plugin manifests.
//!
//! [`PluginRegistry::scan`] walks the immediate subdirectories of a plugins
//! root and loads one manifest from each. A bad plugin (no manifest, invalid
//! JSON, missing required fields, duplicate identifier) is skipped and
//! recorded in [`PluginRegistry::diagnostics`]; it never prevents the rest of
//! the directory from being discovered. Each scan rebuilds the catalog from
//! scratch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PluginError;
use crate::manifest::PluginManifest;

/// Tracing target for discovery.
const REGISTRY_TARGET: &str = "orchestra_plugins::registry";

/// In-memory catalog of discovered plugin manifests.
///
/// # Example
///
/// ```no_run
/// use orchestra_plugins::PluginRegistry;
/// use std::path::Path;
///
/// let mut registry = PluginRegistry::new();
/// let manifests = registry.scan(Path::new("/opt/app/plugins")).expect("readable root");
/// for manifest in &manifests {
///     println!("{} {}", manifest.id(), manifest.version());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    order: Vec<String>,
    manifests: HashMap<String, PluginManifest>,
    diagnostics: Vec<PluginError>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the catalog from the plugins directory at `root`.
    ///
    /// Returns the valid manifests ordered by plugin directory name. A
    /// missing root yields an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] only if `root` exists but cannot be
    /// listed. Problems with individual plugins are never errors here.
    pub fn scan(&mut self, root: &Path) -> Result<Vec<PluginManifest>, PluginError> {
        let mut fresh = Self::new();
        for dir in plugin_directories(root)? {
            match PluginManifest::load(&dir) {
                Ok(manifest) => fresh.insert_scanned(manifest),
                Err(err) => fresh.skip(err),
            }
        }

        debug!(
            target: REGISTRY_TARGET,
            root = %root.display(),
            discovered = fresh.order.len(),
            skipped = fresh.diagnostics.len(),
            "plugin scan complete"
        );

        *self = fresh;
        Ok(self.manifests().cloned().collect())
    }

    fn insert_scanned(&mut self, manifest: PluginManifest) {
        if let Some(first) = self.manifests.get(manifest.id()) {
            let message = format!(
                "duplicate plugin id '{}' (already provided by {})",
                manifest.id(),
                first.directory().display()
            );
            self.skip(PluginError::manifest(manifest.directory(), message));
            return;
        }
        self.insert(manifest);
    }

    fn insert(&mut self, manifest: PluginManifest) {
        let id = manifest.id().to_owned();
        self.order.push(id.clone());
        self.manifests.insert(id, manifest);
    }

    fn skip(&mut self, err: PluginError) {
        warn!(
            target: REGISTRY_TARGET,
            error = %err,
            "skipping plugin"
        );
        self.diagnostics.push(err);
    }

    /// Adds a single manifest outside of a directory scan.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ManifestInvalid`] if the manifest fails
    /// validation or its identifier is already registered.
    pub fn register(&mut self, manifest: PluginManifest) -> Result<(), PluginError> {
        manifest
            .validate()
            .map_err(|message| PluginError::manifest(manifest.directory(), message))?;
        if self.manifests.contains_key(manifest.id()) {
            return Err(PluginError::manifest(
                manifest.directory(),
                format!("plugin '{}' is already registered", manifest.id()),
            ));
        }
        self.insert(manifest);
        Ok(())
    }

    /// Looks up a manifest by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if no such plugin was
    /// discovered.
    pub fn get(&self, id: &str) -> Result<&PluginManifest, PluginError> {
        self.manifests
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin { id: id.to_owned() })
    }

    /// Iterates over the catalog in discovery order.
    pub fn manifests(&self) -> impl Iterator<Item = &PluginManifest> {
        self.order.iter().filter_map(|id| self.manifests.get(id))
    }

    /// Returns the plugins declaring the named capability.
    #[must_use]
    pub fn find_by_capability(&self, capability: &str) -> Vec<&PluginManifest> {
        self.manifests()
            .filter(|m| m.has_capability(capability))
            .collect()
    }

    /// Returns the plugins in the given category (ASCII case-insensitive).
    #[must_use]
    pub fn find_by_category(&self, category: &str) -> Vec<&PluginManifest> {
        self.manifests()
            .filter(|m| m.metadata().category().eq_ignore_ascii_case(category))
            .collect()
    }

    /// Returns the plugins skipped by the last scan, with the reason.
    #[must_use]
    pub fn diagnostics(&self) -> &[PluginError] {
        &self.diagnostics
    }

    /// Returns the number of catalogued plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when no plugins are catalogued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Lists the immediate subdirectories of `root`, sorted by name.
fn plugin_directories(root: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                target: REGISTRY_TARGET,
                root = %root.display(),
                "plugins directory does not exist"
            );
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(PluginError::io(
                format!("plugins directory {}", root.display()),
                err,
            ));
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!(
                    target: REGISTRY_TARGET,
                    root = %root.display(),
                    error = %err,
                    "failed to read plugins directory entry"
                );
                None
            }
        })
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests;
