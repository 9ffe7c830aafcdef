//! Core type definitions shared across the crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plain property bag passed from a host to a component.
pub type Props = serde_json::Map<String, serde_json::Value>;

/// Remote definition: where a remote's entry artifact lives.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RemoteDefinition {
    pub name: String,
    pub uri: String,
    /// Name the entry must declare, from the `entry@uri` form
    #[serde(default)]
    pub entry_name: Option<String>,
}

/// Shared library the host provides to every participant.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SharedDefinition {
    pub name: String,
    pub library: String,
    pub version: String,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub required_version: Option<String>,
}

/// A UI position in the host shell filled by a remote module.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SlotDefinition {
    pub name: String,
    pub module: ModuleRef,
    #[serde(default)]
    pub props: Props,
}

/// Address of an exposed module: `remote/path`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    pub remote: String,
    pub path: String,
}

impl ModuleRef {
    pub fn new(remote: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            path: path.into(),
        }
    }

    /// Parse `remote/path`, e.g. `vite_app1/Button`.
    pub fn parse(reference: &str) -> Option<Self> {
        let (remote, path) = reference.split_once('/')?;
        if remote.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::new(remote, path))
    }
}

impl std::fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.remote, self.path)
    }
}

/// Entry artifact published by a remote.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub exposes: BTreeMap<String, ExposedEntry>,
    #[serde(default)]
    pub shared: BTreeMap<String, SharedEntry>,
}

impl RemoteEntry {
    pub fn exposed(&self, path: &str) -> Option<&ExposedEntry> {
        let path = normalize_exposed_path(path);
        self.exposes
            .iter()
            .find(|(key, _)| normalize_exposed_path(key) == path)
            .map(|(_, entry)| entry)
    }

    pub fn exposed_paths(&self) -> impl Iterator<Item = &str> {
        self.exposes.keys().map(|key| normalize_exposed_path(key))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExposedEntry {
    /// Bundle location, relative to the entry unless absolute
    pub module: String,
    /// Shared library name of the component model the module is written against
    pub framework: String,
    #[serde(default = "default_format")]
    pub format: String,
}

pub fn default_format() -> String {
    "json".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SharedEntry {
    /// Version this remote bundles and can provide
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub required_version: Option<String>,
}

/// `./Button`, `/Button` and `Button` all address the same export.
pub fn normalize_exposed_path(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}
