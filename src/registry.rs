use anyhow::Result;
use semver::{Version, VersionReq};
use std::collections::HashMap;

use crate::loader::{FederationConfig, RemoteDefinition, SharedDefinition};
use crate::shared::{LibraryCatalog, ShareOptions, SharedScope, requirement};

/// Provider name recorded for libraries the host offers
pub const HOST_PROVIDER: &str = "host";

#[derive(Debug, Clone, Default)]
pub struct RemoteRegistry {
    remotes: HashMap<String, RemoteDefinition>,
    /// Requirement the host declares for each library it provides
    host_requirements: HashMap<String, VersionReq>,
}

impl RemoteRegistry {
    pub fn new(remotes: HashMap<String, RemoteDefinition>) -> Self {
        Self {
            remotes,
            host_requirements: HashMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_remote(&self, name: &str) -> Option<&RemoteDefinition> {
        self.remotes.get(name)
    }

    pub fn get_remotes(&self) -> impl Iterator<Item = &RemoteDefinition> {
        self.remotes.values()
    }

    pub fn host_requirement(&self, library: &str) -> Option<&VersionReq> {
        self.host_requirements.get(library)
    }
}

/// Build the remote registry and offer the host's shared libraries into
/// `scope`.
pub fn build_registries(
    config: &FederationConfig,
    libraries: &LibraryCatalog,
    scope: &SharedScope,
) -> Result<RemoteRegistry> {
    let remotes = config
        .remotes
        .iter()
        .map(|def| (def.name.clone(), def.clone()))
        .collect();

    let mut registry = RemoteRegistry::new(remotes);
    for def in &config.shared {
        let required = provide_host_library(def, libraries, scope)?;
        registry
            .host_requirements
            .insert(def.library.clone(), required);
    }

    Ok(registry)
}

fn provide_host_library(
    def: &SharedDefinition,
    libraries: &LibraryCatalog,
    scope: &SharedScope,
) -> Result<VersionReq> {
    let version = Version::parse(&def.version).map_err(|e| {
        anyhow::anyhow!(
            "Shared library '{}' has invalid version '{}': {e}",
            def.name,
            def.version
        )
    })?;
    let required = requirement(def.required_version.as_deref(), Some(&def.version))?;
    if !required.matches(&version) {
        return Err(anyhow::anyhow!(
            "Shared library '{}' provides {version}, which its own required_version '{required}' excludes",
            def.name
        ));
    }
    let factory = libraries.factory(&def.library, &version).ok_or_else(|| {
        anyhow::anyhow!(
            "Shared library '{}' (URI: 'shared:{}') has no registered constructor",
            def.name,
            def.library
        )
    })?;
    let options = ShareOptions::new(HOST_PROVIDER).singleton(def.singleton);
    if scope.provide(&def.library, version, options, factory) {
        tracing::info!(library = %def.library, version = %def.version, %required, "Host provides shared library");
    }
    Ok(required)
}
