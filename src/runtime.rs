use anyhow::Result as AnyResult;
use semver::{Version, VersionReq};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::Inflight;
use crate::error::{FederationError, Result};
use crate::framework::Framework;
use crate::loader::{FederationConfig, RemoteDefinition};
use crate::module::{Evaluation, ExposedModule, JsonModuleEvaluator, ModuleEvaluator};
use crate::registry::{RemoteRegistry, build_registries};
use crate::shared::{
    LibraryCatalog, LibraryConstructor, ShareOptions, SharedInstance, SharedScope, requirement,
};
use crate::source::{EntrySource, UriSource, resolve_module_uri};
use crate::types::{ModuleRef, RemoteEntry, normalize_exposed_path};

/// Tagged outcome of a module request.
#[derive(Debug, Clone)]
pub enum LoadState {
    Pending,
    Ready(Arc<ExposedModule>),
    Failed(FederationError),
}

impl LoadState {
    pub fn is_pending(&self) -> bool {
        matches!(self, LoadState::Pending)
    }

    pub fn module(&self) -> Option<&Arc<ExposedModule>> {
        match self {
            LoadState::Ready(module) => Some(module),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FederationError> {
        match self {
            LoadState::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<Result<Arc<ExposedModule>>> for LoadState {
    fn from(result: Result<Arc<ExposedModule>>) -> Self {
        match result {
            Ok(module) => LoadState::Ready(module),
            Err(e) => LoadState::Failed(e),
        }
    }
}

/// Observable handle for a module resolution running on the event loop.
///
/// Dropping the handle abandons the request; the resolution still finishes
/// and its result is discarded.
#[derive(Debug, Clone)]
pub struct ModuleRequest {
    module: ModuleRef,
    state: watch::Receiver<LoadState>,
}

impl ModuleRequest {
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    /// Current state without waiting.
    pub fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    /// Wait until the request is ready or failed.
    pub async fn settled(&mut self) -> LoadState {
        match self.state.wait_for(|state| !state.is_pending()).await {
            Ok(state) => state.clone(),
            Err(_) => LoadState::Failed(FederationError::Evaluation {
                remote: self.module.remote.clone(),
                path: self.module.path.clone(),
                reason: "resolution task ended without a result".to_string(),
            }),
        }
    }
}

/// A remote whose entry artifact has been fetched and parsed.
pub struct RemoteContainer {
    pub name: String,
    pub entry_uri: String,
    pub entry: RemoteEntry,
    modules: Inflight<String, Arc<ExposedModule>>,
}

impl RemoteContainer {
    pub fn exposed_paths(&self) -> impl Iterator<Item = &str> {
        self.entry.exposed_paths()
    }
}

impl std::fmt::Debug for RemoteContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContainer")
            .field("name", &self.name)
            .field("entry_uri", &self.entry_uri)
            .field("entry", &self.entry)
            .finish()
    }
}

/// Federation Runtime: resolves remote modules against shared dependencies.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    registry: RemoteRegistry,
    scope: Arc<SharedScope>,
    libraries: LibraryCatalog,
    evaluators: HashMap<String, Arc<dyn ModuleEvaluator>>,
    source: Arc<dyn EntrySource>,
    containers: Inflight<String, Arc<RemoteContainer>>,
}

impl Runtime {
    /// Create a RuntimeBuilder from a FederationConfig
    pub fn builder(config: &FederationConfig) -> RuntimeBuilder<'_> {
        RuntimeBuilder::new(config)
    }

    pub fn shared_scope(&self) -> &Arc<SharedScope> {
        &self.inner.scope
    }

    /// List all registered remotes
    pub fn list_remotes(&self) -> Vec<&RemoteDefinition> {
        let mut remotes: Vec<_> = self.inner.registry.get_remotes().collect();
        remotes.sort_by(|a, b| a.name.cmp(&b.name));
        remotes
    }

    /// Consume a shared framework runtime, e.g. for the host's own rendering.
    pub fn framework(&self, library: &str, required: &VersionReq) -> Result<Arc<dyn Framework>> {
        let instance = self.inner.scope.consume(library, required)?;
        instance.as_framework().ok_or_else(|| FederationError::SharedInit {
            library: library.to_string(),
            reason: "shared instance is not a component framework".to_string(),
        })
    }

    /// Consume a shared framework with the requirement the host configured
    /// for it (`required_version`, else `^version`), or any version if the
    /// host does not declare the library.
    pub fn host_framework(&self, library: &str) -> Result<Arc<dyn Framework>> {
        let required = self
            .inner
            .registry
            .host_requirement(library)
            .cloned()
            .unwrap_or(VersionReq::STAR);
        self.framework(library, &required)
    }

    /// Fetch (once) and return a remote's container.
    pub async fn container(&self, remote: &str) -> Result<Arc<RemoteContainer>> {
        let def = self
            .inner
            .registry
            .get_remote(remote)
            .ok_or_else(|| FederationError::RemoteNotFound(remote.to_string()))?;

        if let Some(container) = self.inner.containers.get(&def.name) {
            tracing::debug!(remote, "Using cached remote entry");
            return Ok(container);
        }
        let runtime = self.clone();
        let owned = def.clone();
        self.inner
            .containers
            .get_or_load(&def.name, move || async move {
                runtime.load_container(&owned).await
            })
            .await
            .unwrap_or_else(|| {
                Err(FederationError::Network {
                    remote: def.name.clone(),
                    uri: def.uri.clone(),
                    reason: "entry load ended without a result".to_string(),
                })
            })
    }

    /// Resolve an exposed module of a remote.
    pub async fn resolve(&self, remote: &str, path: &str) -> Result<Arc<ExposedModule>> {
        let container = self.container(remote).await?;
        let key = normalize_exposed_path(path).to_string();
        if container.entry.exposed(&key).is_none() {
            return Err(FederationError::ExportNotFound {
                remote: remote.to_string(),
                path: path.to_string(),
            });
        }
        let runtime = self.clone();
        let owner = container.clone();
        let target = key.clone();
        container
            .modules
            .get_or_load(&key, move || async move {
                runtime.evaluate(&owner, &target).await
            })
            .await
            .unwrap_or_else(|| {
                Err(FederationError::Evaluation {
                    remote: remote.to_string(),
                    path: key.clone(),
                    reason: "module evaluation ended without a result".to_string(),
                })
            })
    }

    /// Start resolving a module on the event loop.
    pub fn load(&self, module: ModuleRef) -> ModuleRequest {
        let (tx, rx) = watch::channel(LoadState::Pending);
        let runtime = self.clone();
        let target = module.clone();
        tokio::spawn(async move {
            let state = LoadState::from(runtime.resolve(&target.remote, &target.path).await);
            if tx.send(state).is_err() {
                tracing::debug!(module = %target, "Request abandoned before resolution finished");
            }
        });
        ModuleRequest { module, state: rx }
    }

    async fn load_container(&self, def: &RemoteDefinition) -> Result<Arc<RemoteContainer>> {
        tracing::debug!(remote = %def.name, uri = %def.uri, "Fetching remote entry");
        let bytes = self
            .inner
            .source
            .fetch(&def.uri)
            .await
            .map_err(|e| FederationError::Network {
                remote: def.name.clone(),
                uri: def.uri.clone(),
                reason: format!("{e:#}"),
            })?;

        let entry: RemoteEntry =
            serde_json::from_slice(&bytes).map_err(|e| FederationError::InvalidEntry {
                remote: def.name.clone(),
                reason: e.to_string(),
            })?;

        if let Some(expected) = &def.entry_name
            && expected != &entry.name
        {
            return Err(FederationError::InvalidEntry {
                remote: def.name.clone(),
                reason: format!("expected entry '{expected}', found '{}'", entry.name),
            });
        }

        self.register_shared(def, &entry)?;

        tracing::info!(
            remote = %def.name,
            uri = %def.uri,
            exposes = entry.exposes.len(),
            shared = entry.shared.len(),
            "Loaded remote entry"
        );
        Ok(Arc::new(RemoteContainer {
            name: def.name.clone(),
            entry_uri: def.uri.clone(),
            entry,
            modules: Inflight::new(),
        }))
    }

    /// Offer the library versions a remote bundles.
    fn register_shared(&self, def: &RemoteDefinition, entry: &RemoteEntry) -> Result<()> {
        for (library, shared) in &entry.shared {
            let Some(version) = &shared.version else {
                continue;
            };
            let version = Version::parse(version).map_err(|e| FederationError::InvalidEntry {
                remote: def.name.clone(),
                reason: format!("shared '{library}' has invalid version '{version}': {e}"),
            })?;
            let Some(factory) = self.inner.libraries.factory(library, &version) else {
                tracing::warn!(
                    remote = %def.name,
                    library = %library,
                    %version,
                    "No constructor for shared library offered by remote; offer skipped"
                );
                continue;
            };
            let options = ShareOptions::new(def.name.clone()).singleton(shared.singleton);
            self.inner.scope.provide(library, version, options, factory);
        }
        Ok(())
    }

    async fn evaluate(&self, container: &RemoteContainer, path: &str) -> Result<Arc<ExposedModule>> {
        let remote = container.name.as_str();
        let exposed = container
            .entry
            .exposed(path)
            .ok_or_else(|| FederationError::ExportNotFound {
                remote: remote.to_string(),
                path: path.to_string(),
            })?;
        let evaluation_error = |reason: String| FederationError::Evaluation {
            remote: remote.to_string(),
            path: path.to_string(),
            reason,
        };

        // Shared dependencies resolve before the bundle evaluates
        let mut shared = HashMap::new();
        for (library, declared) in &container.entry.shared {
            let required = requirement(
                declared.required_version.as_deref(),
                declared.version.as_deref(),
            )
            .map_err(|e| FederationError::InvalidEntry {
                remote: remote.to_string(),
                reason: format!("shared '{library}' has invalid version requirement: {e}"),
            })?;
            let instance = self.inner.scope.consume(library, &required)?;
            shared.insert(library.clone(), instance);
        }
        if !shared.contains_key(&exposed.framework) {
            let instance = self
                .inner
                .scope
                .consume(&exposed.framework, &VersionReq::STAR)?;
            shared.insert(exposed.framework.clone(), instance);
        }
        let runtime = shared
            .get(&exposed.framework)
            .and_then(SharedInstance::as_framework)
            .ok_or_else(|| {
                evaluation_error(format!(
                    "shared library '{}' is not a component framework",
                    exposed.framework
                ))
            })?;

        let evaluator = self.inner.evaluators.get(&exposed.format).ok_or_else(|| {
            evaluation_error(format!("no evaluator for module format '{}'", exposed.format))
        })?;

        let module_uri = resolve_module_uri(&container.entry_uri, &exposed.module);
        let bundle = self
            .inner
            .source
            .fetch(&module_uri)
            .await
            .map_err(|e| FederationError::Network {
                remote: remote.to_string(),
                uri: module_uri.clone(),
                reason: format!("{e:#}"),
            })?;

        let component = evaluator
            .evaluate(&Evaluation {
                remote,
                path,
                bundle: &bundle,
                shared: &shared,
            })
            .map_err(|e| evaluation_error(format!("{e:#}")))?;

        tracing::info!(
            remote,
            path,
            framework = %exposed.framework,
            component = %component.name,
            "Evaluated exposed module"
        );
        Ok(Arc::new(ExposedModule {
            remote: remote.to_string(),
            path: path.to_string(),
            framework: exposed.framework.clone(),
            runtime,
            component,
        }))
    }
}

/// Builder for configuring and creating a Runtime
pub struct RuntimeBuilder<'a> {
    config: &'a FederationConfig,
    libraries: LibraryCatalog,
    evaluators: HashMap<String, Arc<dyn ModuleEvaluator>>,
    source: Option<Arc<dyn EntrySource>>,
    scope: Option<Arc<SharedScope>>,
}

impl<'a> RuntimeBuilder<'a> {
    fn new(config: &'a FederationConfig) -> Self {
        let mut evaluators: HashMap<String, Arc<dyn ModuleEvaluator>> = HashMap::new();
        evaluators.insert("json".to_string(), Arc::new(JsonModuleEvaluator));
        Self {
            config,
            libraries: LibraryCatalog::new(),
            evaluators,
            source: None,
            scope: None,
        }
    }

    /// Register a constructor for a shared library.
    ///
    /// The name corresponds to the suffix in `uri = "shared:name"` in TOML and
    /// to the keys of a remote entry's `shared` table.
    pub fn with_library<F>(mut self, library: &str, constructor: F) -> Self
    where
        F: Fn(&Version) -> AnyResult<SharedInstance> + Send + Sync + 'static,
    {
        let constructor: LibraryConstructor = Arc::new(constructor);
        self.libraries.register(library, constructor);
        self
    }

    /// Register a component framework as a shared library.
    pub fn with_framework<F>(self, library: &str, constructor: F) -> Self
    where
        F: Fn(&Version) -> AnyResult<Arc<dyn Framework>> + Send + Sync + 'static,
    {
        self.with_library(library, move |version| {
            constructor(version).map(SharedInstance::framework)
        })
    }

    /// Register an evaluator for an additional module format.
    pub fn with_evaluator<E>(mut self, evaluator: E) -> Self
    where
        E: ModuleEvaluator + 'static,
    {
        self.evaluators
            .insert(evaluator.format().to_string(), Arc::new(evaluator));
        self
    }

    /// Fetch entries and bundles through `source` instead of [`UriSource`].
    pub fn with_source(mut self, source: Arc<dyn EntrySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Share dependencies through an existing scope.
    pub fn with_shared_scope(mut self, scope: Arc<SharedScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Build the Runtime
    pub fn build(self) -> AnyResult<Runtime> {
        let scope = self.scope.unwrap_or_default();
        let registry = build_registries(self.config, &self.libraries, &scope)?;
        Ok(Runtime {
            inner: Arc::new(RuntimeInner {
                registry,
                scope,
                libraries: self.libraries,
                evaluators: self.evaluators,
                source: self.source.unwrap_or_else(|| Arc::new(UriSource)),
                containers: Inflight::new(),
            }),
        })
    }
}
