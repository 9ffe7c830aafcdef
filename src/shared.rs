//! Shared-dependency scope.
//!
//! Host and remotes offer library versions with [`SharedScope::provide`];
//! consumers ask for a version range with [`SharedScope::consume`]. Instances
//! are constructed lazily, once, and singleton libraries never get a second
//! instance even when a consumer asks for a version the active one cannot
//! satisfy.

use semver::{Version, VersionReq};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FederationError, Result};
use crate::framework::Framework;

/// Handle to a constructed shared library instance.
///
/// Clones refer to the same instance; use [`SharedInstance::ptr_eq`] to check
/// identity.
#[derive(Clone)]
pub struct SharedInstance(Arc<dyn Any + Send + Sync>);

impl SharedInstance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wrap a component framework runtime so it can be shared.
    pub fn framework(framework: Arc<dyn Framework>) -> Self {
        Self::new(framework)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// The framework runtime, if this instance is one.
    pub fn as_framework(&self) -> Option<Arc<dyn Framework>> {
        self.downcast_ref::<Arc<dyn Framework>>().cloned()
    }

    pub fn ptr_eq(&self, other: &SharedInstance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for SharedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedInstance")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

/// Constructs a shared instance on first consumption.
pub type SharedFactory = Arc<dyn Fn() -> anyhow::Result<SharedInstance> + Send + Sync>;

/// Constructs a library instance for a given version. Registered on the
/// runtime so offers declared by remote entries can be instantiated.
pub type LibraryConstructor =
    Arc<dyn Fn(&Version) -> anyhow::Result<SharedInstance> + Send + Sync>;

/// Library constructors known to this process, by library name.
#[derive(Clone, Default)]
pub struct LibraryCatalog {
    constructors: HashMap<String, LibraryConstructor>,
}

impl LibraryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, library: impl Into<String>, constructor: LibraryConstructor) {
        self.constructors.insert(library.into(), constructor);
    }

    pub fn get(&self, library: &str) -> Option<&LibraryConstructor> {
        self.constructors.get(library)
    }

    /// A factory bound to one version of a library.
    pub fn factory(&self, library: &str, version: &Version) -> Option<SharedFactory> {
        let constructor = self.constructors.get(library)?.clone();
        let version = version.clone();
        let factory: SharedFactory = Arc::new(move || constructor(&version));
        Some(factory)
    }
}

impl std::fmt::Debug for LibraryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut libraries: Vec<_> = self.constructors.keys().collect();
        libraries.sort();
        f.debug_struct("LibraryCatalog")
            .field("libraries", &libraries)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ShareOptions {
    pub singleton: bool,
    /// Participant offering the library, for diagnostics
    pub provider: String,
}

impl ShareOptions {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            singleton: false,
            provider: provider.into(),
        }
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }
}

struct Offer {
    version: Version,
    provider: String,
    factory: Option<SharedFactory>,
    instance: Option<SharedInstance>,
}

#[derive(Default)]
struct SharedLibrary {
    singleton: bool,
    offers: Vec<Offer>,
    /// Index into `offers` of the instance every singleton consumer receives
    active: Option<usize>,
}

enum Selection {
    Ready(SharedInstance),
    Construct(usize),
}

impl SharedLibrary {
    /// Pick the offer that serves `required`.
    fn select(&self, library: &str, required: &VersionReq) -> Result<Selection> {
        if self.singleton && self.active.is_some() {
            return self.active_instance(library, required).map(Selection::Ready);
        }
        let Some(index) = self
            .offers
            .iter()
            .enumerate()
            .filter(|(_, offer)| required.matches(&offer.version))
            .max_by(|(_, a), (_, b)| a.version.cmp(&b.version))
            .map(|(index, _)| index)
        else {
            return Err(self.mismatch(library, required));
        };
        Ok(match &self.offers[index].instance {
            Some(instance) => Selection::Ready(instance.clone()),
            None => Selection::Construct(index),
        })
    }

    /// The singleton instance, if it satisfies `required`.
    fn active_instance(&self, library: &str, required: &VersionReq) -> Result<SharedInstance> {
        if let Some(index) = self.active {
            let offer = &self.offers[index];
            if required.matches(&offer.version)
                && let Some(instance) = &offer.instance
            {
                return Ok(instance.clone());
            }
            tracing::warn!(
                library,
                required = %required,
                active = %offer.version,
                "Singleton shared library cannot satisfy requirement"
            );
        }
        Err(self.mismatch(library, required))
    }

    fn mismatch(&self, library: &str, required: &VersionReq) -> FederationError {
        FederationError::VersionMismatch {
            library: library.to_string(),
            required: required.to_string(),
            available: self.available(),
        }
    }

    fn available(&self) -> String {
        if let Some(index) = self.active {
            return self.offers[index].version.to_string();
        }
        if self.offers.is_empty() {
            return "none".to_string();
        }
        self.offers
            .iter()
            .map(|offer| offer.version.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Process-wide table of shared library offers and instances.
///
/// Create one per process (or per test) and inject it into the runtime.
#[derive(Default)]
pub struct SharedScope {
    libraries: Mutex<HashMap<String, SharedLibrary>>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a library version. Returns `false` when the same library and
    /// version was already offered, in which case nothing changes.
    pub fn provide(
        &self,
        library: &str,
        version: Version,
        options: ShareOptions,
        factory: SharedFactory,
    ) -> bool {
        self.register(library, version, options, Some(factory), None)
    }

    /// Offer an instance that is already constructed.
    pub fn provide_instance(
        &self,
        library: &str,
        version: Version,
        options: ShareOptions,
        instance: SharedInstance,
    ) -> bool {
        self.register(library, version, options, None, Some(instance))
    }

    fn register(
        &self,
        library: &str,
        version: Version,
        options: ShareOptions,
        factory: Option<SharedFactory>,
        instance: Option<SharedInstance>,
    ) -> bool {
        let mut libraries = self.lock();
        let entry = libraries.entry(library.to_string()).or_default();
        if let Some(existing) = entry.offers.iter().find(|offer| offer.version == version) {
            tracing::debug!(
                library,
                %version,
                provider = %options.provider,
                existing = %existing.provider,
                "Shared library already provided"
            );
            return false;
        }

        entry.singleton |= options.singleton;
        let eager = instance.is_some();
        entry.offers.push(Offer {
            version: version.clone(),
            provider: options.provider.clone(),
            factory,
            instance,
        });
        if eager && entry.singleton && entry.active.is_none() {
            entry.active = Some(entry.offers.len() - 1);
        }
        tracing::debug!(
            library,
            %version,
            provider = %options.provider,
            singleton = entry.singleton,
            "Provided shared library"
        );
        true
    }

    /// Obtain an instance satisfying `required`, constructing it on first use.
    ///
    /// Factories run without the scope locked, so a constructor may consume
    /// other shared libraries. If two consumers construct the same offer
    /// concurrently, the first to finish wins and both get its instance.
    pub fn consume(&self, library: &str, required: &VersionReq) -> Result<SharedInstance> {
        let (index, factory) = {
            let libraries = self.lock();
            let Some(entry) = libraries.get(library) else {
                return Err(unprovided(library, required));
            };
            match entry.select(library, required)? {
                Selection::Ready(instance) => return Ok(instance),
                Selection::Construct(index) => {
                    let offer = &entry.offers[index];
                    let factory =
                        offer.factory.clone().ok_or_else(|| FederationError::SharedInit {
                            library: library.to_string(),
                            reason: format!("no factory for version {}", offer.version),
                        })?;
                    (index, factory)
                }
            }
        };

        let instance = factory().map_err(|e| FederationError::SharedInit {
            library: library.to_string(),
            reason: format!("{e:#}"),
        })?;

        let mut libraries = self.lock();
        let Some(entry) = libraries.get_mut(library) else {
            return Err(unprovided(library, required));
        };
        if entry.singleton
            && let Some(active) = entry.active
            && active != index
        {
            // Another consumer fixed the singleton while this one was constructing
            return entry.active_instance(library, required);
        }
        let offer = &mut entry.offers[index];
        let installed = match &offer.instance {
            Some(existing) => existing.clone(),
            None => {
                tracing::info!(
                    library,
                    version = %offer.version,
                    provider = %offer.provider,
                    "Initialized shared library"
                );
                offer.instance = Some(instance.clone());
                instance
            }
        };
        if entry.singleton {
            entry.active = Some(index);
        }
        Ok(installed)
    }

    /// Version and instance currently active for a singleton library.
    pub fn active(&self, library: &str) -> Option<(Version, SharedInstance)> {
        let libraries = self.lock();
        let entry = libraries.get(library)?;
        let offer = &entry.offers[entry.active?];
        offer
            .instance
            .clone()
            .map(|instance| (offer.version.clone(), instance))
    }

    /// Provided versions of a library, in the order they were offered.
    pub fn versions(&self, library: &str) -> Vec<Version> {
        self.lock()
            .get(library)
            .map(|entry| entry.offers.iter().map(|offer| offer.version.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of constructed instances of a library.
    pub fn instance_count(&self, library: &str) -> usize {
        self.lock()
            .get(library)
            .map(|entry| {
                entry
                    .offers
                    .iter()
                    .filter(|offer| offer.instance.is_some())
                    .count()
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedLibrary>> {
        self.libraries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for SharedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let libraries = self.lock();
        let mut names: Vec<_> = libraries.keys().collect();
        names.sort();
        f.debug_struct("SharedScope")
            .field("libraries", &names)
            .finish()
    }
}

fn unprovided(library: &str, required: &VersionReq) -> FederationError {
    FederationError::VersionMismatch {
        library: library.to_string(),
        required: required.to_string(),
        available: "none".to_string(),
    }
}

/// The requirement a participant declares for a shared library: an explicit
/// range, `^version` for a bundled version, or any version.
pub fn requirement(
    required_version: Option<&str>,
    version: Option<&str>,
) -> std::result::Result<VersionReq, semver::Error> {
    match (required_version, version) {
        (Some(range), _) => VersionReq::parse(range),
        (None, Some(version)) => VersionReq::parse(&format!("^{version}")),
        (None, None) => Ok(VersionReq::STAR),
    }
}
