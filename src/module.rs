//! Exposed modules and the evaluators that turn fetched bundles into
//! component definitions.

use std::collections::HashMap;
use std::sync::Arc;

use crate::framework::{Component, ComponentRef, Framework};
use crate::shared::SharedInstance;

/// A resolved remote export: the component plus the framework runtime it
/// must be rendered with.
#[derive(Clone)]
pub struct ExposedModule {
    pub remote: String,
    pub path: String,
    /// Shared library name of the component model
    pub framework: String,
    pub runtime: Arc<dyn Framework>,
    pub component: ComponentRef,
}

impl std::fmt::Debug for ExposedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExposedModule")
            .field("remote", &self.remote)
            .field("path", &self.path)
            .field("framework", &self.framework)
            .field("runtime_version", &self.runtime.version().to_string())
            .field("component", &self.component.name)
            .finish()
    }
}

/// Everything an evaluator may look at while initializing a bundle.
pub struct Evaluation<'a> {
    pub remote: &'a str,
    pub path: &'a str,
    pub bundle: &'a [u8],
    /// Shared dependencies the remote declared, already resolved
    pub shared: &'a HashMap<String, SharedInstance>,
}

/// Turns bundle bytes of one format into a component definition.
pub trait ModuleEvaluator: Send + Sync {
    fn format(&self) -> &str;

    fn evaluate(&self, evaluation: &Evaluation<'_>) -> anyhow::Result<ComponentRef>;
}

/// Bundles serialized as a JSON component definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModuleEvaluator;

impl ModuleEvaluator for JsonModuleEvaluator {
    fn format(&self) -> &str {
        "json"
    }

    fn evaluate(&self, evaluation: &Evaluation<'_>) -> anyhow::Result<ComponentRef> {
        let component: Component = serde_json::from_slice(evaluation.bundle).map_err(|e| {
            anyhow::anyhow!(
                "Bundle for '{}/{}' is not a JSON component: {e}",
                evaluation.remote,
                evaluation.path
            )
        })?;
        Ok(Arc::new(component))
    }
}
