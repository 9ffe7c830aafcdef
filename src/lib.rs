//! Modulewise Federation Runtime
//!
//! A runtime for independently deployed front-end modules that supports
//! remote resolution, shared dependency deduplication, and cross-framework
//! mounting.

pub use adapter::MountAdapter;
pub use dom::Element;
pub use error::{FederationError, Result};
pub use framework::{AppInstance, Component, ComponentRef, Framework, TemplateFramework};
pub use loader::{FederationConfig, load_definitions};
pub use module::{ExposedModule, ModuleEvaluator};
pub use registry::RemoteRegistry;
pub use runtime::{LoadState, ModuleRequest, Runtime};
pub use shared::{SharedInstance, SharedScope};
pub use shell::HostShell;
pub use source::{EntrySource, UriSource};
pub use types::{ModuleRef, Props, RemoteEntry};

pub mod adapter;
mod cache;
pub mod dom;
pub mod error;
pub mod framework;
pub mod loader;
pub mod module;
pub mod registry;
pub mod runtime;
pub mod shared;
pub mod shell;
pub mod source;
pub mod types;
