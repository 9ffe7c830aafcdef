#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use federation_runtime::dom::Element;
use federation_runtime::framework::{AppInstance, ComponentRef, Framework};
use federation_runtime::source::EntrySource;
use federation_runtime::{FederationConfig, Props, Runtime};
use semver::Version;
use std::collections::HashMap;
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{Builder, NamedTempFile};
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct TestFile(NamedTempFile);

impl Deref for TestFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.path()
    }
}

pub fn create_toml_test_file(content: &str) -> TestFile {
    let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    write!(temp_file, "{}", content).unwrap();
    TestFile(temp_file)
}

pub fn load_config_and_assert_ok(content: &str) -> FederationConfig {
    let config_result = FederationConfig::from_toml_str(content);
    assert!(
        config_result.is_ok(),
        "from_toml_str failed with: {:?}",
        config_result.err()
    );
    config_result.unwrap()
}

/// In-memory entry source that counts fetches per URI.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fetches: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits before answering, so concurrent callers overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn insert(&self, uri: &str, bytes: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(uri.to_string(), bytes.into());
    }

    pub fn insert_json(&self, uri: &str, value: serde_json::Value) {
        self.insert(uri, serde_json::to_vec(&value).unwrap());
    }

    pub fn fetches(&self, uri: &str) -> usize {
        self.fetches.lock().unwrap().get(uri).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EntrySource for MemorySource {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {uri}"))
    }
}

/// Counters shared by a [`RecordingFramework`] and all of its apps.
#[derive(Default)]
pub struct Recorder {
    pub created: AtomicUsize,
    pub mounted: AtomicUsize,
    pub updated: AtomicUsize,
    pub unmounted: AtomicUsize,
}

impl Recorder {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn mounted(&self) -> usize {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn updated(&self) -> usize {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn unmounted(&self) -> usize {
        self.unmounted.load(Ordering::SeqCst)
    }
}

/// Framework that renders props as JSON text and records its lifecycle.
pub struct RecordingFramework {
    name: String,
    version: Version,
    pub recorder: Arc<Recorder>,
    fail_mount: bool,
}

impl RecordingFramework {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            recorder: Arc::new(Recorder::default()),
            fail_mount: false,
        }
    }

    pub fn failing(name: &str, version: &str) -> Self {
        Self {
            fail_mount: true,
            ..Self::new(name, version)
        }
    }
}

impl Framework for RecordingFramework {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn create_app(&self, component: &ComponentRef, props: &Props) -> Result<Box<dyn AppInstance>> {
        self.recorder.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingApp {
            id: Uuid::new_v4(),
            component: component.name.clone(),
            props: props.clone(),
            element: None,
            recorder: self.recorder.clone(),
            fail_mount: self.fail_mount,
        }))
    }
}

struct RecordingApp {
    id: Uuid,
    component: String,
    props: Props,
    element: Option<Element>,
    recorder: Arc<Recorder>,
    fail_mount: bool,
}

impl AppInstance for RecordingApp {
    fn id(&self) -> Uuid {
        self.id
    }

    fn mount(&mut self, container: &Element) -> Result<()> {
        // Write something first so a failed mount has to be cleaned up
        let element = Element::new("span");
        element.set_attribute("data-component", self.component.clone());
        element.set_text(serde_json::to_string(&self.props)?);
        container.append_child(element.clone());
        if self.fail_mount {
            anyhow::bail!("boom while mounting {}", self.component);
        }
        self.recorder.mounted.fetch_add(1, Ordering::SeqCst);
        self.element = Some(element);
        Ok(())
    }

    fn set_props(&mut self, props: &Props) -> Result<()> {
        self.recorder.updated.fetch_add(1, Ordering::SeqCst);
        self.props = props.clone();
        if let Some(element) = &self.element {
            element.set_text(serde_json::to_string(&self.props)?);
        }
        Ok(())
    }

    fn unmount(&mut self) {
        if self.element.take().is_some() {
            self.recorder.unmounted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Register `framework` under `library`, counting how often the scope asks
/// for a new instance.
pub fn counting_constructor(
    framework: Arc<RecordingFramework>,
    constructions: Arc<AtomicUsize>,
) -> impl Fn(&Version) -> Result<Arc<dyn Framework>> + Send + Sync + 'static {
    move |_version: &Version| -> Result<Arc<dyn Framework>> {
        constructions.fetch_add(1, Ordering::SeqCst);
        Ok(framework.clone() as Arc<dyn Framework>)
    }
}

pub fn props(value: serde_json::Value) -> Props {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("props must be an object, got {other}"),
    }
}

pub const APP1_ENTRY: &str = "http://localhost:5001/assets/remoteEntry.json";
pub const VUE_ENTRY: &str = "http://localhost:5005/assets/remoteEntry.json";

/// A React-style remote exposing Button and Accordion, and a Vue-style
/// remote exposing Accordion.
pub fn publish_remotes(source: &MemorySource) {
    source.insert_json(
        APP1_ENTRY,
        serde_json::json!({
            "name": "vite_app1",
            "exposes": {
                "./Button": { "module": "./Button.json", "framework": "react" },
                "./Accordion": { "module": "./Accordion.json", "framework": "react" }
            },
            "shared": {
                "react": { "version": "18.2.0", "singleton": true }
            }
        }),
    );
    source.insert_json(
        "http://localhost:5001/assets/Button.json",
        serde_json::json!({ "name": "Button", "label": "Button from Vite App 1" }),
    );
    source.insert_json(
        "http://localhost:5001/assets/Accordion.json",
        serde_json::json!({ "name": "Accordion" }),
    );
    source.insert_json(
        VUE_ENTRY,
        serde_json::json!({
            "name": "vue_remote",
            "exposes": {
                "./Accordion": { "module": "./Accordion.json", "framework": "vue" }
            },
            "shared": {
                "vue": { "version": "3.4.21", "singleton": true, "requiredVersion": "^3.4.0" }
            }
        }),
    );
    source.insert_json(
        "http://localhost:5005/assets/Accordion.json",
        serde_json::json!({ "name": "Accordion" }),
    );
}

pub fn host_config() -> FederationConfig {
    load_config_and_assert_ok(&format!(
        r#"
        vite_app1 = "{APP1_ENTRY}"
        vue_remote = "vue_remote@{VUE_ENTRY}"

        [react]
        uri = "shared:react"
        version = "18.2.0"
        singleton = true
        "#
    ))
}

pub struct Fixture {
    pub runtime: Runtime,
    pub source: Arc<MemorySource>,
    pub react: Arc<RecordingFramework>,
    pub vue: Arc<RecordingFramework>,
    pub react_constructions: Arc<AtomicUsize>,
    pub vue_constructions: Arc<AtomicUsize>,
}

pub fn fixture(source: MemorySource) -> Fixture {
    fixture_with(source, host_config(), RecordingFramework::new("vue", "3.4.21"))
}

pub fn fixture_with(
    source: MemorySource,
    config: FederationConfig,
    vue: RecordingFramework,
) -> Fixture {
    init_tracing();
    let source = Arc::new(source);
    let react = Arc::new(RecordingFramework::new("react", "18.2.0"));
    let vue = Arc::new(vue);
    let react_constructions = Arc::new(AtomicUsize::new(0));
    let vue_constructions = Arc::new(AtomicUsize::new(0));
    let runtime = Runtime::builder(&config)
        .with_framework(
            "react",
            counting_constructor(react.clone(), react_constructions.clone()),
        )
        .with_framework(
            "vue",
            counting_constructor(vue.clone(), vue_constructions.clone()),
        )
        .with_source(source.clone())
        .build()
        .unwrap();
    Fixture {
        runtime,
        source,
        react,
        vue,
        react_constructions,
        vue_constructions,
    }
}
