//! Component model seam.
//!
//! A [`Framework`] is a component runtime (what a host or remote renders
//! with). It is shared between participants through the
//! [`SharedScope`](crate::shared::SharedScope), so a framework instance is the
//! thing that must not be duplicated.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::dom::Element;
use crate::types::Props;

/// A component definition as delivered by a remote bundle.
///
/// The body is opaque to everything except the framework that renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

pub type ComponentRef = Arc<Component>;

/// Component runtime capable of instantiating component definitions.
pub trait Framework: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &Version;

    /// Construct an application instance for `component`. The instance is not
    /// attached to any element until [`AppInstance::mount`] is called.
    fn create_app(
        &self,
        component: &ComponentRef,
        props: &Props,
    ) -> anyhow::Result<Box<dyn AppInstance>>;
}

/// A live application instance owned by whoever created it.
pub trait AppInstance: Send {
    /// Stable identity for the lifetime of the instance.
    fn id(&self) -> Uuid;

    fn mount(&mut self, container: &Element) -> anyhow::Result<()>;

    /// Apply new props without recreating the instance.
    fn set_props(&mut self, props: &Props) -> anyhow::Result<()>;

    fn unmount(&mut self);
}

/// Built-in component model: a component body carries a `template` whose
/// `{{key}}` placeholders are filled from props, and an optional `tag`.
#[derive(Debug, Clone)]
pub struct TemplateFramework {
    name: String,
    version: Version,
}

impl TemplateFramework {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl Framework for TemplateFramework {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn create_app(
        &self,
        component: &ComponentRef,
        props: &Props,
    ) -> anyhow::Result<Box<dyn AppInstance>> {
        let template = component
            .body
            .get("template")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("Component '{}' has no string 'template'", component.name)
            })?
            .to_string();
        let tag = component
            .body
            .get("tag")
            .and_then(|t| t.as_str())
            .unwrap_or("div")
            .to_string();
        Ok(Box::new(TemplateApp {
            id: Uuid::new_v4(),
            framework: self.name.clone(),
            component: component.name.clone(),
            tag,
            template,
            props: props.clone(),
            root: None,
            renders: 0,
        }))
    }
}

struct TemplateApp {
    id: Uuid,
    framework: String,
    component: String,
    tag: String,
    template: String,
    props: Props,
    root: Option<Element>,
    /// Internal state that survives prop updates
    renders: u64,
}

impl TemplateApp {
    fn render(&mut self) {
        let Some(root) = &self.root else {
            return;
        };
        self.renders += 1;
        root.set_text(fill_template(&self.template, &self.props));
        root.set_attribute("data-renders", self.renders.to_string());
    }
}

impl AppInstance for TemplateApp {
    fn id(&self) -> Uuid {
        self.id
    }

    fn mount(&mut self, container: &Element) -> anyhow::Result<()> {
        if self.root.is_some() {
            anyhow::bail!("Component '{}' is already mounted", self.component);
        }
        let root = Element::new(self.tag.clone());
        root.set_attribute("data-framework", self.framework.clone());
        root.set_attribute("data-component", self.component.clone());
        container.append_child(root.clone());
        self.root = Some(root);
        self.render();
        Ok(())
    }

    fn set_props(&mut self, props: &Props) -> anyhow::Result<()> {
        self.props = props.clone();
        self.render();
        Ok(())
    }

    fn unmount(&mut self) {
        self.root = None;
    }
}

fn fill_template(template: &str, props: &Props) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match props.get(key) {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(serde_json::Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
