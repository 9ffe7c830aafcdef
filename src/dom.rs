//! Minimal DOM-capable element tree.
//!
//! Hosts create and destroy container elements; a mounted adapter claims a
//! container so nothing else writes into its subtree.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{FederationError, Result};

#[derive(Debug, Default)]
struct ElementData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
    children: Vec<Element>,
    owner: Option<Uuid>,
}

/// Shared handle to an element. Clones address the same node.
#[derive(Debug, Clone)]
pub struct Element(Arc<Mutex<ElementData>>);

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(ElementData {
            tag: tag.into(),
            ..Default::default()
        })))
    }

    pub fn tag(&self) -> String {
        self.data().tag.clone()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.data().attributes.insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.data().attributes.get(name).cloned()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.data().text = Some(text.into());
    }

    pub fn text(&self) -> Option<String> {
        self.data().text.clone()
    }

    pub fn append_child(&self, child: Element) {
        self.data().children.push(child);
    }

    pub fn remove_child(&self, child: &Element) -> bool {
        let mut data = self.data();
        let before = data.children.len();
        data.children.retain(|c| !c.ptr_eq(child));
        data.children.len() != before
    }

    pub fn children(&self) -> Vec<Element> {
        self.data().children.clone()
    }

    /// Drop all children and text.
    pub fn clear(&self) {
        let mut data = self.data();
        data.children.clear();
        data.text = None;
    }

    /// Claim exclusive ownership of this subtree.
    pub fn claim(&self, owner: Uuid) -> Result<()> {
        let mut data = self.data();
        match data.owner {
            Some(current) if current != owner => Err(FederationError::Mount(format!(
                "container <{}> is already owned by {current}",
                data.tag
            ))),
            _ => {
                data.owner = Some(owner);
                Ok(())
            }
        }
    }

    /// Release a claim held by `owner`; claims held by others are untouched.
    pub fn release(&self, owner: Uuid) {
        let mut data = self.data();
        if data.owner == Some(owner) {
            data.owner = None;
        }
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.data().owner
    }

    pub fn ptr_eq(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Serialize the subtree as markup.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        let data = self.data();
        out.push('<');
        out.push_str(&data.tag);
        for (name, value) in &data.attributes {
            out.push_str(&format!(" {name}=\"{}\"", escape(value)));
        }
        out.push('>');
        if let Some(text) = &data.text {
            out.push_str(&escape(text));
        }
        let children = data.children.clone();
        drop(data);
        for child in &children {
            child.render_into(out);
        }
        out.push_str("</");
        out.push_str(&self.tag());
        out.push('>');
    }

    fn data(&self) -> MutexGuard<'_, ElementData> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
