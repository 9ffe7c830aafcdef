//! Host application shell.
//!
//! Owns a root element with one container per slot. Each slot tracks the
//! module request that fills it and renders a placeholder, an error or the
//! resolved component.

use std::sync::Arc;

use crate::adapter::MountAdapter;
use crate::dom::Element;
use crate::error::FederationError;
use crate::framework::{AppInstance, Framework};
use crate::module::ExposedModule;
use crate::runtime::{LoadState, ModuleRequest, Runtime};
use crate::types::{ModuleRef, Props, SlotDefinition};

pub const LOADING_CLASS: &str = "federation-loading";
pub const ERROR_CLASS: &str = "federation-error";

enum View {
    Empty,
    /// Same framework as the host, rendered directly
    Native(Box<dyn AppInstance>),
    /// Foreign framework, rendered through an adapter
    Foreign(MountAdapter),
}

struct Slot {
    name: String,
    module: ModuleRef,
    props: Props,
    container: Element,
    request: Option<ModuleRequest>,
    state: LoadState,
    view: View,
}

impl Slot {
    /// Failed, or nothing rendered and nothing in flight.
    fn needs_request(&self) -> bool {
        matches!(self.state, LoadState::Failed(_))
            || (matches!(self.view, View::Empty) && self.request.is_none())
    }

    fn teardown(&mut self) {
        match std::mem::replace(&mut self.view, View::Empty) {
            View::Empty => {}
            View::Native(mut app) => {
                app.unmount();
                self.container.clear();
            }
            View::Foreign(mut adapter) => adapter.unmount(),
        }
    }

    fn render_loading(&self) {
        self.container.clear();
        let placeholder = Element::new("div");
        placeholder.set_attribute("class", LOADING_CLASS);
        placeholder.set_text(format!("Loading remote {}...", self.module));
        self.container.append_child(placeholder);
    }

    fn render_error(&self, error: &FederationError) {
        self.container.clear();
        let indicator = Element::new("div");
        indicator.set_attribute("class", ERROR_CLASS);
        indicator.set_text(format!("Failed to load remote {}: {error}", self.module));
        self.container.append_child(indicator);
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub struct HostShell {
    runtime: Runtime,
    framework: Arc<dyn Framework>,
    root: Element,
    slots: Vec<Slot>,
}

impl HostShell {
    /// `framework` is the component model the host itself renders with.
    pub fn new(runtime: Runtime, framework: Arc<dyn Framework>) -> Self {
        let root = Element::new("div");
        root.set_attribute("id", "root");
        Self {
            runtime,
            framework,
            root,
            slots: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Place every configured slot.
    pub fn place_all(&mut self, slots: &[SlotDefinition]) {
        for slot in slots {
            self.place(&slot.name, slot.module.clone(), slot.props.clone());
        }
    }

    /// Fill `slot` with a remote module.
    ///
    /// Re-placing the same module only passes the new props on, unless the
    /// slot failed, in which case it is requested again. A different module
    /// tears the old view down and resolves again.
    pub fn place(&mut self, slot: &str, module: ModuleRef, props: Props) {
        if let Some(index) = self.position(slot) {
            if self.slots[index].module == module && !self.slots[index].needs_request() {
                self.update_props(index, props);
                return;
            }
            let existing = &mut self.slots[index];
            existing.teardown();
            existing.module = module;
            existing.props = props;
            self.request(index);
            return;
        }

        let container = Element::new("div");
        container.set_attribute("data-slot", slot);
        self.root.append_child(container.clone());
        self.slots.push(Slot {
            name: slot.to_string(),
            module,
            props,
            container,
            request: None,
            state: LoadState::Pending,
            view: View::Empty,
        });
        self.request(self.slots.len() - 1);
    }

    /// Remove a slot and everything rendered into it. A resolution still in
    /// flight for the slot is abandoned.
    pub fn remove(&mut self, slot: &str) -> bool {
        let Some(index) = self.position(slot) else {
            return false;
        };
        let mut removed = self.slots.remove(index);
        removed.teardown();
        self.root.remove_child(&removed.container);
        true
    }

    /// Apply every request that has settled, without waiting.
    pub fn poll(&mut self) {
        for index in 0..self.slots.len() {
            let settled = self.slots[index]
                .request
                .as_ref()
                .map(ModuleRequest::state)
                .filter(|state| !state.is_pending());
            if let Some(state) = settled {
                self.apply(index, state);
            }
        }
    }

    /// Wait for every pending request and apply the results.
    pub async fn settle(&mut self) {
        for index in 0..self.slots.len() {
            let Some(request) = self.slots[index].request.as_mut() else {
                continue;
            };
            let state = request.settled().await;
            self.apply(index, state);
        }
    }

    pub fn state(&self, slot: &str) -> Option<&LoadState> {
        self.position(slot).map(|index| &self.slots[index].state)
    }

    pub fn container(&self, slot: &str) -> Option<&Element> {
        self.position(slot).map(|index| &self.slots[index].container)
    }

    /// Identity of the foreign instance mounted in `slot`, if any.
    pub fn foreign_instance(&self, slot: &str) -> Option<uuid::Uuid> {
        let index = self.position(slot)?;
        match &self.slots[index].view {
            View::Foreign(adapter) => adapter.instance_id(),
            _ => None,
        }
    }

    /// Identity of the natively rendered instance in `slot`, if any.
    pub fn native_instance(&self, slot: &str) -> Option<uuid::Uuid> {
        let index = self.position(slot)?;
        match &self.slots[index].view {
            View::Native(app) => Some(app.id()),
            _ => None,
        }
    }

    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    /// Serialize the whole host tree.
    pub fn render(&self) -> String {
        self.root.render()
    }

    fn position(&self, slot: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == slot)
    }

    fn request(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.request = Some(self.runtime.load(slot.module.clone()));
        slot.state = LoadState::Pending;
        slot.render_loading();
    }

    fn update_props(&mut self, index: usize, props: Props) {
        let slot = &mut self.slots[index];
        if slot.props == props {
            return;
        }
        slot.props = props.clone();
        let result = match &mut slot.view {
            View::Empty => Ok(()),
            View::Native(app) => app
                .set_props(&props)
                .map_err(|e| FederationError::Mount(format!("{e:#}"))),
            View::Foreign(adapter) => adapter.update(props),
        };
        if let Err(e) = result {
            self.fail(index, e);
        }
    }

    fn apply(&mut self, index: usize, state: LoadState) {
        self.slots[index].request = None;
        match state {
            LoadState::Pending => {}
            LoadState::Ready(module) => {
                self.slots[index].state = LoadState::Ready(module.clone());
                if let Err(e) = self.render_module(index, &module) {
                    self.fail(index, e);
                }
            }
            LoadState::Failed(e) => self.fail(index, e),
        }
    }

    fn render_module(
        &mut self,
        index: usize,
        module: &ExposedModule,
    ) -> Result<(), FederationError> {
        let host_framework = self.framework.clone();
        let slot = &mut self.slots[index];
        slot.teardown();
        slot.container.clear();

        if module.framework == host_framework.name() {
            let mut app = host_framework
                .create_app(&module.component, &slot.props)
                .map_err(|e| FederationError::Mount(format!("{e:#}")))?;
            if let Err(e) = app.mount(&slot.container) {
                app.unmount();
                slot.container.clear();
                return Err(FederationError::Mount(format!("{e:#}")));
            }
            tracing::info!(slot = %slot.name, module = %slot.module, "Rendered remote component natively");
            slot.view = View::Native(app);
        } else {
            let mut adapter = MountAdapter::new(module.runtime.clone());
            adapter.mount(
                slot.container.clone(),
                Some(&module.component),
                slot.props.clone(),
            )?;
            tracing::info!(
                slot = %slot.name,
                module = %slot.module,
                framework = %module.framework,
                "Mounted remote component through adapter"
            );
            slot.view = View::Foreign(adapter);
        }
        Ok(())
    }

    fn fail(&mut self, index: usize, error: FederationError) {
        let slot = &mut self.slots[index];
        tracing::warn!(slot = %slot.name, module = %slot.module, "Remote module failed: {error}");
        slot.teardown();
        slot.render_error(&error);
        slot.state = LoadState::Failed(error);
    }
}
