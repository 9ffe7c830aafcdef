//! Cross-framework mount adapter.
//!
//! Embeds a component of one framework inside an element managed by a host
//! rendering with another. The host creates and removes the container; while
//! mounted, the adapter owns everything inside it.

use std::sync::Arc;
use uuid::Uuid;

use crate::dom::Element;
use crate::error::{FederationError, Result};
use crate::framework::{AppInstance, ComponentRef, Framework};
use crate::types::Props;

struct MountHandle {
    container: Element,
    component: ComponentRef,
    app: Box<dyn AppInstance>,
    props: Props,
}

pub struct MountAdapter {
    id: Uuid,
    framework: Arc<dyn Framework>,
    mounted: Option<MountHandle>,
}

impl MountAdapter {
    pub fn new(framework: Arc<dyn Framework>) -> Self {
        Self {
            id: Uuid::new_v4(),
            framework,
            mounted: None,
        }
    }

    /// Construct a fresh foreign app inside `container`.
    ///
    /// `component` is `None` while the reference is still resolving; that is
    /// rejected rather than mounting something partial. Mounting while
    /// already mounted replaces the previous instance.
    pub fn mount(
        &mut self,
        container: Element,
        component: Option<&ComponentRef>,
        props: Props,
    ) -> Result<()> {
        let component = component.ok_or_else(|| {
            FederationError::Mount("component reference is not resolved".to_string())
        })?;
        self.unmount();

        container.claim(self.id)?;
        let app = match self.framework.create_app(component, &props) {
            Ok(app) => app,
            Err(e) => {
                container.release(self.id);
                return Err(FederationError::Mount(format!(
                    "{} failed to create '{}': {e:#}",
                    self.framework.name(),
                    component.name
                )));
            }
        };
        let mut handle = MountHandle {
            container,
            component: component.clone(),
            app,
            props,
        };
        if let Err(e) = handle.app.mount(&handle.container) {
            teardown(self.id, handle);
            return Err(FederationError::Mount(format!(
                "{} failed to mount '{}': {e:#}",
                self.framework.name(),
                component.name
            )));
        }

        tracing::debug!(
            adapter = %self.id,
            instance = %handle.app.id(),
            framework = self.framework.name(),
            component = %component.name,
            "Mounted foreign component"
        );
        self.mounted = Some(handle);
        Ok(())
    }

    /// Apply new props to the live instance.
    pub fn update(&mut self, props: Props) -> Result<()> {
        let handle = self
            .mounted
            .as_mut()
            .ok_or_else(|| FederationError::Mount("adapter is not mounted".to_string()))?;
        if handle.props == props {
            return Ok(());
        }
        if let Err(e) = handle.app.set_props(&props) {
            let component = handle.component.name.clone();
            if let Some(handle) = self.mounted.take() {
                teardown(self.id, handle);
            }
            return Err(FederationError::Mount(format!(
                "{} failed to update '{component}': {e:#}",
                self.framework.name()
            )));
        }
        handle.props = props;
        Ok(())
    }

    /// Tear down the foreign instance and release the container. Safe to
    /// call any number of times.
    pub fn unmount(&mut self) {
        if let Some(handle) = self.mounted.take() {
            tracing::debug!(adapter = %self.id, instance = %handle.app.id(), "Unmounting foreign component");
            teardown(self.id, handle);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Identity of the live foreign instance.
    pub fn instance_id(&self) -> Option<Uuid> {
        self.mounted.as_ref().map(|handle| handle.app.id())
    }

    pub fn component(&self) -> Option<&ComponentRef> {
        self.mounted.as_ref().map(|handle| &handle.component)
    }

    /// Last applied props.
    pub fn props(&self) -> Option<&Props> {
        self.mounted.as_ref().map(|handle| &handle.props)
    }

    pub fn framework(&self) -> &Arc<dyn Framework> {
        &self.framework
    }
}

impl Drop for MountAdapter {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn teardown(owner: Uuid, mut handle: MountHandle) {
    handle.app.unmount();
    handle.container.clear();
    handle.container.release(owner);
}
