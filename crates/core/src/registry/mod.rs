//! Plugin table and on-demand surface creation.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::dom::{Element, ElementKind, NodeId, SelectOption};
use crate::instance::VisualizationInstance;
use crate::render::{Canvas, Size};
use crate::runtime::Runtime;
use crate::scene::VisualizationDescriptor;
use crate::{PhonoscopeError, Result};

/// Registered styles in registration order.
///
/// Registration is bookkeeping only. The container and surface elements are
/// materialized by [`VisualizationRegistry::mount`], which may run any number
/// of times without duplicating elements.
pub struct VisualizationRegistry {
    runtime: Runtime,
    instances: IndexMap<String, Rc<VisualizationInstance>>,
    created_surfaces: IndexSet<String>,
    last_container: Option<NodeId>,
}

impl VisualizationRegistry {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            instances: IndexMap::new(),
            created_surfaces: IndexSet::new(),
            last_container: None,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Wraps the descriptor in an instance and seeds its state. Registering a
    /// key again replaces the entry in place and stops the old instance.
    pub fn register(&mut self, descriptor: VisualizationDescriptor) -> Rc<VisualizationInstance> {
        let key = descriptor.key.clone();
        self.runtime
            .store
            .borrow_mut()
            .register_template(&key, descriptor.template.clone());

        let instance = Rc::new(VisualizationInstance::new(descriptor, self.runtime.clone()));
        if let Some(previous) = self.instances.insert(key.clone(), Rc::clone(&instance)) {
            tracing::warn!(key = %key, "visualization registered twice; replacing");
            previous.stop();
        } else {
            tracing::debug!(key = %key, "visualization registered");
        }
        instance
    }

    /// Creates every missing container and surface. Returns how many
    /// elements were created.
    pub fn mount(&mut self) -> usize {
        let page = &self.runtime.config.page;
        let viewport = Size::new(page.viewport_width, page.viewport_height);
        let mut document = self.runtime.document.borrow_mut();
        let mut created = 0;

        for instance in self.instances.values() {
            let descriptor = instance.descriptor();

            let container = match document.get_element_by_id(&descriptor.container_id) {
                Some(container) => container,
                None => {
                    let container = document.create_element(ElementKind::Block);
                    document.set_id(container, descriptor.container_id.clone());
                    document.set_hidden(container, true);
                    document.set_intrinsic_size(container, viewport);

                    let anchor = self
                        .last_container
                        .filter(|node| document.is_attached(*node))
                        .or_else(|| document.get_element_by_id(&page.caption_container_id));
                    let placed = match anchor {
                        Some(anchor) => document.insert_after(anchor, container),
                        None => false,
                    };
                    if !placed {
                        let body = document.body();
                        document.append_child(body, container);
                    }
                    created += 1;
                    container
                }
            };
            self.last_container = Some(container);

            if document.get_element_by_id(&descriptor.surface_id).is_none() {
                let surface = document.create_element(ElementKind::Canvas(Canvas::new(0, 0)));
                document.set_id(surface, descriptor.surface_id.clone());
                document.set_hidden(surface, true);
                document.append_child(container, surface);
                self.created_surfaces.insert(descriptor.surface_id.clone());
                created += 1;
            }
        }

        if created > 0 {
            tracing::debug!(created, "mounted visualization elements");
        }
        created
    }

    pub fn get(&self, key: &str) -> Option<Rc<VisualizationInstance>> {
        self.instances.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.instances.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn list_all(&self) -> impl Iterator<Item = &Rc<VisualizationInstance>> {
        self.instances.values()
    }

    /// Surface ids in registration order; shared surfaces appear once.
    pub fn list_all_surface_ids(&self) -> Vec<String> {
        let ids: IndexSet<&str> = self
            .instances
            .values()
            .map(|instance| instance.surface_id())
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Surfaces this registry created, as opposed to ones the page shipped.
    pub fn created_surfaces(&self) -> &IndexSet<String> {
        &self.created_surfaces
    }

    /// Repopulates the selection control: a disabled placeholder, then one
    /// option per style. Returns the number of style options.
    pub fn build_selection_ui(&self, select_id: &str) -> Result<usize> {
        let mut document = self.runtime.document.borrow_mut();
        let select = document
            .get_element_by_id(select_id)
            .filter(|node| {
                matches!(document.element(*node).map(Element::kind), Some(ElementKind::Select))
            })
            .ok_or_else(|| PhonoscopeError::MissingElement(select_id.to_string()))?;
        document.clear_children(select);

        let placeholder = SelectOption {
            value: String::new(),
            label: self.runtime.config.page.placeholder_label.clone(),
            disabled: true,
            selected: true,
        };
        let node = document.create_element(ElementKind::Option(placeholder));
        document.append_child(select, node);

        for instance in self.instances.values() {
            let descriptor = instance.descriptor();
            let option = SelectOption {
                value: descriptor.key.clone(),
                label: descriptor.label(),
                disabled: false,
                selected: false,
            };
            let node = document.create_element(ElementKind::Option(option));
            document.append_child(select, node);
        }
        Ok(self.instances.len())
    }

    /// Hides every visualization container.
    pub fn hide_all(&self) {
        let mut document = self.runtime.document.borrow_mut();
        for instance in self.instances.values() {
            if let Some(container) = document.get_element_by_id(instance.container_id()) {
                document.set_hidden(container, true);
            }
        }
    }
}

impl std::fmt::Debug for VisualizationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizationRegistry")
            .field("keys", &self.instances.keys().collect::<Vec<_>>())
            .field("created_surfaces", &self.created_surfaces)
            .finish()
    }
}
