//! Shared services handed to every visualization instance.

use std::rc::Rc;

use crate::caption::Typewriter;
use crate::config::AppConfig;
use crate::dom::{Document, ElementKind, SharedDocument};
use crate::phonetics::{LayerGenerator, PhoneticTable};
use crate::render::Size;
use crate::state::{SharedStateStore, StateStore};
use crate::timeline::Scheduler;

/// Explicitly constructed service bundle; cloning shares the services.
#[derive(Clone)]
pub struct Runtime {
    pub config: Rc<AppConfig>,
    pub document: SharedDocument,
    pub scheduler: Scheduler,
    pub store: SharedStateStore,
    pub typewriter: Typewriter,
    pub layers: Rc<dyn LayerGenerator>,
}

impl Runtime {
    /// Services over the standard page with a fresh scheduler.
    pub fn new(config: AppConfig) -> Self {
        let document = standard_page(&config);
        Self::with_parts(config, document, Scheduler::new())
    }

    pub fn with_parts(config: AppConfig, document: Document, scheduler: Scheduler) -> Self {
        let document = document.shared();
        let store = StateStore::new(scheduler.clone()).shared();
        let typewriter = Typewriter::new(
            document.clone(),
            scheduler.clone(),
            config.caption.clone(),
            config.page.caption_container_id.clone(),
        );
        Self {
            config: Rc::new(config),
            document,
            scheduler,
            store,
            typewriter,
            layers: Rc::new(PhoneticTable::english()),
        }
    }

    pub fn with_layer_generator(mut self, layers: Rc<dyn LayerGenerator>) -> Self {
        self.layers = layers;
        self
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("typewriter", &self.typewriter)
            .finish()
    }
}

/// Page skeleton the visualizations mount into: the caption container
/// followed by the selection control.
pub fn standard_page(config: &AppConfig) -> Document {
    let page = &config.page;
    let mut document = Document::new(page.viewport_width, page.viewport_height);
    let body = document.body();

    let caption = document.create_element(ElementKind::Block);
    document.set_id(caption, page.caption_container_id.clone());
    document.set_intrinsic_size(
        caption,
        Size::new(config.caption.width, config.caption.base_font_px * 2.0),
    );
    document.append_child(body, caption);

    let select = document.create_element(ElementKind::Select);
    document.set_id(select, page.selector_id.clone());
    document.append_child(body, select);

    document.flush_layout();
    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_page_has_caption_then_selector() {
        let config = AppConfig::default();
        let document = standard_page(&config);
        let caption = document
            .get_element_by_id(&config.page.caption_container_id)
            .unwrap();
        let select = document.get_element_by_id(&config.page.selector_id).unwrap();
        assert_eq!(document.children(document.body()), &[caption, select]);
    }
}
