//! Selection and input wiring.
//!
//! The orchestrator decides which visualization is live, re-renders it when
//! the word or selection changes, and turns wheel and drag input on a
//! surface into transform writes followed by a redraw of the instance that
//! owns the surface.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::config::ZoomConfig;
use crate::dom::SharedDocument;
use crate::instance::{RenderHandle, VisualizationInstance};
use crate::registry::VisualizationRegistry;
use crate::render::Point;
use crate::timeline::{FrameHandle, Scheduler};
use crate::transform::{Transform, TransformReader};
use crate::{PhonoscopeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

struct ZoomAnimation {
    target: Transform,
    owner: Rc<VisualizationInstance>,
    frame: FrameHandle,
}

type ZoomAnimations = Rc<RefCell<HashMap<String, ZoomAnimation>>>;

#[derive(Debug, Clone)]
struct DragState {
    surface_id: String,
    last: Point,
}

pub struct Orchestrator {
    registry: VisualizationRegistry,
    document: SharedDocument,
    scheduler: Scheduler,
    zoom: ZoomConfig,
    surfaces: IndexSet<String>,
    selected: Option<String>,
    active: Option<Rc<VisualizationInstance>>,
    word: String,
    last_run: Option<RenderHandle>,
    zooms: ZoomAnimations,
    drag: Option<DragState>,
}

impl Orchestrator {
    /// Mounts the registry's surfaces, fills the selection control and
    /// starts listening on every surface.
    pub fn attach(mut registry: VisualizationRegistry) -> Self {
        registry.mount();
        let runtime = registry.runtime().clone();
        if let Err(err) = registry.build_selection_ui(&runtime.config.page.selector_id) {
            tracing::warn!(%err, "selection control not populated");
        }
        let surfaces = registry.list_all_surface_ids().into_iter().collect();
        tracing::info!(styles = registry.len(), "orchestrator attached");

        Self {
            registry,
            document: runtime.document.clone(),
            scheduler: runtime.scheduler.clone(),
            zoom: runtime.config.zoom,
            surfaces,
            selected: None,
            active: None,
            word: String::new(),
            last_run: None,
            zooms: Rc::default(),
            drag: None,
        }
    }

    pub fn registry(&self) -> &VisualizationRegistry {
        &self.registry
    }

    pub fn active_key(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    /// Handle of the most recent render started here.
    pub fn last_run(&self) -> Option<&RenderHandle> {
        self.last_run.as_ref()
    }

    /// Makes `key` the live visualization and renders the current word.
    pub fn select(&mut self, key: &str) -> Result<Option<RenderHandle>> {
        if !self.registry.contains(key) {
            return Err(PhonoscopeError::UnknownVisualization(key.to_string()));
        }
        self.selected = Some(key.to_string());
        {
            let mut document = self.document.borrow_mut();
            let selector = &self.registry.runtime().config.page.selector_id;
            if let Some(select) = document.get_element_by_id(selector) {
                document.select_value(select, key);
            }
        }
        tracing::info!(key, "visualization selected");
        Ok(self.activate())
    }

    /// Sets the word and re-renders the selected visualization, if any.
    pub fn set_word(&mut self, word: &str) -> Option<RenderHandle> {
        self.word = word.trim().to_string();
        if self.selected.is_none() {
            tracing::debug!("word set without a selected visualization");
            return None;
        }
        self.activate()
    }

    /// Tears down the live visualization and hides every container.
    pub fn deselect(&mut self) {
        self.teardown();
        self.selected = None;
    }

    /// Stops whatever ran before, hides every container, then renders the
    /// selected visualization.
    fn activate(&mut self) -> Option<RenderHandle> {
        self.teardown();
        let key = self.selected.clone()?;
        let instance = self.registry.get(&key)?;
        self.active = Some(Rc::clone(&instance));

        let handle = instance.render(&self.word);
        if handle.is_some() {
            self.last_run = handle.clone();
        }
        handle
    }

    fn teardown(&mut self) {
        self.cancel_zooms();
        self.drag = None;
        if let Some(previous) = self.active.take() {
            previous.stop();
        }
        self.registry.hide_all();
    }

    /// The selected instance if it draws on `surface_id`, otherwise the
    /// first registered instance that does.
    pub fn owner_of_surface(&self, surface_id: &str) -> Option<Rc<VisualizationInstance>> {
        self.selected
            .as_deref()
            .and_then(|key| self.registry.get(key))
            .filter(|instance| instance.surface_id() == surface_id)
            .or_else(|| {
                self.registry
                    .list_all()
                    .find(|instance| instance.surface_id() == surface_id)
                    .cloned()
            })
    }

    pub fn listens_on(&self, surface_id: &str) -> bool {
        self.surfaces.contains(surface_id)
    }

    /// Zooms about `pointer`: negative `delta_y` zooms in. Successive wheel
    /// events retarget an animation already in flight.
    pub fn on_wheel(&mut self, surface_id: &str, pointer: Point, delta_y: f64) -> bool {
        if delta_y == 0.0 || !delta_y.is_finite() || !self.listens_on(surface_id) {
            return false;
        }
        let Some(owner) = self.owner_of_surface(surface_id) else {
            tracing::debug!(surface_id, "wheel on a surface nobody owns");
            return false;
        };

        let base = match self.zooms.borrow().get(surface_id) {
            Some(animation) => animation.target,
            None => {
                TransformReader::read_clamped(&self.document.borrow(), surface_id, &self.zoom)
            }
        };
        let factor = if delta_y < 0.0 {
            1.0 + self.zoom.wheel_step
        } else {
            1.0 - self.zoom.wheel_step
        };
        let scale = (base.scale * factor).clamp(self.zoom.min_scale, self.zoom.max_scale);
        let target = base.zoom_about(pointer, scale);
        tracing::trace!(surface_id, scale, "zoom target updated");

        let mut zooms = self.zooms.borrow_mut();
        match zooms.get_mut(surface_id) {
            Some(animation) => {
                animation.target = target;
                animation.owner = owner;
            }
            None => {
                let frame = schedule_zoom_frame(self.zoom_driver(), surface_id.to_string());
                zooms.insert(
                    surface_id.to_string(),
                    ZoomAnimation {
                        target,
                        owner,
                        frame,
                    },
                );
            }
        }
        true
    }

    pub fn is_zooming(&self, surface_id: &str) -> bool {
        self.zooms.borrow().contains_key(surface_id)
    }

    pub fn on_pointer_down(&mut self, surface_id: &str, pointer: Point, button: PointerButton) {
        if button != PointerButton::Primary || !self.listens_on(surface_id) {
            return;
        }
        self.cancel_zoom(surface_id);
        self.drag = Some(DragState {
            surface_id: surface_id.to_string(),
            last: pointer,
        });
    }

    /// Pans 1:1 with the pointer while the primary button is held.
    pub fn on_pointer_move(&mut self, surface_id: &str, pointer: Point) -> bool {
        let Some(drag) = self.drag.as_mut().filter(|drag| drag.surface_id == surface_id) else {
            return false;
        };
        let (dx, dy) = (pointer.x - drag.last.x, pointer.y - drag.last.y);
        drag.last = pointer;

        {
            let mut document = self.document.borrow_mut();
            let panned =
                TransformReader::read_clamped(&document, surface_id, &self.zoom).pan(dx, dy);
            TransformReader::write(&mut document, surface_id, panned);
        }
        match self.owner_of_surface(surface_id) {
            Some(owner) => owner.redraw(),
            None => false,
        }
    }

    pub fn on_pointer_up(&mut self, button: PointerButton) {
        if button == PointerButton::Primary {
            self.drag = None;
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Snaps the surface back to the identity transform.
    pub fn reset_view(&mut self, surface_id: &str) -> bool {
        self.cancel_zoom(surface_id);
        if !TransformReader::reset(&mut self.document.borrow_mut(), surface_id) {
            return false;
        }
        if let Some(owner) = self.owner_of_surface(surface_id) {
            owner.redraw();
        }
        true
    }

    fn cancel_zoom(&self, surface_id: &str) {
        if let Some(animation) = self.zooms.borrow_mut().remove(surface_id) {
            self.scheduler.cancel_frame(animation.frame);
        }
    }

    fn cancel_zooms(&self) {
        for (_, animation) in self.zooms.borrow_mut().drain() {
            self.scheduler.cancel_frame(animation.frame);
        }
    }

    fn zoom_driver(&self) -> ZoomDriver {
        ZoomDriver {
            document: self.document.clone(),
            scheduler: self.scheduler.clone(),
            zooms: Rc::clone(&self.zooms),
            config: self.zoom,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("selected", &self.selected)
            .field("word", &self.word)
            .field("surfaces", &self.surfaces)
            .field("zooming", &self.zooms.borrow().len())
            .finish()
    }
}

/// Everything one zoom frame needs, detached from the orchestrator.
#[derive(Clone)]
struct ZoomDriver {
    document: SharedDocument,
    scheduler: Scheduler,
    zooms: ZoomAnimations,
    config: ZoomConfig,
}

fn schedule_zoom_frame(driver: ZoomDriver, surface_id: String) -> FrameHandle {
    let scheduler = driver.scheduler.clone();
    scheduler.request_frame(move |_| step_zoom(driver, surface_id))
}

fn step_zoom(driver: ZoomDriver, surface_id: String) {
    let Some((target, owner)) = driver
        .zooms
        .borrow()
        .get(&surface_id)
        .map(|animation| (animation.target, Rc::clone(&animation.owner)))
    else {
        return;
    };

    let (next, settled) = {
        let mut document = driver.document.borrow_mut();
        let current = TransformReader::read_clamped(&document, &surface_id, &driver.config);
        let config = &driver.config;
        let (next, settled) = current.approach(target, config.damping, config.epsilon);
        TransformReader::write(&mut document, &surface_id, next);
        (next, settled)
    };
    owner.redraw();

    if settled {
        tracing::trace!(surface_id = %surface_id, scale = next.scale, "zoom settled");
        driver.zooms.borrow_mut().remove(&surface_id);
        return;
    }
    let zooms = Rc::clone(&driver.zooms);
    let frame = schedule_zoom_frame(driver, surface_id.clone());
    let mut zooms = zooms.borrow_mut();
    if let Some(animation) = zooms.get_mut(&surface_id) {
        animation.frame = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::VisualizationDescriptor;
    use crate::test_support::{commands, runtime, Counter};
    use crate::visualizers::register_builtin;

    fn orchestrator_with(keys: &[&str]) -> Orchestrator {
        let mut registry = VisualizationRegistry::new(runtime());
        for key in keys {
            registry.register(VisualizationDescriptor::new(*key, Rc::new(Counter::new(1_000))));
        }
        Orchestrator::attach(registry)
    }

    fn transform(orchestrator: &Orchestrator, surface_id: &str) -> Transform {
        TransformReader::read(&orchestrator.document.borrow(), surface_id)
    }

    fn settle(orchestrator: &Orchestrator, surface_id: &str) -> Vec<Transform> {
        let mut seen = Vec::new();
        for _ in 0..500 {
            if !orchestrator.is_zooming(surface_id) {
                break;
            }
            orchestrator.scheduler.tick(16.0);
            seen.push(transform(orchestrator, surface_id));
        }
        seen
    }

    #[test]
    fn unknown_selection_is_an_error() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        let err = orchestrator.select("nope").unwrap_err();
        assert!(matches!(err, PhonoscopeError::UnknownVisualization(_)));
        assert_eq!(orchestrator.active_key(), None);
    }

    #[test]
    fn selecting_before_a_word_renders_nothing() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        assert!(orchestrator.select("tree").unwrap().is_none());
        assert_eq!(orchestrator.active_key(), Some("tree"));

        let handle = orchestrator.set_word(" cat ").expect("rendered");
        assert_eq!(handle.key(), "tree");
        assert_eq!(orchestrator.word(), "cat");
    }

    #[test]
    fn switching_hides_and_stops_the_previous_style() {
        let mut orchestrator = orchestrator_with(&["tree", "spiral"]);
        orchestrator.set_word("cat");
        orchestrator.select("tree").unwrap();
        orchestrator.select("spiral").unwrap();

        let rt = orchestrator.registry().runtime().clone();
        assert_eq!(rt.scheduler.pending_frames(), 1);
        assert!(rt.store.borrow().get("tree").unwrap().bool("stopped"));
        let document = rt.document.borrow();
        let tree = document.get_element_by_id("treeContainer").unwrap();
        let spiral = document.get_element_by_id("spiralContainer").unwrap();
        assert!(document.is_hidden(tree));
        assert!(!document.is_hidden(spiral));
    }

    #[test]
    fn wheel_zoom_keeps_the_pointer_fixed() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.set_word("cat");
        orchestrator.select("tree").unwrap();

        let pivot = Point::new(100.0, 100.0);
        let world = transform(&orchestrator, "treeCanvas").to_world(pivot);
        assert!(orchestrator.on_wheel("treeCanvas", pivot, -1.0));

        let steps = settle(&orchestrator, "treeCanvas");
        assert!(steps.len() > 10, "zoom should be damped");
        for step in &steps {
            let screen = step.to_screen(world);
            assert!((screen.x - 100.0).abs() < 1e-9 && (screen.y - 100.0).abs() < 1e-9);
        }
        let last = transform(&orchestrator, "treeCanvas");
        assert!((last.scale - 1.1).abs() < 1e-12);
        assert!((last.offset_x + 10.0).abs() < 1e-9);
    }

    #[test]
    fn wheel_zoom_is_clamped() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.select("tree").unwrap();
        for _ in 0..100 {
            orchestrator.on_wheel("treeCanvas", Point::new(0.0, 0.0), 1.0);
        }
        settle(&orchestrator, "treeCanvas");
        assert!((transform(&orchestrator, "treeCanvas").scale - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zoom_redraws_the_owner_each_frame() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.set_word("cat");
        orchestrator.select("tree").unwrap();
        orchestrator.on_wheel("treeCanvas", Point::new(50.0, 50.0), -1.0);
        orchestrator.scheduler.tick(16.0);

        let rt = orchestrator.registry().runtime().clone();
        let painted = commands(&rt, "treeCanvas");
        let applied = painted.iter().find_map(|command| match command {
            crate::render::DrawCommand::SetTransform(t) => Some(*t),
            _ => None,
        });
        assert_eq!(applied, Some(transform(&orchestrator, "treeCanvas")));
    }

    #[test]
    fn drag_pans_one_to_one_while_held() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.select("tree").unwrap();

        assert!(!orchestrator.on_pointer_move("treeCanvas", Point::new(5.0, 5.0)));
        orchestrator.on_pointer_down("treeCanvas", Point::new(10.0, 10.0), PointerButton::Primary);
        assert!(orchestrator.on_pointer_move("treeCanvas", Point::new(25.0, 5.0)));
        orchestrator.on_pointer_move("treeCanvas", Point::new(30.0, 0.0));
        orchestrator.on_pointer_up(PointerButton::Primary);
        orchestrator.on_pointer_move("treeCanvas", Point::new(90.0, 90.0));

        assert_eq!(transform(&orchestrator, "treeCanvas"), Transform::new(1.0, 20.0, -10.0));
        assert!(!orchestrator.is_dragging());
    }

    #[test]
    fn secondary_button_does_not_drag() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.on_pointer_down("treeCanvas", Point::new(0.0, 0.0), PointerButton::Secondary);
        assert!(!orchestrator.is_dragging());
    }

    #[test]
    fn reset_view_restores_identity() {
        let mut orchestrator = orchestrator_with(&["tree"]);
        orchestrator.select("tree").unwrap();
        orchestrator.on_wheel("treeCanvas", Point::new(10.0, 10.0), -1.0);
        orchestrator.scheduler.tick(16.0);

        assert!(orchestrator.reset_view("treeCanvas"));
        assert!(!orchestrator.is_zooming("treeCanvas"));
        assert_eq!(transform(&orchestrator, "treeCanvas"), Transform::IDENTITY);
    }

    #[test]
    fn shared_surfaces_resolve_to_the_selected_owner() {
        let mut registry = VisualizationRegistry::new(runtime());
        for key in ["ripple", "rings"] {
            registry.register(
                VisualizationDescriptor::new(key, Rc::new(Counter::new(10)))
                    .surface_id("rippleCanvas")
                    .container_id("rippleContainer"),
            );
        }
        let mut orchestrator = Orchestrator::attach(registry);

        let owner = orchestrator.owner_of_surface("rippleCanvas").unwrap();
        assert_eq!(owner.key(), "ripple");
        orchestrator.select("rings").unwrap();
        let owner = orchestrator.owner_of_surface("rippleCanvas").unwrap();
        assert_eq!(owner.key(), "rings");
        assert!(orchestrator.owner_of_surface("missingCanvas").is_none());
    }

    #[test]
    fn respelling_a_style_restarts_its_frame_counter() {
        let mut registry = VisualizationRegistry::new(runtime());
        register_builtin(&mut registry);
        let mut orchestrator = Orchestrator::attach(registry);
        let rt = orchestrator.registry().runtime().clone();

        orchestrator.set_word("dog");
        orchestrator.select("spiral").unwrap();
        for _ in 0..5 {
            rt.scheduler.tick(16.0);
        }
        orchestrator.select("tree").unwrap();
        rt.scheduler.tick(16.0);
        let handle = orchestrator.select("spiral").unwrap().expect("spiral rendered");

        assert_eq!(rt.scheduler.pending_frames(), 1);
        assert!(handle.is_pending());
        assert_eq!(rt.store.borrow().get("spiral").unwrap().u64("frame"), Some(0));
        rt.scheduler.tick(16.0);
        assert_eq!(rt.store.borrow().get("spiral").unwrap().u64("frame"), Some(1));
        assert_eq!(handle.generation(), 2);
    }
}
