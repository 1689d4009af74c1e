//! Live wrapper around one registered visualization.
//!
//! The instance owns the render pipeline the plugin never has to think
//! about: revealing and sizing the surface, spelling out the word, starting
//! the caption, resetting state and driving the animation loop. Every loop
//! step re-checks the render generation, so a frame or deferred job left
//! over from a previous word never touches the new run.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::AppConfig;
use crate::phonetics::{final_layer_text, Layers};
use crate::render::pixel_size;
use crate::runtime::Runtime;
use crate::scene::{
    FrameInfo, LoopControl, RenderPlan, RenderScene, ResourceJob, VisualizationDescriptor,
};
use crate::state::SharedStateStore;
use crate::transform::TransformReader;
use crate::{PhonoscopeError, Result};

/// What the instance is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancePhase {
    Idle,
    Rendering,
    Animating,
    Redrawing,
}

pub struct VisualizationInstance {
    core: Rc<InstanceCore>,
}

struct InstanceCore {
    descriptor: VisualizationDescriptor,
    runtime: Runtime,
    rng: RefCell<StdRng>,
    phase: Cell<InstancePhase>,
}

impl VisualizationInstance {
    pub fn new(descriptor: VisualizationDescriptor, runtime: Runtime) -> Self {
        let rng = seed_rng(&runtime.config, &descriptor.key);
        Self {
            core: Rc::new(InstanceCore {
                descriptor,
                runtime,
                rng: RefCell::new(rng),
                phase: Cell::new(InstancePhase::Idle),
            }),
        }
    }

    pub fn descriptor(&self) -> &VisualizationDescriptor {
        &self.core.descriptor
    }

    pub fn key(&self) -> &str {
        &self.core.descriptor.key
    }

    pub fn surface_id(&self) -> &str {
        &self.core.descriptor.surface_id
    }

    pub fn container_id(&self) -> &str {
        &self.core.descriptor.container_id
    }

    pub fn phase(&self) -> InstancePhase {
        self.core.phase.get()
    }

    /// Whether a frame or deferred job of the current run is queued.
    pub fn is_animating(&self) -> bool {
        self.core
            .runtime
            .store
            .borrow()
            .get(self.key())
            .and_then(|record| record.pending())
            .is_some_and(|task| self.core.runtime.scheduler.is_pending(task))
    }

    /// Renders `word`. Returns `None` when nothing was started: an empty
    /// word, a missing container or surface, or unregistered state. Plugin
    /// failures are logged and still yield the run's handle.
    pub fn render(&self, word: &str) -> Option<RenderHandle> {
        self.core.render(word)
    }

    /// Repaints the current state with the surface's stored transform,
    /// resizing the backing store first if the container changed size.
    pub fn redraw(&self) -> bool {
        self.core.redraw()
    }

    /// Cancels the loop and lets the plugin release its resources.
    pub fn stop(&self) {
        let key = self.key();
        let mut store = self.core.runtime.store.borrow_mut();
        store.cancel_pending_animation(key);
        if let Some(state) = store.get_mut(key) {
            self.core.descriptor.plugin.stop(state);
        }
        self.core.phase.set(InstancePhase::Idle);
        tracing::debug!(key, "visualization stopped");
    }
}

impl fmt::Debug for VisualizationInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizationInstance")
            .field("key", &self.key())
            .field("phase", &self.phase())
            .finish()
    }
}

impl InstanceCore {
    fn key(&self) -> &str {
        &self.descriptor.key
    }

    fn render(self: &Rc<Self>, word: &str) -> Option<RenderHandle> {
        let key = self.key();
        let word = word.trim();
        if word.is_empty() {
            tracing::debug!(key, "ignoring render request for an empty word");
            return None;
        }
        let _span = tracing::debug_span!("render", key, word).entered();
        self.phase.set(InstancePhase::Rendering);

        if let Err(err) = self.prepare_surface() {
            tracing::error!(key, %err, "cannot render visualization");
            self.phase.set(InstancePhase::Idle);
            return None;
        }

        let animation = self.descriptor.animation;
        let layers = self.runtime.layers.generate(word, animation.layer_depth);
        self.runtime.typewriter.animate(
            &final_layer_text(&layers),
            Duration::from_millis(animation.duration_ms),
        );

        let generation = {
            let mut store = self.runtime.store.borrow_mut();
            store.cancel_pending_animation(key);
            store.reset_to_template(key);
            store.begin_run(key)
        };
        let Some(generation) = generation else {
            tracing::error!(key, "visualization has no registered state");
            self.phase.set(InstancePhase::Idle);
            return None;
        };
        let handle = RenderHandle {
            key: key.to_string(),
            generation,
            store: Rc::clone(&self.runtime.store),
        };

        match self.invoke_render(word, &layers) {
            Ok(RenderPlan::Static) => {
                self.phase.set(InstancePhase::Idle);
                self.redraw();
            }
            Ok(RenderPlan::Animate) => self.start_animation(generation),
            Ok(RenderPlan::Deferred(jobs)) if jobs.is_empty() => self.start_animation(generation),
            Ok(RenderPlan::Deferred(jobs)) => {
                tracing::debug!(key, jobs = jobs.len(), "waiting on deferred render steps");
                self.schedule_job(jobs, generation);
            }
            Err(err) => {
                tracing::error!(key, %err, "render callback failed");
                self.phase.set(InstancePhase::Idle);
            }
        }
        Some(handle)
    }

    /// Reveals the container and surface, then matches the surface's
    /// backing store to the container's freshly laid out box.
    fn prepare_surface(&self) -> Result<()> {
        let descriptor = &self.descriptor;
        let mut document = self.runtime.document.borrow_mut();

        let container = document
            .get_element_by_id(&descriptor.container_id)
            .ok_or_else(|| PhonoscopeError::MissingElement(descriptor.container_id.clone()))?;
        document.set_hidden(container, false);
        let surface = document
            .get_element_by_id(&descriptor.surface_id)
            .ok_or_else(|| PhonoscopeError::MissingElement(descriptor.surface_id.clone()))?;
        document.set_hidden(surface, false);

        document.flush_layout();
        let layout = document.content_box(container);
        if layout.is_empty() {
            tracing::warn!(key = self.key(), "container laid out to an empty box");
        }

        let canvas = document
            .canvas_mut(surface)
            .ok_or_else(|| PhonoscopeError::MissingElement(descriptor.surface_id.clone()))?;
        let (width, height) = pixel_size(layout);
        canvas.resize(width, height);
        canvas.clear();
        Ok(())
    }

    fn invoke_render(&self, word: &str, layers: &Layers) -> Result<RenderPlan> {
        let key = self.key();
        let mut document = self.runtime.document.borrow_mut();
        let mut store = self.runtime.store.borrow_mut();
        let mut rng = self.rng.borrow_mut();

        let canvas = document
            .canvas_by_id_mut(&self.descriptor.surface_id)
            .ok_or_else(|| PhonoscopeError::MissingElement(self.descriptor.surface_id.clone()))?;
        let state = store
            .get_mut(key)
            .ok_or_else(|| PhonoscopeError::UnknownVisualization(key.to_string()))?;

        let mut scene = RenderScene {
            key,
            word,
            layers,
            canvas,
            state,
            rng: &mut *rng,
            config: self.runtime.config.as_ref(),
        };
        self.descriptor
            .plugin
            .render(&mut scene)
            .map_err(|err| blame(key, err))
    }

    fn redraw(&self) -> bool {
        let key = self.key();
        let descriptor = &self.descriptor;
        let store = self.runtime.store.borrow();
        let Some(state) = store.get(key) else {
            tracing::warn!(key, "redraw requested without registered state");
            return false;
        };

        let mut document = self.runtime.document.borrow_mut();
        let Some(surface) = document.get_element_by_id(&descriptor.surface_id) else {
            tracing::error!(key, surface = %descriptor.surface_id, "surface missing");
            return false;
        };
        if let Some(container) = document.get_element_by_id(&descriptor.container_id) {
            document.flush_layout();
            let layout = document.content_box(container);
            if let Some(canvas) = document.canvas_mut(surface) {
                if !layout.is_empty() && canvas.needs_resize(layout) {
                    let (width, height) = pixel_size(layout);
                    tracing::debug!(key, width, height, "resizing surface to its container");
                    canvas.resize(width, height);
                }
            }
        }

        let zoom = &self.runtime.config.zoom;
        let transform = TransformReader::read_clamped(&document, &descriptor.surface_id, zoom);
        let Some(canvas) = document.canvas_mut(surface) else {
            tracing::error!(key, surface = %descriptor.surface_id, "element is not a canvas");
            return false;
        };
        canvas.clear();

        let previous = self.phase.replace(InstancePhase::Redrawing);
        let result = descriptor
            .plugin
            .redraw(state, canvas, transform)
            .map_err(|err| blame(key, err));
        self.phase.set(previous);

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(key, %err, "redraw callback failed");
                false
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.runtime.store.borrow().generation(self.key()) == Some(generation)
    }

    fn start_animation(self: &Rc<Self>, generation: u64) {
        self.phase.set(InstancePhase::Animating);
        self.redraw();
        self.schedule_frame(generation, None, 0);
    }

    fn schedule_frame(self: &Rc<Self>, generation: u64, last: Option<f64>, frame: u64) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let handle = self.runtime.scheduler.request_frame(move |timestamp| {
            if let Some(core) = weak.upgrade() {
                core.on_frame(generation, timestamp, last, frame);
            }
        });
        self.runtime
            .store
            .borrow_mut()
            .set_pending(self.key(), handle.into());
    }

    fn on_frame(self: &Rc<Self>, generation: u64, timestamp: f64, last: Option<f64>, frame: u64) {
        let key = self.key();
        if !self.is_current(generation) {
            tracing::trace!(key, generation, "dropping frame of a superseded run");
            return;
        }

        let info = FrameInfo {
            timestamp_ms: timestamp,
            delta_ms: last.map_or(0.0, |last| (timestamp - last).max(0.0)),
            frame,
        };
        let control = self
            .runtime
            .store
            .borrow_mut()
            .with_record_mut(key, |state| self.descriptor.plugin.advance(state, &info))
            .map(|control| control.map_err(|err| blame(key, err)))
            .unwrap_or_else(|| Err(PhonoscopeError::UnknownVisualization(key.to_string())));
        self.redraw();

        match control {
            Ok(LoopControl::Continue) => {
                self.schedule_frame(generation, Some(timestamp), frame + 1)
            }
            Ok(LoopControl::Stop) => {
                tracing::debug!(key, frames = frame + 1, "animation finished");
                self.finish();
            }
            Err(err) => {
                tracing::error!(key, %err, "animation step failed");
                self.finish();
            }
        }
    }

    fn schedule_job(self: &Rc<Self>, jobs: VecDeque<ResourceJob>, generation: u64) {
        let weak: Weak<Self> = Rc::downgrade(self);
        let handle = self.runtime.scheduler.set_timeout(0.0, move || {
            if let Some(core) = weak.upgrade() {
                core.run_job(jobs, generation);
            }
        });
        self.runtime
            .store
            .borrow_mut()
            .set_pending(self.key(), handle.into());
    }

    fn run_job(self: &Rc<Self>, mut jobs: VecDeque<ResourceJob>, generation: u64) {
        let key = self.key();
        if !self.is_current(generation) {
            tracing::trace!(key, generation, "dropping deferred step of a superseded run");
            return;
        }
        let Some(job) = jobs.pop_front() else {
            self.start_animation(generation);
            return;
        };

        let result = self
            .runtime
            .store
            .borrow_mut()
            .with_record_mut(key, job)
            .map(|result| result.map_err(|err| blame(key, err)))
            .unwrap_or_else(|| Err(PhonoscopeError::UnknownVisualization(key.to_string())));
        if let Err(err) = result {
            tracing::error!(key, %err, "deferred render step failed");
            self.finish();
            return;
        }

        if jobs.is_empty() {
            self.start_animation(generation);
        } else {
            self.schedule_job(jobs, generation);
        }
    }

    fn finish(&self) {
        self.runtime.store.borrow_mut().release_pending(self.key());
        self.phase.set(InstancePhase::Idle);
    }
}

/// Ticket for one render run.
#[derive(Clone)]
pub struct RenderHandle {
    key: String,
    generation: u64,
    store: SharedStateStore,
}

impl RenderHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once a later render of the same key started.
    pub fn is_current(&self) -> bool {
        self.store.borrow().generation(&self.key) == Some(self.generation)
    }

    /// Whether this run still has a frame or deferred step queued.
    pub fn is_pending(&self) -> bool {
        self.is_current()
            && self
                .store
                .borrow()
                .get(&self.key)
                .and_then(|record| record.pending())
                .is_some()
    }

    /// Cancels the run's queued work. A superseded handle never touches the
    /// newer run.
    pub fn cancel(&self) -> bool {
        if !self.is_current() {
            return false;
        }
        self.store.borrow_mut().cancel_pending_animation(&self.key)
    }
}

impl fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHandle")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Scene randomness. A configured seed is mixed with the key so styles
/// sharing a seed still draw different scenes.
/// Tags a failure raised inside a plugin callback with the style's key.
fn blame(key: &str, err: PhonoscopeError) -> PhonoscopeError {
    match err {
        PhonoscopeError::Plugin { .. } => err,
        other => PhonoscopeError::plugin(key, other.to_string()),
    }
}

fn seed_rng(config: &AppConfig, key: &str) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ key_hash(key)),
        None => StdRng::from_entropy(),
    }
}

fn key_hash(key: &str) -> u64 {
    key.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dom::ElementKind;
    use crate::render::{DrawCommand, Size};
    use crate::test_support::{commands, mount, runtime, Counter, Failing, Staged};
    use crate::timeline::SchedulerEvent;

    #[test]
    fn render_reveals_and_sizes_the_surface() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(3)));

        let handle = instance.render("cat").expect("render started");
        assert_eq!(handle.generation(), 1);

        let document = rt.document.borrow();
        let container = document.get_element_by_id("counterContainer").unwrap();
        let surface = document.get_element_by_id("counterCanvas").unwrap();
        assert!(!document.is_hidden(container));
        assert!(!document.is_hidden(surface));
        let canvas = document.canvas(surface).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (800, 600));
        drop(document);

        let store = rt.store.borrow();
        assert_eq!(store.get("counter").unwrap().str("word"), Some("cat"));
    }

    #[test]
    fn empty_word_starts_nothing() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(3)));

        assert!(instance.render("   ").is_none());
        assert_eq!(rt.scheduler.pending_frames(), 0);
        let document = rt.document.borrow();
        let container = document.get_element_by_id("counterContainer").unwrap();
        assert!(document.is_hidden(container));
    }

    #[test]
    fn missing_container_aborts_without_touching_state() {
        let rt = runtime();
        let descriptor = VisualizationDescriptor::new("orphan", Rc::new(Counter::new(3)));
        rt.store
            .borrow_mut()
            .register_template("orphan", descriptor.template.clone());
        let instance = VisualizationInstance::new(descriptor, rt.clone());

        assert!(instance.render("dog").is_none());
        assert_eq!(rt.store.borrow().generation("orphan"), Some(0));
        assert_eq!(rt.scheduler.pending_frames(), 0);
        assert_eq!(instance.phase(), InstancePhase::Idle);
    }

    #[test]
    fn rerender_cancels_the_previous_loop_first() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(100)));

        instance.render("cat");
        rt.scheduler.tick(16.0);
        instance.render("dog");

        assert_eq!(rt.scheduler.pending_frames(), 1);
        let journal = rt.scheduler.journal();
        let requested: Vec<usize> = journal
            .iter()
            .enumerate()
            .filter(|(_, event)| matches!(event, SchedulerEvent::FrameRequested(_)))
            .map(|(index, _)| index)
            .collect();
        let cancelled = journal
            .iter()
            .position(|event| matches!(event, SchedulerEvent::FrameCancelled(_)))
            .expect("first loop cancelled");
        assert!(cancelled < *requested.last().unwrap());

        rt.scheduler.tick(16.0);
        let store = rt.store.borrow();
        let record = store.get("counter").unwrap();
        assert_eq!(record.str("word"), Some("dog"));
        assert_eq!(record.u64("frame"), Some(1));
    }

    #[test]
    fn loop_runs_until_the_plugin_stops_it() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(3)));

        let handle = instance.render("cat").unwrap();
        assert_eq!(instance.phase(), InstancePhase::Animating);
        for _ in 0..5 {
            rt.scheduler.tick(16.0);
        }

        assert_eq!(rt.store.borrow().get("counter").unwrap().u64("frame"), Some(3));
        assert_eq!(rt.scheduler.pending_frames(), 0);
        assert!(!handle.is_pending());
        assert!(!instance.is_animating());
        assert_eq!(instance.phase(), InstancePhase::Idle);
    }

    #[test]
    fn redraw_is_idempotent() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(10)));
        instance.render("cat");
        rt.scheduler.tick(16.0);

        assert!(instance.redraw());
        let first = commands(&rt, "counterCanvas");
        assert!(instance.redraw());
        let second = commands(&rt, "counterCanvas");
        assert_eq!(first, second);
        assert!(matches!(first.first(), Some(DrawCommand::Clear { .. })));
    }

    #[test]
    fn redraw_clamps_a_stored_scale_to_the_zoom_range() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(10)));
        instance.render("cat");
        {
            let mut document = rt.document.borrow_mut();
            let surface = document.get_element_by_id("counterCanvas").unwrap();
            document.set_data(surface, crate::transform::SCALE_KEY, "1e300");
        }

        assert!(instance.redraw());
        let max_scale = rt.config.zoom.max_scale;
        let scales: Vec<f64> = commands(&rt, "counterCanvas")
            .iter()
            .filter_map(|command| match command {
                DrawCommand::SetTransform(transform) => Some(transform.scale),
                _ => None,
            })
            .collect();
        assert_eq!(scales, vec![max_scale]);
    }

    #[test]
    fn redraw_before_any_render_paints_nothing() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(3)));

        assert!(instance.redraw());
        let document = rt.document.borrow();
        let canvas = document.canvas_by_id("counterCanvas").unwrap();
        assert!(canvas.context().commands().len() <= 1);
    }

    #[test]
    fn redraw_follows_container_resizes() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(10)));
        instance.render("cat");

        {
            let mut document = rt.document.borrow_mut();
            let container = document.get_element_by_id("counterContainer").unwrap();
            document.set_intrinsic_size(container, Size::new(400.0, 300.0));
        }
        assert!(instance.redraw());

        let document = rt.document.borrow();
        let canvas = document.canvas_by_id("counterCanvas").unwrap();
        assert_eq!((canvas.width(), canvas.height()), (400, 300));
    }

    #[test]
    fn render_failures_stay_contained() {
        let rt = runtime();
        let failing = mount(&rt, "broken", Rc::new(Failing));
        let healthy = mount(&rt, "counter", Rc::new(Counter::new(3)));

        let handle = failing.render("cat").expect("run still started");
        assert!(!handle.is_pending());
        assert_eq!(failing.phase(), InstancePhase::Idle);

        assert!(healthy.render("cat").is_some());
        assert_eq!(rt.scheduler.pending_frames(), 1);
    }

    #[test]
    fn deferred_steps_run_before_anything_is_painted() {
        let rt = runtime();
        let instance = mount(&rt, "staged", Rc::new(Staged::new(2)));

        let handle = instance.render("cat").unwrap();
        assert!(handle.is_pending());
        // One deferred step plus the caption's next reveal.
        assert_eq!(rt.scheduler.pending_timers(), 2);
        assert_eq!(rt.scheduler.pending_frames(), 0);
        {
            let document = rt.document.borrow();
            let canvas = document.canvas_by_id("stagedCanvas").unwrap();
            assert_eq!(canvas.context().commands().len(), 1);
        }

        rt.scheduler.advance(0.0);
        assert_eq!(rt.store.borrow().get("staged").unwrap().u64("steps"), Some(2));
        assert_eq!(rt.scheduler.pending_frames(), 1);
        assert_eq!(instance.phase(), InstancePhase::Animating);
    }

    #[test]
    fn superseded_deferred_steps_are_dropped() {
        let rt = runtime();
        let instance = mount(&rt, "staged", Rc::new(Staged::new(2)));

        let first = instance.render("cat").unwrap();
        let second = instance.render("dog").unwrap();
        assert!(!first.is_current());
        assert!(!first.cancel());
        assert_eq!(rt.scheduler.pending_timers(), 2);

        rt.scheduler.advance(0.0);
        assert_eq!(rt.store.borrow().get("staged").unwrap().u64("steps"), Some(2));
        assert!(second.is_current());
    }

    #[test]
    fn callback_failures_name_the_style() {
        let err = blame("spiral", PhonoscopeError::msg("no layers"));
        assert!(matches!(&err, PhonoscopeError::Plugin { key, .. } if key == "spiral"));
        assert_eq!(err.to_string(), "visualization `spiral` failed: no layers");

        let tagged = blame("tree", PhonoscopeError::plugin("garden", "already tagged"));
        assert!(matches!(tagged, PhonoscopeError::Plugin { key, .. } if key == "garden"));
    }

    #[test]
    fn stop_cancels_the_loop_and_notifies_the_plugin() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(100)));
        instance.render("cat");

        instance.stop();
        instance.stop();
        assert_eq!(rt.scheduler.pending_frames(), 0);
        assert!(rt.store.borrow().get("counter").unwrap().bool("stopped"));
        assert_eq!(instance.phase(), InstancePhase::Idle);
    }

    #[test]
    fn seeded_runs_draw_the_same_scene() {
        let config = AppConfig::deterministic(9);
        let a = seed_rng(&config, "spiral");
        let b = seed_rng(&config, "spiral");
        let c = seed_rng(&config, "tree");
        let draw = |mut rng: StdRng| rand::Rng::gen::<u64>(&mut rng);
        assert_eq!(draw(a), draw(b));
        assert_ne!(draw(seed_rng(&config, "spiral")), draw(c));
    }

    #[test]
    fn plain_elements_are_not_surfaces() {
        let rt = runtime();
        let instance = mount(&rt, "counter", Rc::new(Counter::new(3)));
        {
            let mut document = rt.document.borrow_mut();
            let surface = document.get_element_by_id("counterCanvas").unwrap();
            document.remove(surface);
            let block = document.create_element(ElementKind::Block);
            document.set_id(block, "counterCanvas");
            let container = document.get_element_by_id("counterContainer").unwrap();
            document.append_child(container, block);
        }
        assert!(instance.render("cat").is_none());
    }
}
