//! Visualization plugin contract.
//!
//! A style implements [`Visualization`] and is registered through a
//! [`VisualizationDescriptor`]. The framework owns sizing, layer generation,
//! state reset and the animation loop; the plugin only builds its model in
//! [`Visualization::render`], steps it in [`Visualization::advance`] and
//! paints it in [`Visualization::redraw`].

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;

use crate::config::{AnimationConfig, AppConfig};
use crate::phonetics::Layers;
use crate::render::{Canvas, Size};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

/// Work that must finish before a deferred render may start animating.
pub type ResourceJob = Box<dyn FnOnce(&mut StateRecord) -> Result<()>>;

/// What the framework does once the render callback returns.
pub enum RenderPlan {
    /// Paint once; no animation loop.
    Static,
    /// Paint, then install the animation loop.
    Animate,
    /// Run the jobs one per scheduler turn, then paint and animate. Nothing
    /// is painted until every job succeeded.
    Deferred(VecDeque<ResourceJob>),
}

impl RenderPlan {
    pub fn deferred(jobs: impl IntoIterator<Item = ResourceJob>) -> Self {
        Self::Deferred(jobs.into_iter().collect())
    }
}

impl fmt::Debug for RenderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => f.write_str("Static"),
            Self::Animate => f.write_str("Animate"),
            Self::Deferred(jobs) => write!(f, "Deferred({} jobs)", jobs.len()),
        }
    }
}

/// Whether the animation loop should schedule another frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Timing of one animation frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Scheduler time in milliseconds.
    pub timestamp_ms: f64,
    /// Time since the previous frame of the same run; zero on the first.
    pub delta_ms: f64,
    /// Frames elapsed in this run, starting at zero.
    pub frame: u64,
}

/// Everything a render callback may touch.
pub struct RenderScene<'a> {
    pub key: &'a str,
    pub word: &'a str,
    pub layers: &'a Layers,
    pub canvas: &'a mut Canvas,
    pub state: &'a mut StateRecord,
    pub rng: &'a mut StdRng,
    pub config: &'a AppConfig,
}

impl RenderScene<'_> {
    pub fn size(&self) -> Size {
        self.canvas.size()
    }
}

pub trait Visualization {
    /// Every field the style's state may hold, with neutral defaults.
    fn template(&self) -> StateTemplate;

    /// Builds the per-run model into `scene.state`. Runs after the state was
    /// reset, so it always starts from the template.
    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan>;

    /// Steps the model by one frame.
    fn advance(&self, _state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        Ok(LoopControl::Stop)
    }

    /// Paints the current state. Must be a pure function of state and
    /// transform, and must no-op on state that is not populated yet.
    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform)
        -> Result<()>;

    /// Releases device resources when the style is switched away from.
    fn stop(&self, _state: &mut StateRecord) {}
}

/// Registration record for one visualization style.
#[derive(Clone)]
pub struct VisualizationDescriptor {
    pub key: String,
    pub display_name: String,
    pub icon: String,
    pub surface_id: String,
    pub container_id: String,
    pub animation: AnimationConfig,
    pub template: StateTemplate,
    pub plugin: Rc<dyn Visualization>,
}

impl VisualizationDescriptor {
    /// Element ids default to `{key}Canvas` and `{key}Container`.
    pub fn new(key: impl Into<String>, plugin: Rc<dyn Visualization>) -> Self {
        let key = key.into();
        Self {
            display_name: key.clone(),
            icon: String::new(),
            surface_id: format!("{key}Canvas"),
            container_id: format!("{key}Container"),
            animation: AnimationConfig::default(),
            template: plugin.template(),
            plugin,
            key,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn surface_id(mut self, id: impl Into<String>) -> Self {
        self.surface_id = id.into();
        self
    }

    pub fn container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = id.into();
        self
    }

    pub fn animation(mut self, animation: AnimationConfig) -> Self {
        self.animation = animation;
        self
    }

    /// Label shown in the selection control.
    pub fn label(&self) -> String {
        if self.icon.is_empty() {
            self.display_name.clone()
        } else {
            format!("{} {}", self.icon, self.display_name)
        }
    }
}

impl fmt::Debug for VisualizationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizationDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("surface_id", &self.surface_id)
            .field("container_id", &self.container_id)
            .field("animation", &self.animation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blank;

    impl Visualization for Blank {
        fn template(&self) -> StateTemplate {
            StateTemplate::new().field("frame", 0)
        }

        fn render(&self, _scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
            Ok(RenderPlan::Static)
        }

        fn redraw(&self, _: &StateRecord, _: &mut Canvas, _: Transform) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ids_default_from_the_key() {
        let descriptor = VisualizationDescriptor::new("spiral", Rc::new(Blank));
        assert_eq!(descriptor.surface_id, "spiralCanvas");
        assert_eq!(descriptor.container_id, "spiralContainer");
        assert_eq!(descriptor.label(), "spiral");
        assert!(descriptor.template.declares("frame"));
    }

    #[test]
    fn label_includes_the_icon() {
        let descriptor = VisualizationDescriptor::new("tree", Rc::new(Blank))
            .display_name("Phonetic Tree")
            .icon("🌳");
        assert_eq!(descriptor.label(), "🌳 Phonetic Tree");
    }
}
