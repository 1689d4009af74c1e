//! Fixtures shared by the unit tests.

use std::rc::Rc;

use serde_json::Value;

use crate::config::AppConfig;
use crate::dom::Document;
use crate::instance::VisualizationInstance;
use crate::registry::VisualizationRegistry;
use crate::render::{Canvas, Color, DrawCommand, Point};
use crate::runtime::{standard_page, Runtime};
use crate::scene::{
    FrameInfo, LoopControl, RenderPlan, RenderScene, ResourceJob, Visualization,
    VisualizationDescriptor,
};
use crate::state::{StateRecord, StateTemplate};
use crate::timeline::Scheduler;
use crate::transform::Transform;
use crate::{PhonoscopeError, Result};

/// Seeded runtime over the standard page with a journaling scheduler.
pub fn runtime() -> Runtime {
    let config = AppConfig::deterministic(7);
    let page = standard_page(&config);
    Runtime::with_parts(config, page, Scheduler::with_journal())
}

pub fn runtime_with_page(page: Document) -> Runtime {
    Runtime::with_parts(AppConfig::deterministic(7), page, Scheduler::with_journal())
}

/// Registers and mounts one plugin under `key`.
pub fn mount(rt: &Runtime, key: &str, plugin: Rc<dyn Visualization>) -> Rc<VisualizationInstance> {
    let mut registry = VisualizationRegistry::new(rt.clone());
    let instance = registry.register(VisualizationDescriptor::new(key, plugin));
    registry.mount();
    instance
}

pub fn commands(rt: &Runtime, surface_id: &str) -> Vec<DrawCommand> {
    rt.document
        .borrow()
        .canvas_by_id(surface_id)
        .map(|canvas| canvas.context().commands().to_vec())
        .unwrap_or_default()
}

/// Counts frames until `limit`, painting the word and the count.
pub struct Counter {
    limit: u64,
}

impl Counter {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl Visualization for Counter {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("word", Value::Null)
            .field("frame", 0)
            .field("stopped", false)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        scene.state.set("word", scene.word);
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        state.set("frame", frame);
        Ok(if frame < self.limit {
            LoopControl::Continue
        } else {
            LoopControl::Stop
        })
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let Some(word) = state.str("word") else {
            return Ok(());
        };
        let frame = state.u64("frame").unwrap_or(0);
        let ctx = canvas.context_mut();
        ctx.set_transform(transform);
        ctx.text(Point::new(10.0, 20.0), format!("{word} {frame}"), Color::WHITE, 16.0);
        Ok(())
    }

    fn stop(&self, state: &mut StateRecord) {
        state.set("stopped", true);
    }
}

/// Render callback that always fails.
pub struct Failing;

impl Visualization for Failing {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        Err(PhonoscopeError::plugin(scene.key, "model could not be built"))
    }

    fn redraw(&self, _: &StateRecord, _: &mut Canvas, _: Transform) -> Result<()> {
        Ok(())
    }
}

/// Needs `steps` deferred jobs before it can animate.
pub struct Staged {
    steps: u64,
}

impl Staged {
    pub fn new(steps: u64) -> Self {
        Self { steps }
    }
}

impl Visualization for Staged {
    fn template(&self) -> StateTemplate {
        StateTemplate::new().field("steps", 0)
    }

    fn render(&self, _scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let jobs = (0..self.steps).map(|_| -> ResourceJob {
            Box::new(|state: &mut StateRecord| {
                let steps = state.u64("steps").unwrap_or(0) + 1;
                state.set("steps", steps);
                Ok(())
            })
        });
        Ok(RenderPlan::deferred(jobs))
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, _: Transform) -> Result<()> {
        let steps = state.u64("steps").unwrap_or(0);
        if steps > 0 {
            canvas
                .context_mut()
                .text(Point::new(0.0, 0.0), steps.to_string(), Color::WHITE, 12.0);
        }
        Ok(())
    }
}
