use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, inner_radius, layer_color, polar, progress, BACKGROUND};
use crate::render::{Canvas, Color, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

/// Radians the spiral turns per frame.
const ROTATION_STEP: f64 = 0.01;
const INTRO_FRAMES: u64 = 60;
const TURNS: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct SpiralGlyph {
    pub character: char,
    pub layer: usize,
    pub radius: f64,
    pub angle: f64,
}

/// Every character of every layer on one Archimedean spiral, the word at
/// the center and the finest layer on the rim.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spiral;

impl Visualization for Spiral {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("glyphs", Value::Null)
            .field("center", Value::Null)
            .field("rotation", 0.0)
            .field("frame", 0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let total = scene.layers.total_chars();
        if total == 0 {
            return Ok(RenderPlan::Static);
        }
        let max_radius = inner_radius(size);
        let sweep = TURNS * TAU;

        let glyphs: Vec<SpiralGlyph> = scene
            .layers
            .iter()
            .enumerate()
            .flat_map(|(layer, characters)| characters.iter().map(move |c| (layer, *c)))
            .enumerate()
            .map(|(index, (layer, character))| {
                let t = (index as f64 + 1.0) / total as f64;
                SpiralGlyph {
                    character,
                    layer,
                    radius: max_radius * t,
                    angle: sweep * t,
                }
            })
            .collect();

        scene.state.write("glyphs", &glyphs)?;
        scene.state.write("center", &size.center())?;
        scene.state.set("rotation", scene.rng.gen_range(0.0..TAU));
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        let rotation = (state.f64("rotation").unwrap_or(0.0) + ROTATION_STEP) % TAU;
        state.set("frame", frame);
        state.set("rotation", rotation);
        Ok(LoopControl::Continue)
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let (Some(glyphs), Some(center)) = (
            state.read::<Vec<SpiralGlyph>>("glyphs"),
            state.read::<Point>("center"),
        ) else {
            return Ok(());
        };
        let rotation = state.f64("rotation").unwrap_or(0.0);
        // Glyphs unwind from the center during the intro.
        let shown = progress(state.u64("frame").unwrap_or(0), INTRO_FRAMES);
        let visible = ((glyphs.len() as f64 * shown).ceil() as usize).max(1);

        begin_frame(canvas, BACKGROUND, transform);
        let ctx = canvas.context_mut();
        let path: Vec<Point> = glyphs
            .iter()
            .take(visible)
            .map(|glyph| polar(center, glyph.radius, glyph.angle + rotation))
            .collect();
        ctx.polyline(path.clone(), Color::rgb(70, 80, 120).with_alpha(0.5), 1.0, false);

        for (glyph, point) in glyphs.iter().zip(path) {
            let size = (18.0 - glyph.layer as f64 * 4.0).max(8.0);
            ctx.text(
                Point::new(point.x - size / 3.0, point.y + size / 3.0),
                glyph.character.to_string(),
                layer_color(glyph.character, glyph.layer),
                size,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::test_support::{mount, runtime};

    #[test]
    fn glyphs_wind_outward_in_layer_order() {
        let rt = runtime();
        let instance = mount(&rt, "spiral", Rc::new(Spiral));
        instance.render("cat");

        let store = rt.store.borrow();
        let glyphs: Vec<SpiralGlyph> = store.get("spiral").unwrap().read("glyphs").unwrap();
        assert_eq!(glyphs.len(), 30);
        assert!(glyphs.windows(2).all(|pair| pair[0].radius < pair[1].radius));
        assert!(glyphs.windows(2).all(|pair| pair[0].layer <= pair[1].layer));
        assert!(glyphs.iter().all(|glyph| glyph.radius <= 280.0));
    }

    #[test]
    fn rotation_advances_every_frame() {
        let rt = runtime();
        let instance = mount(&rt, "spiral", Rc::new(Spiral));
        instance.render("cat");
        let start = rt.store.borrow().get("spiral").unwrap().f64("rotation").unwrap();

        rt.scheduler.tick(16.0);
        rt.scheduler.tick(16.0);
        let record = rt.store.borrow();
        let record = record.get("spiral").unwrap();
        assert_eq!(record.u64("frame"), Some(2));
        let turned = (record.f64("rotation").unwrap() - start).rem_euclid(TAU);
        assert!((turned - 2.0 * ROTATION_STEP).abs() < 1e-9);
        assert!(instance.is_animating());
    }
}
