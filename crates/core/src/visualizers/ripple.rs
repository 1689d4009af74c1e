//! Two styles drawn on the same ripple surface.

use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, inner_radius, layer_color, letter_hue, polar, BACKGROUND};
use crate::render::{Canvas, Color, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

/// Frames between two drops.
const DROP_INTERVAL: u64 = 6;
/// Frames a ripple stays visible.
const LIFETIME: u64 = 90;
const MAX_DROPS: usize = 64;
const SPREAD_PER_FRAME: f64 = 2.5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Droplet {
    pub character: char,
    pub center: Point,
    pub spawn: u64,
    pub hue: f64,
}

/// Each character of the final layer falls as a drop and spreads out in
/// fading rings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ripple;

impl Visualization for Ripple {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("drops", Value::Null)
            .field("frame", 0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let Some(last) = scene.layers.last() else {
            return Ok(RenderPlan::Static);
        };
        let margin = 20.0_f64.min(size.width / 4.0).min(size.height / 4.0);

        let mut drops = Vec::with_capacity(last.len().min(MAX_DROPS));
        for (index, character) in last.iter().take(MAX_DROPS).enumerate() {
            let x = scene.rng.gen_range(margin..=(size.width - margin).max(margin));
            let y = scene.rng.gen_range(margin..=(size.height - margin).max(margin));
            drops.push(Droplet {
                character: *character,
                center: Point::new(x, y),
                spawn: index as u64 * DROP_INTERVAL,
                hue: letter_hue(*character),
            });
        }
        scene.state.write("drops", &drops)?;
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        state.set("frame", frame);
        let last_spawn = state
            .read::<Vec<Droplet>>("drops")
            .and_then(|drops| drops.last().map(|droplet| droplet.spawn))
            .unwrap_or(0);
        Ok(if frame <= last_spawn + LIFETIME {
            LoopControl::Continue
        } else {
            LoopControl::Stop
        })
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let Some(drops) = state.read::<Vec<Droplet>>("drops") else {
            return Ok(());
        };
        let frame = state.u64("frame").unwrap_or(0);

        begin_frame(canvas, BACKGROUND, transform);
        let ctx = canvas.context_mut();
        for droplet in drops.iter().filter(|droplet| droplet.spawn <= frame) {
            let age = frame - droplet.spawn;
            if age > LIFETIME {
                continue;
            }
            let life = 1.0 - age as f64 / LIFETIME as f64;
            let radius = age as f64 * SPREAD_PER_FRAME;
            let color = Color::hsl(droplet.hue, 0.6, 0.6);
            for ring in 0..3u8 {
                let r = radius - f64::from(ring) * 12.0;
                if r > 0.0 {
                    let alpha = (life * 0.8) as f32 / f32::from(ring + 1);
                    ctx.stroke_circle(droplet.center, r, color.with_alpha(alpha));
                }
            }
            ctx.text(
                droplet.center,
                droplet.character.to_string(),
                color.with_alpha(life as f32),
                14.0,
            );
        }
        Ok(())
    }
}

/// One ring per layer around the center, characters spaced along each ring,
/// every ring breathing slightly out of phase with the next.
#[derive(Debug, Clone, Copy, Default)]
pub struct RippleRings;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Ring {
    pub layer: usize,
    pub radius: f64,
    pub characters: Vec<char>,
}

const PULSE_SPEED: f64 = 0.08;
const PULSE_DEPTH: f64 = 0.05;

impl Visualization for RippleRings {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("rings", Value::Null)
            .field("center", Value::Null)
            .field("phase", 0.0)
            .field("frame", 0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let count = scene.layers.len();
        if count == 0 {
            return Ok(RenderPlan::Static);
        }
        let outer = inner_radius(size);
        let rings: Vec<Ring> = scene
            .layers
            .iter()
            .enumerate()
            .map(|(layer, characters)| Ring {
                layer,
                radius: outer * (layer as f64 + 1.0) / count as f64,
                characters: characters.to_vec(),
            })
            .collect();

        scene.state.write("rings", &rings)?;
        scene.state.write("center", &size.center())?;
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        state.set("frame", frame);
        state.set("phase", (frame as f64 * PULSE_SPEED) % TAU);
        Ok(LoopControl::Continue)
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let (Some(rings), Some(center)) = (
            state.read::<Vec<Ring>>("rings"),
            state.read::<Point>("center"),
        ) else {
            return Ok(());
        };
        let phase = state.f64("phase").unwrap_or(0.0);

        begin_frame(canvas, BACKGROUND, transform);
        let ctx = canvas.context_mut();
        for ring in &rings {
            let pulse = 1.0 + PULSE_DEPTH * (phase + ring.layer as f64).sin();
            let radius = ring.radius * pulse;
            ctx.stroke_circle(center, radius, Color::rgb(90, 110, 160).with_alpha(0.5));

            let step = TAU / ring.characters.len().max(1) as f64;
            for (index, character) in ring.characters.iter().enumerate() {
                let point = polar(center, radius, index as f64 * step - phase * 0.5);
                ctx.text(point, character.to_string(), layer_color(*character, ring.layer), 12.0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::registry::VisualizationRegistry;
    use crate::scene::VisualizationDescriptor;
    use crate::test_support::{commands, runtime};
    use crate::visualizers::{RIPPLE_CONTAINER_ID, RIPPLE_SURFACE_ID};

    fn shared_pair() -> (crate::runtime::Runtime, VisualizationRegistry) {
        let rt = runtime();
        let mut registry = VisualizationRegistry::new(rt.clone());
        registry.register(
            VisualizationDescriptor::new("ripple", Rc::new(Ripple))
                .surface_id(RIPPLE_SURFACE_ID)
                .container_id(RIPPLE_CONTAINER_ID),
        );
        registry.register(
            VisualizationDescriptor::new("rippleRings", Rc::new(RippleRings))
                .surface_id(RIPPLE_SURFACE_ID)
                .container_id(RIPPLE_CONTAINER_ID),
        );
        registry.mount();
        (rt, registry)
    }

    #[test]
    fn variants_paint_the_same_surface_with_separate_state() {
        let (rt, registry) = shared_pair();
        let ripple = registry.get("ripple").unwrap();
        let rings = registry.get("rippleRings").unwrap();

        ripple.render("cat");
        rt.scheduler.tick(16.0);
        ripple.stop();
        rings.render("cat");
        rt.scheduler.tick(16.0);

        let store = rt.store.borrow();
        assert!(store.get("ripple").unwrap().get("drops").is_some_and(|v| !v.is_null()));
        let drawn = commands(&rt, RIPPLE_SURFACE_ID);
        let circles = drawn
            .iter()
            .filter(|command| matches!(command, crate::render::DrawCommand::Circle { .. }))
            .count();
        assert_eq!(circles, 3, "one ring per layer");
    }

    #[test]
    fn ripples_stop_once_the_last_drop_fades() {
        let (rt, registry) = shared_pair();
        let ripple = registry.get("ripple").unwrap();
        ripple.render("ab");

        let drops: Vec<Droplet> = rt.store.borrow().get("ripple").unwrap().read("drops").unwrap();
        let last_spawn = drops.last().unwrap().spawn;
        for _ in 0..last_spawn + LIFETIME + 2 {
            rt.scheduler.tick(16.0);
        }
        assert!(!ripple.is_animating());
    }
}
