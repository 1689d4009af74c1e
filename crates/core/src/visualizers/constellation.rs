use std::collections::HashMap;
use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, letter_hue};
use crate::render::{Canvas, Color, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

const NIGHT: Color = Color::rgb(4, 6, 18);
const TWINKLE_SPEED: f64 = 0.002;
const MARGIN: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Star {
    pub character: char,
    pub position: Point,
    pub magnitude: f64,
    pub phase: f64,
}

/// Every distinct character of the final layer becomes a star. Characters
/// that follow each other in the spelling are linked, so the word draws its
/// own constellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constellation;

impl Visualization for Constellation {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("stars", Value::Null)
            .field("links", Value::Null)
            .field("elapsed", 0.0)
            .field("frame", 0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let Some(last) = scene.layers.last() else {
            return Ok(RenderPlan::Static);
        };

        let mut index_of: HashMap<char, usize> = HashMap::new();
        let mut stars = Vec::new();
        for character in last {
            if index_of.contains_key(character) {
                continue;
            }
            index_of.insert(*character, stars.len());
            let x = scene.rng.gen_range(MARGIN..=(size.width - MARGIN).max(MARGIN));
            let y = scene.rng.gen_range(MARGIN..=(size.height - MARGIN).max(MARGIN));
            stars.push(Star {
                character: *character,
                position: Point::new(x, y),
                magnitude: scene.rng.gen_range(1.5..4.0),
                phase: scene.rng.gen_range(0.0..TAU),
            });
        }

        let mut links: Vec<(usize, usize)> = Vec::new();
        for pair in last.windows(2) {
            let (Some(a), Some(b)) = (index_of.get(&pair[0]), index_of.get(&pair[1])) else {
                continue;
            };
            let link = (*a.min(b), *a.max(b));
            if link.0 != link.1 && !links.contains(&link) {
                links.push(link);
            }
        }

        scene.state.write("stars", &stars)?;
        scene.state.write("links", &links)?;
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, frame: &FrameInfo) -> Result<LoopControl> {
        let elapsed = state.f64("elapsed").unwrap_or(0.0) + frame.delta_ms;
        state.set("elapsed", elapsed);
        state.set("frame", frame.frame + 1);
        Ok(LoopControl::Continue)
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let (Some(stars), Some(links)) = (
            state.read::<Vec<Star>>("stars"),
            state.read::<Vec<(usize, usize)>>("links"),
        ) else {
            return Ok(());
        };
        let time = state.f64("elapsed").unwrap_or(0.0) * TWINKLE_SPEED;

        begin_frame(canvas, NIGHT, transform);
        let ctx = canvas.context_mut();
        for (a, b) in links {
            if let (Some(a), Some(b)) = (stars.get(a), stars.get(b)) {
                ctx.line(a.position, b.position, Color::rgb(120, 130, 200).with_alpha(0.35), 1.0);
            }
        }
        for star in &stars {
            let brightness = 0.6 + 0.4 * (time + star.phase).sin();
            let color =
                Color::hsl(letter_hue(star.character), 0.5, 0.85).with_alpha(brightness as f32);
            ctx.fill_circle(star.position, star.magnitude * brightness, color);
            ctx.text(
                Point::new(star.position.x + 6.0, star.position.y - 6.0),
                star.character.to_string(),
                color.with_alpha(0.8),
                11.0,
            );
        }
        Ok(())
    }
}
