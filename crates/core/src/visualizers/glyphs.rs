use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, layer_color, polar, BACKGROUND};
use crate::render::{Canvas, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

const MAX_GLYPHS: usize = 48;
const SPIN_STEP: f64 = 0.015;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Glyph {
    pub character: char,
    pub layer: usize,
    pub center: Point,
    pub radius: f64,
    pub sides: u32,
    /// Direction of rotation, alternating across the grid.
    pub spin: f64,
}

/// Polygon whose side count comes from the character: three to eight.
pub(crate) fn sides_for(character: char) -> u32 {
    let lower = character.to_lowercase().next().unwrap_or(character);
    3 + lower as u32 % 6
}

/// The spelled-out layer as a grid of rotating polygons.
#[derive(Debug, Clone, Copy, Default)]
pub struct Glyphs;

impl Visualization for Glyphs {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("glyphs", Value::Null)
            .field("angle", 0.0)
            .field("frame", 0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let layer = if scene.layers.len() > 1 { 1 } else { 0 };
        let Some(characters) = scene.layers.get(layer) else {
            return Ok(RenderPlan::Static);
        };
        let count = characters.len().min(MAX_GLYPHS);
        let columns = (count as f64).sqrt().ceil().max(1.0) as usize;
        let rows = count.div_ceil(columns).max(1);
        let cell = (size.width / columns as f64).min(size.height / rows as f64);

        let glyphs: Vec<Glyph> = characters
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, character)| {
                let (row, column) = (index / columns, index % columns);
                Glyph {
                    character: *character,
                    layer,
                    center: Point::new(cell * (column as f64 + 0.5), cell * (row as f64 + 0.5)),
                    radius: cell * 0.38,
                    sides: sides_for(*character),
                    spin: if (row + column) % 2 == 0 { 1.0 } else { -1.0 },
                }
            })
            .collect();

        scene.state.write("glyphs", &glyphs)?;
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        state.set("frame", frame);
        state.set("angle", (frame as f64 * SPIN_STEP) % TAU);
        Ok(LoopControl::Continue)
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let Some(glyphs) = state.read::<Vec<Glyph>>("glyphs") else {
            return Ok(());
        };
        let angle = state.f64("angle").unwrap_or(0.0);

        begin_frame(canvas, BACKGROUND, transform);
        let ctx = canvas.context_mut();
        for glyph in &glyphs {
            let step = TAU / f64::from(glyph.sides);
            let rotation = angle * glyph.spin;
            let outline: Vec<Point> = (0..glyph.sides)
                .map(|side| polar(glyph.center, glyph.radius, rotation + step * f64::from(side)))
                .collect();
            let color = layer_color(glyph.character, glyph.layer);
            ctx.polyline(outline, color, 2.0, true);
            ctx.text(glyph.center, glyph.character.to_string(), color, glyph.radius * 0.6);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::render::DrawCommand;
    use crate::test_support::{commands, mount, runtime};

    #[test]
    fn side_counts_stay_in_range() {
        for character in ('a'..='z').chain('0'..='9') {
            assert!((3..=8).contains(&sides_for(character)), "{character}");
        }
        assert_eq!(sides_for('Q'), sides_for('q'));
    }

    #[test]
    fn one_closed_polygon_per_spelled_character() {
        let rt = runtime();
        let instance = mount(&rt, "glyphs", Rc::new(Glyphs));
        instance.render("cat");

        let polygons: Vec<usize> = commands(&rt, "glyphsCanvas")
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Polyline { points, closed: true, .. } => Some(points.len()),
                _ => None,
            })
            .collect();
        assert_eq!(polygons.len(), "seeaytee".len());
        assert_eq!(polygons[0], sides_for('s') as usize);
    }
}
