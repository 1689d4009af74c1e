use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, ease_out_cubic, layer_color, progress, BACKGROUND};
use crate::render::{Canvas, Color, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

const GROW_FRAMES: u64 = 90;
const MARGIN: f64 = 24.0;
const JITTER: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct TreeNode {
    pub character: char,
    pub layer: usize,
    pub position: Point,
    pub parent: Option<usize>,
}

/// Layers stacked top to bottom, each character linked to the one it was
/// spelled out from. The tree grows downward layer by layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhoneticTree;

impl Visualization for PhoneticTree {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("nodes", Value::Null)
            .field("depth", 0)
            .field("frame", 0)
            .field("growth", 0.0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let depth = scene.layers.len();
        if depth == 0 {
            return Ok(RenderPlan::Static);
        }
        let row_height = (size.height - 2.0 * MARGIN) / depth.max(2).saturating_sub(1) as f64;

        let mut nodes: Vec<TreeNode> = Vec::with_capacity(scene.layers.total_chars());
        let mut previous_start = 0;
        for (layer, characters) in scene.layers.iter().enumerate() {
            let start = nodes.len();
            let spacing = (size.width - 2.0 * MARGIN) / characters.len().max(1) as f64;
            for (index, character) in characters.iter().enumerate() {
                let jitter = if layer == 0 {
                    0.0
                } else {
                    scene.rng.gen_range(-JITTER..=JITTER)
                };
                nodes.push(TreeNode {
                    character: *character,
                    layer,
                    position: Point::new(
                        MARGIN + spacing * (index as f64 + 0.5),
                        MARGIN + row_height * layer as f64 + jitter,
                    ),
                    parent: scene
                        .layers
                        .origin(layer, index)
                        .map(|origin| previous_start + origin),
                });
            }
            previous_start = start;
        }

        tracing::debug!(nodes = nodes.len(), depth, "tree laid out");
        scene.state.write("nodes", &nodes)?;
        scene.state.set("depth", depth);
        Ok(RenderPlan::Animate)
    }

    fn advance(&self, state: &mut StateRecord, _frame: &FrameInfo) -> Result<LoopControl> {
        let frame = state.u64("frame").unwrap_or(0) + 1;
        state.set("frame", frame);
        state.set("growth", progress(frame, GROW_FRAMES));
        Ok(if frame < GROW_FRAMES {
            LoopControl::Continue
        } else {
            LoopControl::Stop
        })
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let Some(nodes) = state.read::<Vec<TreeNode>>("nodes") else {
            return Ok(());
        };
        let depth = state.u64("depth").unwrap_or(1).max(1) as f64;
        // Fraction of layers revealed; the partial layer fades in.
        let reach = ease_out_cubic(state.f64("growth").unwrap_or(0.0)) * depth;

        begin_frame(canvas, BACKGROUND, transform);
        let ctx = canvas.context_mut();
        for node in &nodes {
            let visibility = (reach - node.layer as f64).clamp(0.0, 1.0) as f32;
            if node.layer > 0 && visibility <= 0.0 {
                continue;
            }
            let alpha = if node.layer == 0 { 1.0 } else { visibility };
            if let Some(parent) = node.parent.and_then(|index| nodes.get(index)) {
                let from = parent.position;
                let t = f64::from(alpha);
                let to = Point::new(
                    from.x + (node.position.x - from.x) * t,
                    from.y + (node.position.y - from.y) * t,
                );
                ctx.line(from, to, Color::rgb(120, 140, 170).with_alpha(0.6 * alpha), 1.0);
            }
            let color = layer_color(node.character, node.layer).with_alpha(alpha);
            ctx.fill_circle(node.position, 3.0, color);
            let label_size = (16.0 - node.layer as f64 * 3.0).max(8.0);
            ctx.text(
                Point::new(node.position.x - label_size / 3.0, node.position.y - 6.0),
                node.character.to_string(),
                color,
                label_size,
            );
        }
        Ok(())
    }
}
