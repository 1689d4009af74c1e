use std::f64::consts::FRAC_PI_2;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{begin_frame, ease_out_cubic, letter_hue, progress};
use crate::render::{Canvas, Color, Point};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::Result;

const GROW_FRAMES: u64 = 120;
const BASE_DEPTH: usize = 3;
const MAX_DEPTH: usize = 5;
const SHRINK: f64 = 0.7;
const ANGLE_JITTER: f64 = 0.08;
const SOIL: Color = Color::rgb(8, 20, 16);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Segment {
    pub from: Point,
    pub to: Point,
    pub depth: usize,
    pub hue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct Blossom {
    pub position: Point,
    pub character: char,
    pub hue: f64,
}

/// How one letter branches.
#[derive(Debug, Clone, Copy)]
struct Genome {
    branches: usize,
    spread: f64,
    hue: f64,
}

impl Genome {
    fn for_letter(letter: char) -> Self {
        let code = letter.to_lowercase().next().unwrap_or(letter) as u32;
        Self {
            branches: 2 + (code % 2) as usize,
            spread: 0.3 + f64::from(code % 5) * 0.08,
            hue: letter_hue(letter),
        }
    }
}

/// Each letter of the word grows a recursive plant; the spelled-out
/// letters blossom at the tips.
#[derive(Debug, Clone, Copy, Default)]
pub struct FractalGarden;

impl Visualization for FractalGarden {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("segments", Value::Null)
            .field("blossoms", Value::Null)
            .field("depth", 0)
            .field("frame", 0)
            .field("growth", 0.0)
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let size = scene.size();
        let Some(word) = scene.layers.get(0) else {
            return Ok(RenderPlan::Static);
        };
        let depth = (BASE_DEPTH + scene.layers.len().saturating_sub(1)).min(MAX_DEPTH);
        let spacing = size.width / word.len().max(1) as f64;
        let trunk = (size.height * 0.25).min(spacing * 1.2);

        let mut segments = Vec::new();
        let mut blossoms = Vec::new();
        for (index, letter) in word.iter().enumerate() {
            let genome = Genome::for_letter(*letter);
            let petals: Vec<char> = scene
                .layers
                .get(1)
                .map(|spelled| {
                    spelled
                        .iter()
                        .enumerate()
                        .filter(|(position, _)| scene.layers.origin(1, *position) == Some(index))
                        .map(|(_, c)| *c)
                        .collect()
                })
                .unwrap_or_default();
            let petals = if petals.is_empty() { vec![*letter] } else { petals };

            let base = Point::new(spacing * (index as f64 + 0.5), size.height - 10.0);
            let mut plant = Plant {
                genome,
                petals: &petals,
                depth,
                segments: &mut segments,
                blossoms: &mut blossoms,
                rng: &mut *scene.rng,
            };
            plant.grow(base, -FRAC_PI_2, trunk, 0);
        }

        tracing::debug!(segments = segments.len(), blossoms = blossoms.len(), "garden planted");
        scene.state.write("segments", &segments)?;
        scene.state.write("blossoms", &blossoms)?;
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
        let (Some(segments), Some(blossoms)) = (
            state.read::<Vec<Segment>>("segments"),
            state.read::<Vec<Blossom>>("blossoms"),
        ) else {
            return Ok(());
        };
        let depth = state.u64("depth").unwrap_or(1).max(1) as f64;
        let reach = ease_out_cubic(state.f64("growth").unwrap_or(0.0)) * (depth + 1.0);

        begin_frame(canvas, SOIL, transform);
        let ctx = canvas.context_mut();
        for segment in &segments {
            let grown = (reach - segment.depth as f64).clamp(0.0, 1.0);
            if grown <= 0.0 {
                continue;
            }
            let tip = Point::new(
                segment.from.x + (segment.to.x - segment.from.x) * grown,
                segment.from.y + (segment.to.y - segment.from.y) * grown,
            );
            let width = (4.0 - segment.depth as f64 * 0.7).max(0.5);
            ctx.line(segment.from, tip, Color::hsl(segment.hue, 0.45, 0.4), width);
        }

        let bloom = (reach - depth).clamp(0.0, 1.0) as f32;
        if bloom > 0.0 {
            for blossom in &blossoms {
                let color = Color::hsl(blossom.hue, 0.8, 0.7).with_alpha(bloom);
                ctx.fill_circle(blossom.position, 3.0, color);
                ctx.text(blossom.position, blossom.character.to_string(), color, 10.0);
            }
        }
        Ok(())
    }
}

struct Plant<'a> {
    genome: Genome,
    petals: &'a [char],
    depth: usize,
    segments: &'a mut Vec<Segment>,
    blossoms: &'a mut Vec<Blossom>,
    rng: &'a mut StdRng,
}

impl Plant<'_> {
    fn grow(&mut self, from: Point, angle: f64, length: f64, depth: usize) {
        let to = Point::new(from.x + length * angle.cos(), from.y + length * angle.sin());
        self.segments.push(Segment {
            from,
            to,
            depth,
            hue: self.genome.hue,
        });

        if depth + 1 >= self.depth {
            let character = self.petals[self.blossoms.len() % self.petals.len()];
            self.blossoms.push(Blossom {
                position: to,
                character,
                hue: letter_hue(character),
            });
            return;
        }

        let branches = self.genome.branches;
        let fan = self.genome.spread * (branches - 1) as f64;
        for branch in 0..branches {
            let offset = if branches > 1 {
                -fan / 2.0 + fan * branch as f64 / (branches - 1) as f64
            } else {
                0.0
            };
            let jitter = self.rng.gen_range(-ANGLE_JITTER..=ANGLE_JITTER);
            self.grow(to, angle + offset + jitter, length * SHRINK, depth + 1);
        }
    }
}
