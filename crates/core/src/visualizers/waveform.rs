use std::rc::Rc;

use serde_json::Value;

use super::{begin_frame, letter_hue};
use crate::audio::{compute_rms, synthesize_tone, AudioContext};
use crate::render::{Canvas, Color, Point, Size};
use crate::scene::{FrameInfo, LoopControl, RenderPlan, RenderScene, ResourceJob, Visualization};
use crate::state::{StateRecord, StateTemplate};
use crate::transform::Transform;
use crate::{PhonoscopeError, Result};

/// Frames between two notes.
const NOTE_FRAMES: u64 = 8;
const MAX_NOTES: usize = 32;
const SPECTRUM_BANDS: usize = 32;
/// Samples mixed for the oscilloscope trace, and the points kept of them.
const WAVE_WINDOW: usize = 512;
const WAVE_POINTS: usize = 128;
const BACKDROP: Color = Color::rgb(10, 10, 20);

/// Plays the final layer as a melody, one tone per character, and draws the
/// live waveform over the spectrum.
///
/// The audio context is the state's persistent resource: it is opened on
/// the first render and reused afterwards, only its tone bank is rebuilt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Waveform;

fn context(state: &StateRecord) -> Result<Rc<AudioContext>> {
    state
        .resource_as::<AudioContext>()
        .ok_or_else(|| PhonoscopeError::msg("audio context missing from waveform state"))
}

impl Visualization for Waveform {
    fn template(&self) -> StateTemplate {
        StateTemplate::new()
            .field("frame", 0)
            .field("sequence", Value::Null)
            .field("noteIndex", 0)
            .field("buffersReady", false)
            .field("spectrum", Value::Null)
            .field("waveform", Value::Null)
            .field("level", 0.0)
            .field("unsupported", false)
            .field("message", Value::Null)
            .field("current", Value::Null)
            .resource_backed()
    }

    fn render(&self, scene: &mut RenderScene<'_>) -> Result<RenderPlan> {
        let ctx = match scene.state.resource_as::<AudioContext>() {
            Some(ctx) => ctx,
            None => match AudioContext::create(&scene.config.audio) {
                Ok(ctx) => {
                    let ctx = Rc::new(ctx);
                    scene.state.set_resource(Rc::clone(&ctx) as Rc<dyn std::any::Any>);
                    ctx
                }
                Err(PhonoscopeError::Unsupported(message)) => {
                    tracing::warn!(key = scene.key, %message, "audio unavailable");
                    scene.state.set("unsupported", true);
                    scene.state.set("message", message);
                    return Ok(RenderPlan::Static);
                }
                Err(err) => return Err(err),
            },
        };
        ctx.resume();
        ctx.clear_buffers();

        let sequence: String = scene
            .layers
            .last()
            .unwrap_or_default()
            .iter()
            .filter(|c| c.is_alphanumeric())
            .take(MAX_NOTES)
            .collect();
        scene.state.set("sequence", sequence.clone());

        let mut distinct: Vec<char> = sequence.chars().collect();
        distinct.sort_unstable();
        distinct.dedup();

        let rate = ctx.sample_rate();
        let note_ms = scene.config.audio.note_ms;
        let mut jobs: Vec<ResourceJob> = distinct
            .into_iter()
            .map(|character| -> ResourceJob {
                Box::new(move |state: &mut StateRecord| {
                    context(state)?.insert_buffer(synthesize_tone(character, rate, note_ms));
                    Ok(())
                })
            })
            .collect();
        jobs.push(Box::new(|state: &mut StateRecord| {
            tracing::debug!(buffers = context(state)?.buffer_count(), "tone bank ready");
            state.set("buffersReady", true);
            Ok(())
        }));
        Ok(RenderPlan::deferred(jobs))
    }

    fn advance(&self, state: &mut StateRecord, frame: &FrameInfo) -> Result<LoopControl> {
        let ctx = context(state)?;
        let sequence: Vec<char> = state.str("sequence").unwrap_or_default().chars().collect();
        let mut note = state.u64("noteIndex").unwrap_or(0) as usize;

        if frame.frame % NOTE_FRAMES == 0 {
            if let Some(character) = sequence.get(note) {
                if !ctx.play(*character, frame.timestamp_ms) {
                    tracing::debug!(%character, "note skipped");
                }
                state.set("current", character.to_string());
                note += 1;
            }
        }

        let spectrum = ctx.spectrum(frame.timestamp_ms, SPECTRUM_BANDS)?;
        let samples = ctx.mix(frame.timestamp_ms, WAVE_WINDOW);
        let waveform: Vec<f32> = samples
            .iter()
            .step_by(WAVE_WINDOW / WAVE_POINTS)
            .copied()
            .collect();

        state.set("frame", frame.frame + 1);
        state.set("noteIndex", note);
        state.write("spectrum", &spectrum)?;
        state.write("waveform", &waveform)?;
        state.set("level", f64::from(compute_rms(&samples)));

        if note >= sequence.len() && ctx.active_voices() == 0 {
            state.set("current", Value::Null);
            return Ok(LoopControl::Stop);
        }
        Ok(LoopControl::Continue)
    }

    fn redraw(&self, state: &StateRecord, canvas: &mut Canvas, transform: Transform) -> Result<()> {
        let size = canvas.size();
        if state.bool("unsupported") {
            begin_frame(canvas, BACKDROP, transform);
            let message = state.str("message").unwrap_or("audio is not available");
            canvas.context_mut().text(
                Point::new(20.0, size.height / 2.0),
                format!("Sound waves need audio output: {message}"),
                Color::rgb(220, 120, 120),
                16.0,
            );
            return Ok(());
        }
        if !state.bool("buffersReady") {
            return Ok(());
        }

        begin_frame(canvas, BACKDROP, transform);
        let ctx = canvas.context_mut();
        let hue = state
            .str("current")
            .and_then(|current| current.chars().next())
            .map_or(200.0, letter_hue);

        let spectrum = state.read::<Vec<f32>>("spectrum").unwrap_or_default();
        let bar = size.width / SPECTRUM_BANDS as f64;
        for (index, level) in spectrum.iter().enumerate() {
            let height = f64::from(*level) * size.height * 0.5;
            ctx.fill_rect(
                Point::new(index as f64 * bar, size.height - height),
                Size::new((bar - 2.0).max(1.0), height),
                Color::hsl(hue, 0.6, 0.35),
            );
        }

        let mid = size.height / 2.0;
        let waveform = state.read::<Vec<f32>>("waveform").unwrap_or_default();
        let trace: Vec<Point> = if waveform.is_empty() {
            vec![Point::new(0.0, mid), Point::new(size.width, mid)]
        } else {
            let step = size.width / (waveform.len().max(2) - 1) as f64;
            waveform
                .iter()
                .enumerate()
                .map(|(index, sample)| {
                    Point::new(index as f64 * step, mid - f64::from(*sample) * mid)
                })
                .collect()
        };
        ctx.polyline(trace, Color::hsl(hue, 0.8, 0.65), 2.0, false);

        // Level meter along the right edge; a full-scale sine reads about 0.7.
        let level = state.f64("level").unwrap_or(0.0).clamp(0.0, 1.0);
        let meter = level * size.height;
        ctx.fill_rect(
            Point::new(size.width - 8.0, size.height - meter),
            Size::new(6.0, meter),
            Color::hsl(hue, 0.9, 0.5),
        );

        if let Some(current) = state.str("current") {
            ctx.text(Point::new(20.0, 40.0), current, Color::WHITE, 28.0);
        }
        Ok(())
    }

    fn stop(&self, state: &mut StateRecord) {
        if let Some(ctx) = state.resource_as::<AudioContext>() {
            ctx.suspend();
        }
    }
}
