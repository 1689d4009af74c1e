//! Built-in visualization styles.
//!
//! Each style computes a serde model in `render`, steps it in `advance` and
//! paints it in `redraw`. Models are stored as JSON fields in the style's
//! state record so resets and redraws never need the style's own types to
//! outlive a callback.

mod constellation;
mod garden;
mod glyphs;
mod ripple;
mod spiral;
mod tree;
mod waveform;

use std::rc::Rc;

use crate::config::AppConfig;
use crate::registry::VisualizationRegistry;
use crate::render::{Canvas, Color, Point, Size};
use crate::scene::VisualizationDescriptor;
use crate::transform::Transform;

pub use constellation::Constellation;
pub use garden::FractalGarden;
pub use glyphs::Glyphs;
pub use ripple::{Ripple, RippleRings};
pub use spiral::Spiral;
pub use tree::PhoneticTree;
pub use waveform::Waveform;

/// Surface and container shared by the two ripple variants.
pub const RIPPLE_SURFACE_ID: &str = "rippleCanvas";
pub const RIPPLE_CONTAINER_ID: &str = "rippleContainer";

/// Descriptors for every built-in style, in menu order.
pub fn builtin_descriptors(config: &AppConfig) -> Vec<VisualizationDescriptor> {
    let animation = config.animation;
    vec![
        VisualizationDescriptor::new("tree", Rc::new(PhoneticTree))
            .display_name("Phonetic Tree")
            .icon("🌳")
            .animation(animation),
        VisualizationDescriptor::new("spiral", Rc::new(Spiral))
            .display_name("Letter Spiral")
            .icon("🌀")
            .animation(animation),
        VisualizationDescriptor::new("ripple", Rc::new(Ripple))
            .display_name("Ripples")
            .icon("💧")
            .surface_id(RIPPLE_SURFACE_ID)
            .container_id(RIPPLE_CONTAINER_ID)
            .animation(animation),
        VisualizationDescriptor::new("rippleRings", Rc::new(RippleRings))
            .display_name("Ripple Rings")
            .icon("⭕")
            .surface_id(RIPPLE_SURFACE_ID)
            .container_id(RIPPLE_CONTAINER_ID)
            .animation(animation),
        VisualizationDescriptor::new("garden", Rc::new(FractalGarden))
            .display_name("Fractal Garden")
            .icon("🌿")
            .animation(crate::config::AnimationConfig {
                layer_depth: animation.layer_depth.min(2),
                ..animation
            }),
        VisualizationDescriptor::new("constellation", Rc::new(Constellation))
            .display_name("Constellation")
            .icon("✨")
            .animation(animation),
        VisualizationDescriptor::new("waveform", Rc::new(Waveform))
            .display_name("Sound Waves")
            .icon("🎵")
            .animation(animation),
        VisualizationDescriptor::new("glyphs", Rc::new(Glyphs))
            .display_name("Geometric Glyphs")
            .icon("🔷")
            .animation(animation),
    ]
}

/// Registers every built-in style. Mounting is left to the caller.
pub fn register_builtin(registry: &mut VisualizationRegistry) -> usize {
    let descriptors = builtin_descriptors(&registry.runtime().config);
    let count = descriptors.len();
    for descriptor in descriptors {
        registry.register(descriptor);
    }
    tracing::debug!(count, "built-in visualizations registered");
    count
}

/// Hue for a character, spread around the color wheel by code point.
pub(crate) fn letter_hue(character: char) -> f64 {
    let lower = character.to_lowercase().next().unwrap_or(character);
    (lower as u32 % 26) as f64 / 26.0 * 360.0
}

/// Lightness steps down with depth so later layers read as finer detail.
pub(crate) fn layer_color(character: char, layer: usize) -> Color {
    Color::hsl(letter_hue(character), 0.7, (0.65 - layer as f64 * 0.08).max(0.35))
}

pub(crate) fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Fraction of `total` frames elapsed, clamped to `[0, 1]`.
pub(crate) fn progress(frame: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (frame as f64 / total as f64).min(1.0)
}

/// Starts a frame: background fill, then the view transform.
pub(crate) fn begin_frame(canvas: &mut Canvas, background: Color, transform: Transform) {
    let size = canvas.size();
    let ctx = canvas.context_mut();
    ctx.fill_rect(Point::new(0.0, 0.0), size, background);
    ctx.set_transform(transform);
}

pub(crate) fn polar(center: Point, radius: f64, angle: f64) -> Point {
    Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

/// Usable radius inside a surface, leaving a margin for labels.
pub(crate) fn inner_radius(size: Size) -> f64 {
    (size.width.min(size.height) / 2.0 - 20.0).max(10.0)
}

pub(crate) const BACKGROUND: Color = Color::rgb(12, 14, 28);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::render::DrawCommand;
    use crate::test_support::{commands, runtime};

    fn builtin() -> (crate::runtime::Runtime, VisualizationRegistry) {
        let rt = runtime();
        let mut registry = VisualizationRegistry::new(rt.clone());
        register_builtin(&mut registry);
        registry.mount();
        (rt, registry)
    }

    #[test]
    fn builtin_keys_are_unique_and_ripples_share_a_surface() {
        let (_, registry) = builtin();
        assert_eq!(registry.len(), 8);
        let surfaces = registry.list_all_surface_ids();
        assert_eq!(surfaces.len(), 7);
        assert_eq!(
            surfaces.iter().filter(|id| id.as_str() == RIPPLE_SURFACE_ID).count(),
            1
        );
    }

    #[test]
    fn every_style_renders_animates_and_redraws() {
        let (rt, registry) = builtin();
        let keys: Vec<String> = registry.keys().map(str::to_string).collect();
        for key in keys {
            let instance = registry.get(&key).unwrap();
            let handle = instance.render("cat").unwrap_or_else(|| panic!("{key} did not start"));
            for _ in 0..30 {
                rt.scheduler.tick(16.0);
            }

            assert!(handle.is_current(), "{key}");
            assert!(instance.redraw(), "{key} redraw failed");
            let painted = commands(&rt, instance.surface_id());
            assert!(painted.len() > 2, "{key} painted nothing");
            assert!(matches!(painted[0], DrawCommand::Clear { .. }));
            assert!(instance.redraw());
            assert_eq!(painted, commands(&rt, instance.surface_id()), "{key} redraw not pure");

            instance.stop();
        }
        assert_eq!(rt.scheduler.pending_frames(), 0);
    }

    #[test]
    fn styles_only_write_declared_fields() {
        let (rt, registry) = builtin();
        for instance in registry.list_all() {
            instance.render("dog");
            for _ in 0..5 {
                rt.scheduler.tick(16.0);
            }
            let store = rt.store.borrow();
            let template = store.template(instance.key()).unwrap();
            let record = store.get(instance.key()).unwrap();
            for key in record.keys() {
                assert!(template.declares(key), "{} wrote undeclared {key}", instance.key());
            }
            drop(store);
            instance.stop();
        }
    }

    #[test]
    fn reset_restores_exactly_the_template_fields() {
        let (rt, registry) = builtin();
        for instance in registry.list_all() {
            let key = instance.key();
            instance.render("dog");
            for _ in 0..5 {
                rt.scheduler.tick(16.0);
            }
            instance.stop();

            let mut store = rt.store.borrow_mut();
            store.reset_to_template(key);
            let template = store.template(key).unwrap();
            let record = store.get(key).unwrap();
            let expected: HashSet<&str> = template.fields().keys().map(String::as_str).collect();
            let actual: HashSet<&str> = record.keys().collect();
            assert_eq!(actual, expected, "{key}");
            assert_eq!(record.fields(), template.fields(), "{key} kept run values");
            if key == "waveform" {
                assert!(record.resource_as::<crate::audio::AudioContext>().is_some());
            }
        }
    }

    #[test]
    fn redraw_before_render_is_a_no_op_for_every_style() {
        let (rt, registry) = builtin();
        for instance in registry.list_all() {
            assert!(instance.redraw(), "{}", instance.key());
            assert!(commands(&rt, instance.surface_id()).len() <= 1);
        }
    }

    #[test]
    fn easing_and_progress_are_clamped() {
        assert_eq!(progress(5, 0), 1.0);
        assert_eq!(progress(20, 10), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(letter_hue('A'), letter_hue('a'));
    }
}
