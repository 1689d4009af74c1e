//! Per-surface zoom/pan transforms.
//!
//! The transform lives in the surface element's dataset (`scale`, `offsetX`,
//! `offsetY`) so that input handlers and redraw callbacks share it without
//! holding references to each other.

use serde::{Deserialize, Serialize};

use crate::config::ZoomConfig;
use crate::dom::Document;
use crate::render::Point;

pub const SCALE_KEY: &str = "scale";
pub const OFFSET_X_KEY: &str = "offsetX";
pub const OFFSET_Y_KEY: &str = "offsetY";

/// Uniform scale followed by a translation: `screen = world * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    pub const fn new(scale: f64, offset_x: f64, offset_y: f64) -> Self {
        Self {
            scale,
            offset_x,
            offset_y,
        }
    }

    pub fn to_world(self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset_x) / self.scale,
            (screen.y - self.offset_y) / self.scale,
        )
    }

    pub fn to_screen(self, world: Point) -> Point {
        Point::new(
            world.x * self.scale + self.offset_x,
            world.y * self.scale + self.offset_y,
        )
    }

    /// Rescales while keeping the world point under `pivot` fixed on screen.
    pub fn zoom_about(self, pivot: Point, new_scale: f64) -> Self {
        let world = self.to_world(pivot);
        Self {
            scale: new_scale,
            offset_x: pivot.x - world.x * new_scale,
            offset_y: pivot.y - world.y * new_scale,
        }
    }

    pub fn pan(self, dx: f64, dy: f64) -> Self {
        Self {
            offset_x: self.offset_x + dx,
            offset_y: self.offset_y + dy,
            ..self
        }
    }

    pub fn with_scale_clamped(self, min: f64, max: f64) -> Self {
        Self {
            scale: self.scale.clamp(min, max),
            ..self
        }
    }

    /// Moves `damping` of the remaining distance toward `target`. Returns the
    /// target itself once every component is within `epsilon`.
    pub fn approach(self, target: Transform, damping: f64, epsilon: f64) -> (Self, bool) {
        let step = |from: f64, to: f64| from + (to - from) * damping;
        let next = Self {
            scale: step(self.scale, target.scale),
            offset_x: step(self.offset_x, target.offset_x),
            offset_y: step(self.offset_y, target.offset_y),
        };
        if next.distance(target) < epsilon {
            (target, true)
        } else {
            (next, false)
        }
    }

    fn distance(self, other: Transform) -> f64 {
        (self.scale - other.scale)
            .abs()
            .max((self.offset_x - other.offset_x).abs())
            .max((self.offset_y - other.offset_y).abs())
    }
}

/// Reads and writes the transform stored on a surface element.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformReader;

impl TransformReader {
    /// Missing surfaces and malformed values fall back to the identity
    /// components; NaN never reaches drawing code.
    pub fn read(document: &Document, surface_id: &str) -> Transform {
        let Some(node) = document.get_element_by_id(surface_id) else {
            tracing::warn!(surface_id, "transform requested for unknown surface");
            return Transform::IDENTITY;
        };

        let field = |key: &str| document.data(node, key).and_then(parse_finite);
        Transform {
            scale: field(SCALE_KEY)
                .filter(|scale| *scale > 0.0)
                .unwrap_or(Transform::IDENTITY.scale),
            offset_x: field(OFFSET_X_KEY).unwrap_or(Transform::IDENTITY.offset_x),
            offset_y: field(OFFSET_Y_KEY).unwrap_or(Transform::IDENTITY.offset_y),
        }
    }

    /// [`read`](Self::read) with the scale clamped to the configured zoom
    /// range, for values written by something other than the input handlers.
    pub fn read_clamped(document: &Document, surface_id: &str, zoom: &ZoomConfig) -> Transform {
        let transform = Self::read(document, surface_id);
        let clamped = transform.with_scale_clamped(zoom.min_scale, zoom.max_scale);
        if clamped.scale != transform.scale {
            tracing::debug!(surface_id, scale = transform.scale, "stored scale out of range");
        }
        clamped
    }

    /// Returns `false` when the surface does not exist.
    pub fn write(document: &mut Document, surface_id: &str, transform: Transform) -> bool {
        let Some(node) = document.get_element_by_id(surface_id) else {
            tracing::warn!(surface_id, "transform written to unknown surface");
            return false;
        };
        document.set_data(node, SCALE_KEY, transform.scale.to_string());
        document.set_data(node, OFFSET_X_KEY, transform.offset_x.to_string());
        document.set_data(node, OFFSET_Y_KEY, transform.offset_y.to_string());
        true
    }

    pub fn reset(document: &mut Document, surface_id: &str) -> bool {
        Self::write(document, surface_id, Transform::IDENTITY)
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}
