//! Canvas surfaces and the recording 2D drawing context.
//!
//! A surface keeps a display list instead of pixels. Clearing empties the
//! list, so after any full repaint the list describes exactly what is on
//! screen and two paints of the same state compare equal.

use serde::{Deserialize, Serialize};

use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const ZERO: Size = Size::new(0.0, 0.0);

    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Hue in degrees, saturation and lightness in `[0, 1]`.
    pub fn hsl(hue: f64, saturation: f64, lightness: f64) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = l - chroma / 2.0;
        let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(channel(r), channel(g), channel(b))
    }
}

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear {
        width: f64,
        height: f64,
    },
    SetTransform(Transform),
    FillRect {
        origin: Point,
        size: Size,
        color: Color,
    },
    Line {
        from: Point,
        to: Point,
        color: Color,
        width: f64,
    },
    Circle {
        center: Point,
        radius: f64,
        color: Color,
        filled: bool,
    },
    Polyline {
        points: Vec<Point>,
        color: Color,
        width: f64,
        closed: bool,
    },
    Text {
        position: Point,
        text: String,
        color: Color,
        size: f64,
    },
}

/// Recording stand-in for a canvas 2D context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawingContext {
    commands: Vec<DrawCommand>,
    transform: Transform,
}

impl DrawingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Drops everything painted so far and resets the transform.
    pub fn clear(&mut self, size: Size) {
        self.commands.clear();
        self.transform = Transform::IDENTITY;
        self.commands.push(DrawCommand::Clear {
            width: size.width,
            height: size.height,
        });
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.commands.push(DrawCommand::SetTransform(transform));
    }

    pub fn reset_transform(&mut self) {
        self.set_transform(Transform::IDENTITY);
    }

    pub fn fill_rect(&mut self, origin: Point, size: Size, color: Color) {
        self.commands.push(DrawCommand::FillRect { origin, size, color });
    }

    pub fn line(&mut self, from: Point, to: Point, color: Color, width: f64) {
        self.commands.push(DrawCommand::Line {
            from,
            to,
            color,
            width,
        });
    }

    pub fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius: radius.max(0.0),
            color,
            filled: true,
        });
    }

    pub fn stroke_circle(&mut self, center: Point, radius: f64, color: Color) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius: radius.max(0.0),
            color,
            filled: false,
        });
    }

    pub fn polyline(&mut self, points: Vec<Point>, color: Color, width: f64, closed: bool) {
        if points.len() < 2 {
            return;
        }
        self.commands.push(DrawCommand::Polyline {
            points,
            color,
            width,
            closed,
        });
    }

    pub fn text(&mut self, position: Point, text: impl Into<String>, color: Color, size: f64) {
        self.commands.push(DrawCommand::Text {
            position,
            text: text.into(),
            color,
            size,
        });
    }
}

/// Canvas-equivalent drawing surface owned by a document element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    context: DrawingContext,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            context: DrawingContext::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }

    /// Changing the backing size discards the painted content, like a real
    /// canvas does.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.context = DrawingContext::new();
    }

    /// Whether the backing size differs from the given layout box.
    pub fn needs_resize(&self, layout: Size) -> bool {
        let (width, height) = pixel_size(layout);
        width != self.width || height != self.height
    }

    pub fn clear(&mut self) {
        let size = self.size();
        self.context.clear(size);
    }

    pub fn context(&self) -> &DrawingContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut DrawingContext {
        &mut self.context
    }
}

/// Rounds a layout box to whole backing pixels.
pub fn pixel_size(layout: Size) -> (u32, u32) {
    let clamp = |v: f64| if v.is_finite() { v.max(0.0).round() as u32 } else { 0 };
    (clamp(layout.width), clamp(layout.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_keeps_only_the_clear_marker() {
        let mut canvas = Canvas::new(100, 50);
        canvas
            .context_mut()
            .fill_circle(Point::new(1.0, 1.0), 2.0, Color::WHITE);
        canvas.clear();

        assert_eq!(
            canvas.context().commands(),
            &[DrawCommand::Clear {
                width: 100.0,
                height: 50.0
            }]
        );
    }

    #[test]
    fn resize_discards_content_and_detects_mismatch() {
        let mut canvas = Canvas::new(10, 10);
        canvas.clear();
        assert!(canvas.needs_resize(Size::new(20.4, 10.0)));

        canvas.resize(20, 10);
        assert!(canvas.context().commands().is_empty());
        assert!(!canvas.needs_resize(Size::new(20.4, 10.0)));
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(Color::hsl(0.0, 1.0, 0.5), Color::rgb(255, 0, 0));
        assert_eq!(Color::hsl(120.0, 1.0, 0.5), Color::rgb(0, 255, 0));
        assert_eq!(Color::hsl(240.0, 1.0, 0.5), Color::rgb(0, 0, 255));
    }

    #[test]
    fn degenerate_polylines_are_skipped() {
        let mut ctx = DrawingContext::new();
        ctx.polyline(vec![Point::new(0.0, 0.0)], Color::WHITE, 1.0, false);
        assert!(ctx.commands().is_empty());
    }
}
