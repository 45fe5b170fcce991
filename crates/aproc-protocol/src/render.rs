//! Rendering tags a device exposes to whatever draws the network.
//!
//! Nothing here affects protocol behaviour.

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// HSV colour, hue in degrees, saturation and value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Color {
    pub const WHITE: Color = Color::hsv(0.0, 0.0, 1.0);
    pub const BLACK: Color = Color::hsv(0.0, 0.0, 0.0);
    pub const GREEN: Color = Color::hsv(120.0, 1.0, 0.5);
    pub const BLUE: Color = Color::hsv(240.0, 1.0, 1.0);
    pub const RED: Color = Color::hsv(0.0, 1.0, 1.0);
    pub const SALMON: Color = Color::hsv(6.0, 0.54, 0.98);
    pub const BROWN: Color = Color::hsv(0.0, 0.75, 0.65);

    pub const fn hsv(hue: f64, saturation: f64, value: f64) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }

    /// Token colour for one process: its key's hue, dimmed when external.
    pub fn for_process(hue: f64, status: Status) -> Self {
        let key = if status == Status::External { 0.5 } else { 1.0 };
        Self::hsv(hue, key, key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Sphere,
    Cube,
}

/// Which colour slot a process manager paints its tokens into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderSlot {
    Node,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Render {
    pub node: Color,
    pub left: Color,
    pub right: Color,
    pub shape: Shape,
    pub size: f64,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            node: Color::WHITE,
            left: Color::BLACK,
            right: Color::BLACK,
            shape: Shape::Sphere,
            size: 10.0,
        }
    }
}

impl Render {
    pub fn paint(&mut self, slot: RenderSlot, color: Color) {
        match slot {
            RenderSlot::Node => self.node = color,
            RenderSlot::Left => self.left = color,
            RenderSlot::Right => self.right = color,
        }
    }
}
