use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::geometry::SEA_FLOOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const YELLOW: Color = Color::rgba(255, 255, 0, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Expands a 6x6x6 palette index into RGB.
    pub fn from_8bit(byte: u8) -> Self {
        if byte >= 216 {
            return Color::rgba(0, 0, 0, 255);
        }
        let r = (byte / 36) % 6 * 51;
        let g = (byte / 6) % 6 * 51;
        let b = byte % 6 * 51;
        Color::rgba(r, g, b, 255)
    }

    pub fn with_brightness(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let scale = |channel: u8| (f32::from(channel) * factor).round() as u8;
        Color::rgba(scale(self.r), scale(self.g), scale(self.b), self.a)
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Color { a, ..self }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Tint applied to floors above or below the camera.
pub fn static_shadowing_color() -> Color {
    Color::from_8bit(215).with_brightness(0.6)
}

/// Tint applied to walkable border tiles one floor above the camera.
pub fn tile_shadowing_color() -> Color {
    Color::from_8bit(215).with_brightness(0.65)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Light {
    pub intensity: u8,
    pub color: u8,
}

impl Light {
    pub const fn new(intensity: u8, color: u8) -> Self {
        Self { intensity, color }
    }

    pub fn is_lit(self) -> bool {
        self.intensity > 0
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FloorShadowing: u8 {
        const BOTTOM = 1 << 0;
        const UPSIDE = 1 << 1;
    }
}

/// Ambient light for the camera floor. Underground floors get no global light.
pub fn ambient_light(global: Light, camera_z: u8, minimum_ambient: f32) -> Light {
    let mut ambient = if camera_z > SEA_FLOOR {
        Light::default()
    } else {
        global
    };
    let floor = (minimum_ambient.clamp(0.0, 1.0) * 255.0) as u8;
    ambient.intensity = ambient.intensity.max(floor);
    ambient
}

/// Tint for drawing `floor` while the camera sits on `camera_z`.
///
/// `global_light` is `Some` when lights are being drawn; surface floors above
/// the camera then take the ambient color instead of the static shadow.
pub fn floor_shadow_color(
    floor: u8,
    camera_z: u8,
    shadowing: FloorShadowing,
    global_light: Option<Light>,
) -> Color {
    if shadowing.is_empty() {
        return Color::WHITE;
    }

    if floor > SEA_FLOOR {
        let below = shadowing.contains(FloorShadowing::BOTTOM) && floor > camera_z;
        let above = shadowing.contains(FloorShadowing::UPSIDE) && floor < camera_z;
        if !(below || above) {
            return Color::WHITE;
        }
        let distance = (i32::from(camera_z) - i32::from(floor)).abs() as f32;
        let start = if above { 0.5 } else { 0.6 };
        return Color::from_8bit(215).with_brightness(start - distance * 0.12);
    }

    if shadowing.contains(FloorShadowing::BOTTOM) && floor > camera_z {
        static_shadowing_color()
    } else if shadowing.contains(FloorShadowing::UPSIDE) && floor < camera_z {
        match global_light {
            Some(light) => Color::from_8bit(light.color).with_brightness(0.8),
            None => static_shadowing_color(),
        }
    } else {
        Color::WHITE
    }
}
