//! Scene-wide lighting.

use glam::Vec3;

/// Ambient term and one directional light shared by the whole scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneLighting {
    pub ambient_colour: Vec3,
    /// Direction the light travels, normalized.
    pub light_direction: Vec3,
    pub light_colour: Vec3,
}

impl Default for SceneLighting {
    fn default() -> Self {
        Self {
            ambient_colour: Vec3::new(0.2, 0.2, 0.3),
            light_direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            light_colour: Vec3::ONE,
        }
    }
}

impl SceneLighting {
    /// Create lighting; the direction is normalized, zero stays zero.
    pub fn new(ambient_colour: Vec3, light_direction: Vec3, light_colour: Vec3) -> Self {
        Self {
            ambient_colour,
            light_direction: light_direction.normalize_or_zero(),
            light_colour,
        }
    }
}
