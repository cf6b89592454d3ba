//! Mouse-driven orbit camera.

use std::f32::consts::FRAC_PI_2;

use glam::Vec3;
use vista_scene::Camera;

const ROTATE_SPEED: f32 = 0.005;
const ZOOM_STEP: f32 = 0.9;
const MIN_DISTANCE: f32 = 2.0;
const MAX_DISTANCE: f32 = 200.0;
// Stay just short of the poles so the view never flips.
const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitController {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 12.0,
            yaw: 0.6,
            pitch: 0.4,
        }
    }
}

impl OrbitController {
    /// Rotate by a mouse drag in pixels.
    pub fn drag(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * ROTATE_SPEED;
        self.pitch = (self.pitch + dy * ROTATE_SPEED).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Zoom by scroll wheel lines; positive moves closer.
    pub fn zoom(&mut self, lines: f32) {
        self.distance = (self.distance * ZOOM_STEP.powf(lines)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn apply(&self, camera: &mut Camera) {
        camera.orbit(self.target, self.distance, self.yaw, self.pitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_clamped() {
        let mut orbit = OrbitController::default();
        orbit.drag(0.0, 10_000.0);
        assert_eq!(orbit.pitch, MAX_PITCH);
        orbit.drag(0.0, -20_000.0);
        assert_eq!(orbit.pitch, -MAX_PITCH);
    }

    #[test]
    fn test_zoom_clamped() {
        let mut orbit = OrbitController::default();
        orbit.zoom(1.0);
        assert!(orbit.distance < 12.0);
        orbit.zoom(1000.0);
        assert_eq!(orbit.distance, MIN_DISTANCE);
        orbit.zoom(-1000.0);
        assert_eq!(orbit.distance, MAX_DISTANCE);
    }

    #[test]
    fn test_apply_places_camera_at_distance() {
        let orbit = OrbitController::default();
        let mut camera = Camera::new();
        orbit.apply(&mut camera);
        assert!((camera.position.length() - orbit.distance).abs() < 1e-4);
    }
}
