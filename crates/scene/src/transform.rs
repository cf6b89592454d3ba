//! Transform component for scene objects.
//!
//! This module provides the [`Transform`] struct for representing position,
//! rotation, and scale of scene objects. Scene objects are flat; a transform
//! maps straight from object space to world space.
//!
//! # Example
//!
//! ```
//! use vista_scene::Transform;
//! use glam::{Quat, Vec3};
//!
//! let t = Transform::new()
//!     .with_position(Vec3::new(1.0, 0.0, 0.0))
//!     .with_rotation(Quat::from_rotation_y(0.5))
//!     .with_scale(Vec3::splat(2.0));
//!
//! let world = t.world_matrix();
//! assert!((world.transform_point3(Vec3::ZERO) - Vec3::X).length() < 1e-6);
//! ```

use glam::{Mat4, Quat, Vec3};

/// A transform representing position, rotation, and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor per axis
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with the given position.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Create a transform with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Create a transform with the given scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Object-to-world matrix: scale, then rotate, then translate.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}
