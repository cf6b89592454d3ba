//! Constant buffer layouts shared with the shaders.
//!
//! These structures must match the HLSL constant buffer layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.
//!
//! Per-frame and per-scene constants live in buffers bound through the
//! descriptor heap, so their sizes are multiples of 256 bytes. Per-draw
//! constants are pushed inline and stay within the 128 bytes every device
//! guarantees for push constants.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Required size granularity of a constant buffer view.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 256;

/// Camera matrices, one copy per frame slot.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: padding (128 bytes)
/// - Total size: 256 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PerFrameConstants {
    pub view: Mat4,
    pub projection: Mat4,
    pub _padding: [f32; 32],
}

impl PerFrameConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            _padding: [0.0; 32],
        }
    }
}

impl Default for PerFrameConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Scene lighting, written on demand between frames.
///
/// # Memory Layout
///
/// - Offset 0: ambient colour (16 bytes, w = 1)
/// - Offset 16: light direction (16 bytes, w = 0)
/// - Offset 32: light colour (16 bytes, w = 1)
/// - Offset 48: padding (208 bytes)
/// - Total size: 256 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PerSceneConstants {
    pub ambient_colour: Vec4,
    pub light_direction: Vec4,
    pub light_colour: Vec4,
    pub _padding: [Vec4; 13],
}

impl PerSceneConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(ambient_colour: Vec3, light_direction: Vec3, light_colour: Vec3) -> Self {
        Self {
            ambient_colour: ambient_colour.extend(1.0),
            light_direction: light_direction.normalize_or_zero().extend(0.0),
            light_colour: light_colour.extend(1.0),
            _padding: [Vec4::ZERO; 13],
        }
    }
}

/// Per-draw values pushed inline with each draw.
///
/// # Memory Layout
///
/// - Offset 0: world matrix (64 bytes)
/// - Offset 64: texture array element (4 bytes)
/// - Offset 68: padding (12 bytes)
/// - Total size: 80 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PerDrawConstants {
    pub world: Mat4,
    /// Element of the bindless texture array, counted from the first texture view.
    pub texture_index: u32,
    pub _padding: [u32; 3],
}

impl PerDrawConstants {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(world: Mat4, texture_index: u32) -> Self {
        Self {
            world,
            texture_index,
            _padding: [0; 3],
        }
    }
}

const _: () = assert!(PerFrameConstants::SIZE % CONSTANT_BUFFER_ALIGNMENT == 0);
const _: () = assert!(PerSceneConstants::SIZE % CONSTANT_BUFFER_ALIGNMENT == 0);
const _: () = assert!(PerDrawConstants::SIZE <= vista_rhi::PushConstants::MAX_BYTES);

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_per_frame_size() {
        assert_eq!(size_of::<PerFrameConstants>(), 256);
        assert_eq!(PerFrameConstants::SIZE % CONSTANT_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn test_per_scene_size() {
        assert_eq!(size_of::<PerSceneConstants>(), 256);
        assert_eq!(PerSceneConstants::SIZE % CONSTANT_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn test_per_draw_fits_push_constants() {
        assert_eq!(size_of::<PerDrawConstants>(), 80);
        assert!(PerDrawConstants::SIZE <= 128);
        assert!(align_of::<PerDrawConstants>() >= 4);
    }

    #[test]
    fn test_per_scene_homogeneous_components() {
        let scene = PerSceneConstants::new(Vec3::splat(0.2), Vec3::new(0.0, -2.0, 0.0), Vec3::ONE);
        assert_eq!(scene.ambient_colour, Vec4::new(0.2, 0.2, 0.2, 1.0));
        assert_eq!(scene.light_direction, Vec4::new(0.0, -1.0, 0.0, 0.0));
        assert_eq!(scene.light_colour.w, 1.0);
    }

    #[test]
    fn test_bytemuck_cast() {
        let frame = PerFrameConstants::new(Mat4::from_scale(Vec3::splat(2.0)), Mat4::IDENTITY);
        let bytes: &[u8] = bytemuck::bytes_of(&frame);
        assert_eq!(bytes.len(), PerFrameConstants::SIZE);
        assert_eq!(&bytes[0..4], &2.0f32.to_ne_bytes());

        let draw = PerDrawConstants::new(Mat4::IDENTITY, 9);
        let bytes: &[u8] = bytemuck::bytes_of(&draw);
        assert_eq!(&bytes[64..68], &9u32.to_ne_bytes());
    }
}
