//! Backend-neutral types shared by every backend.
//!
//! Handles are small copyable ids into a backend-owned arena. They carry no
//! lifetime; using a handle after the backend destroyed it is reported as
//! [`RhiError::InvalidHandle`](crate::RhiError::InvalidHandle).

use std::fmt;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Raw arena index.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_handle!(
    /// A GPU image: presentable image, render target, depth buffer or texture.
    ImageHandle,
    "image"
);
define_handle!(
    /// A persistently mapped constant buffer.
    BufferHandle,
    "buffer"
);
define_handle!(
    /// An uploaded vertex + index buffer pair.
    MeshHandle,
    "mesh"
);
define_handle!(
    /// A compiled graphics pipeline.
    PipelineHandle,
    "pipeline"
);

/// Usage role of a GPU resource.
///
/// A resource must be in the state matching its next use; the transition is
/// recorded explicitly as a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Present,
    RenderTarget,
    DepthWrite,
    ResolveSource,
    ResolveDest,
    CopyDest,
    ShaderResource,
}

impl ResourceState {
    pub fn name(self) -> &'static str {
        match self {
            ResourceState::Present => "present",
            ResourceState::RenderTarget => "render-target",
            ResourceState::DepthWrite => "depth-write",
            ResourceState::ResolveSource => "resolve-source",
            ResourceState::ResolveDest => "resolve-dest",
            ResourceState::CopyDest => "copy-dest",
            ResourceState::ShaderResource => "shader-resource",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Multisample count for render targets and pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SampleCount {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl SampleCount {
    /// Every tier, lowest first.
    pub const ALL: [SampleCount; 4] = [
        SampleCount::X1,
        SampleCount::X2,
        SampleCount::X4,
        SampleCount::X8,
    ];

    /// Number of samples per pixel.
    pub fn count(self) -> u32 {
        match self {
            SampleCount::X1 => 1,
            SampleCount::X2 => 2,
            SampleCount::X4 => 4,
            SampleCount::X8 => 8,
        }
    }

    /// Parse a sample count; only 1, 2, 4 and 8 are valid.
    pub fn from_count(count: u32) -> Option<Self> {
        match count {
            1 => Some(SampleCount::X1),
            2 => Some(SampleCount::X2),
            4 => Some(SampleCount::X4),
            8 => Some(SampleCount::X8),
            _ => None,
        }
    }

    /// Position in [`SampleCount::ALL`].
    pub fn tier(self) -> usize {
        match self {
            SampleCount::X1 => 0,
            SampleCount::X2 => 1,
            SampleCount::X4 => 2,
            SampleCount::X8 => 3,
        }
    }

    pub fn is_multisampled(self) -> bool {
        self != SampleCount::X1
    }
}

impl fmt::Display for SampleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.count())
    }
}

/// Set of sample counts a device supports for both color and depth targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleCountSet(u8);

impl SampleCountSet {
    /// Only single-sampled rendering.
    pub fn single() -> Self {
        Self(1)
    }

    /// All four tiers.
    pub fn all() -> Self {
        Self(0b1111)
    }

    /// Build a set from sample counts. 1x is always included.
    pub fn from_counts(counts: impl IntoIterator<Item = SampleCount>) -> Self {
        counts.into_iter().fold(Self::single(), |set, c| set.with(c))
    }

    #[must_use]
    pub fn with(self, count: SampleCount) -> Self {
        Self(self.0 | (1 << count.tier()))
    }

    pub fn contains(self, count: SampleCount) -> bool {
        self.0 & (1 << count.tier()) != 0
    }

    /// Supported counts, lowest first.
    pub fn iter(self) -> impl Iterator<Item = SampleCount> {
        SampleCount::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Highest supported count.
    pub fn highest(self) -> SampleCount {
        self.iter().last().unwrap_or_default()
    }

    /// The supported count following `current`, wrapping back to 1x.
    pub fn next_after(self, current: SampleCount) -> SampleCount {
        self.iter()
            .find(|c| *c > current)
            .unwrap_or(SampleCount::X1)
    }
}

impl Default for SampleCountSet {
    fn default() -> Self {
        Self::single()
    }
}

/// Size of a 2D surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, e.g. a minimized window.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Viewport transform, depth range [min_depth, max_depth].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// A viewport covering the whole extent.
    pub fn full(extent: Extent2D) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn full(extent: Extent2D) -> Self {
        Self {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }
}

/// Pixel format of an image created through a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Whatever format the presentable images use.
    Surface,
    /// 32-bit float depth.
    Depth32Float,
    /// 8-bit RGBA, sRGB encoded.
    Rgba8Srgb,
}

/// What an image is created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    /// Color attachment that can also be a resolve source.
    RenderTarget,
    /// Depth attachment.
    DepthStencil,
    /// Sampled texture, filled once by upload.
    Texture,
}

/// Description of an image to create.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageDesc {
    pub label: String,
    pub extent: Extent2D,
    pub format: ImageFormat,
    pub usage: ImageUsage,
    pub samples: SampleCount,
    /// State the image is in once creation returns.
    pub initial_state: ResourceState,
}

impl ImageDesc {
    /// A color render target in the surface format.
    pub fn render_target(label: impl Into<String>, extent: Extent2D, samples: SampleCount) -> Self {
        Self {
            label: label.into(),
            extent,
            format: ImageFormat::Surface,
            usage: ImageUsage::RenderTarget,
            samples,
            initial_state: ResourceState::RenderTarget,
        }
    }

    /// A D32 depth buffer.
    pub fn depth(label: impl Into<String>, extent: Extent2D, samples: SampleCount) -> Self {
        Self {
            label: label.into(),
            extent,
            format: ImageFormat::Depth32Float,
            usage: ImageUsage::DepthStencil,
            samples,
            initial_state: ResourceState::DepthWrite,
        }
    }

    /// A sampled RGBA8 texture.
    pub fn texture(label: impl Into<String>, extent: Extent2D) -> Self {
        Self {
            label: label.into(),
            extent,
            format: ImageFormat::Rgba8Srgb,
            usage: ImageUsage::Texture,
            samples: SampleCount::X1,
            initial_state: ResourceState::ShaderResource,
        }
    }
}

/// Description of a graphics pipeline.
///
/// `shader` names a shader variant; the Vulkan backend loads
/// `<shader_dir>/<shader>.vert.spv` and `<shader_dir>/<shader>.frag.spv`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub label: String,
    pub shader: String,
    pub samples: SampleCount,
}

/// Outcome of presenting or acquiring a presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented normally.
    Presented,
    /// Presented, but the surface no longer matches and should be recreated.
    Suboptimal,
    /// Not presented; the surface must be recreated first.
    OutOfDate,
}

impl PresentStatus {
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

/// A presentable image acquired for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Position in the surface's image list.
    pub index: usize,
    pub image: ImageHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_round_trip_and_tiers() {
        for (tier, count) in SampleCount::ALL.iter().enumerate() {
            assert_eq!(count.tier(), tier);
            assert_eq!(SampleCount::from_count(count.count()), Some(*count));
        }
        assert_eq!(SampleCount::from_count(3), None);
        assert_eq!(SampleCount::from_count(16), None);
    }

    #[test]
    fn test_sample_count_set_always_has_single() {
        let set = SampleCountSet::from_counts([SampleCount::X4]);
        assert!(set.contains(SampleCount::X1));
        assert!(set.contains(SampleCount::X4));
        assert!(!set.contains(SampleCount::X2));
        assert_eq!(set.highest(), SampleCount::X4);
    }

    #[test]
    fn test_sample_count_set_cycles() {
        let set = SampleCountSet::from_counts([SampleCount::X2, SampleCount::X8]);
        assert_eq!(set.next_after(SampleCount::X1), SampleCount::X2);
        assert_eq!(set.next_after(SampleCount::X2), SampleCount::X8);
        assert_eq!(set.next_after(SampleCount::X8), SampleCount::X1);
    }

    #[test]
    fn test_extent_empty() {
        assert!(Extent2D::new(0, 600).is_empty());
        assert!(!Extent2D::new(800, 600).is_empty());
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = Extent2D::new(1920, 1080);
        let viewport = Viewport::full(extent);
        assert_eq!(viewport.width, 1920.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(ScissorRect::full(extent).height, 1080);
    }
}
