//! The seam between the frame-synchronization core and a graphics API.
//!
//! # Overview
//!
//! A [`Backend`] owns every GPU object and hands out copyable handles. The
//! renderer drives it through a small, explicit surface:
//!
//! - one shared fence with a monotonically increasing completion value
//! - presentable images that rotate through acquire and present
//! - images, constant buffers, meshes and pipelines
//! - a flat descriptor heap written by index
//! - one command allocator per frame slot, reset only by the caller
//!
//! Two implementations exist: [`VulkanBackend`](crate::vulkan::VulkanBackend)
//! and [`HeadlessBackend`](crate::headless::HeadlessBackend).

use crate::command_list::CommandList;
use crate::error::RhiResult;
use crate::heap::{DescriptorView, HeapLayout};
use crate::types::{
    AcquiredImage, BufferHandle, Extent2D, ImageDesc, ImageHandle, MeshHandle, PipelineDesc,
    PipelineHandle, PresentStatus, SampleCountSet,
};
use crate::vertex::Vertex;

/// A graphics API driven by the renderer.
///
/// All methods are called from the single recording thread.
pub trait Backend {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Sample counts usable for both color and depth targets, probed once.
    fn supported_sample_counts(&self) -> SampleCountSet;

    // Fence

    /// Last value the GPU signaled on the shared fence.
    fn completed_fence_value(&self) -> u64;

    /// Enqueue a signal of `value` behind all work submitted so far.
    fn signal_fence(&mut self, value: u64) -> RhiResult<()>;

    /// Block until the fence reaches `value`. No timeout.
    fn wait_fence(&self, value: u64) -> RhiResult<()>;

    /// Block until the queue is empty.
    fn wait_idle(&mut self) -> RhiResult<()>;

    // Surface

    fn surface_extent(&self) -> Extent2D;

    /// Presentable images, in surface order.
    fn backbuffers(&self) -> Vec<ImageHandle>;

    /// Acquire the next presentable image for frame slot `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceOutOfDate`](crate::RhiError::SurfaceOutOfDate)
    /// when the surface must be recreated first.
    fn acquire_backbuffer(&mut self, slot: usize) -> RhiResult<AcquiredImage>;

    /// Present an acquired image after the slot's submission completes.
    fn present(&mut self, slot: usize, image_index: usize, vsync: bool) -> RhiResult<PresentStatus>;

    /// Release the views of every presentable image. Handles become invalid.
    fn release_backbuffers(&mut self);

    /// Resize the surface and create views for its new images.
    ///
    /// Only valid after [`release_backbuffers`](Self::release_backbuffers) and
    /// with the queue idle.
    fn resize_surface(&mut self, extent: Extent2D) -> RhiResult<Vec<ImageHandle>>;

    // Resources

    fn create_image(&mut self, desc: &ImageDesc) -> RhiResult<ImageHandle>;

    /// Create a sampled texture and upload RGBA8 pixels into it. Blocks until
    /// the upload finishes.
    fn create_texture(&mut self, desc: &ImageDesc, pixels: &[u8]) -> RhiResult<ImageHandle>;

    fn destroy_image(&mut self, image: ImageHandle);

    /// Create a persistently mapped constant buffer of `size` bytes.
    fn create_constant_buffer(&mut self, label: &str, size: u64) -> RhiResult<BufferHandle>;

    /// Copy `data` into a constant buffer at `offset`.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RhiResult<()>;

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32])
    -> RhiResult<MeshHandle>;

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> RhiResult<PipelineHandle>;

    // Descriptors

    /// Create the shader-visible heap. Called once before any descriptor write.
    fn create_descriptor_heap(&mut self, layout: HeapLayout) -> RhiResult<()>;

    /// Write a view at a flat heap index.
    fn write_descriptor(&mut self, index: u32, view: DescriptorView) -> RhiResult<()>;

    // Submission

    /// Reset the command allocator owned by `slot`.
    ///
    /// The caller guarantees the slot's last submission has completed.
    fn reset_command_allocator(&mut self, slot: usize) -> RhiResult<()>;

    /// Submit a closed command list recorded for `slot`.
    fn submit(&mut self, slot: usize, commands: &CommandList) -> RhiResult<()>;
}
