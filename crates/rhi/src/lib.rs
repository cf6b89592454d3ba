//! Render hardware interface.
//!
//! The frame-synchronization core talks to the GPU only through the
//! [`Backend`] trait and backend-neutral [`CommandList`]s. This crate provides:
//! - [`VulkanBackend`](vulkan::VulkanBackend): Vulkan 1.3 via `ash` and
//!   `gpu-allocator`, built on the wrappers in the public modules below
//! - [`HeadlessBackend`](headless::HeadlessBackend): a simulated GPU timeline
//!   that validates every recorded command, used by tests

mod error;

pub mod backend;
pub mod buffer;
pub mod command;
pub mod command_list;
pub mod descriptor;
pub mod device;
pub mod headless;
pub mod heap;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod types;
pub mod vertex;
pub mod vulkan;

pub use backend::Backend;
pub use command_list::{Command, CommandList, PushConstants};
pub use error::{RhiError, RhiResult};
pub use heap::{DescriptorView, HeapBinding, HeapLayout};
pub use types::{
    AcquiredImage, BufferHandle, Extent2D, ImageDesc, ImageFormat, ImageHandle, ImageUsage,
    MeshHandle, PipelineDesc, PipelineHandle, PresentStatus, ResourceState, SampleCount,
    SampleCountSet, ScissorRect, Viewport,
};
pub use vertex::Vertex;

// Re-export ash types that users might need
pub use ash::vk;
