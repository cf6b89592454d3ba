//! Frame synchronization and GPU resource lifecycle.
//!
//! This crate drives N-buffered command recording over a [`vista_rhi::Backend`]:
//! - Fence watermarks gating reuse of each frame slot
//! - Per-slot command recording with an explicit state machine
//! - Barrier insertion for the per-frame targets
//! - The descriptor heap layout and constant buffers
//! - MSAA targets, surface recreation, pipelines and meshes
//! - Flattening a scene into draw items

mod error;

pub mod constants;
pub mod descriptor;
pub mod draw_list;
pub mod fence;
pub mod meshes;
pub mod msaa;
pub mod pipelines;
pub mod recorder;
pub mod renderer;
pub mod state;
pub mod surface;

pub use constants::{PerDrawConstants, PerFrameConstants, PerSceneConstants};
pub use descriptor::{DescriptorLayout, TextureClass};
pub use draw_list::{DrawItem, DrawListAssembler, MeshSelector, ObjectKindTag};
pub use error::{RendererError, RendererResult};
pub use fence::FrameFences;
pub use msaa::{MsaaState, MsaaTargets};
pub use recorder::SlotState;
pub use renderer::{MAX_FRAMES_IN_FLIGHT, MIN_FRAMES_IN_FLIGHT, Renderer, VulkanRenderer};
pub use state::{FramePath, FrameTarget, Transition};
