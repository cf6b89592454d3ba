//! Renderer error types.

use thiserror::Error;

use vista_resources::ResourceError;
use vista_rhi::{RhiError, SampleCount};
use vista_scene::RenderPipeline;

use crate::descriptor::TextureClass;
use crate::recorder::SlotState;

/// Errors raised by the frame-synchronization core.
#[derive(Error, Debug)]
pub enum RendererError {
    /// The backend rejected a call
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// A texture could not be loaded
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Every descriptor index of a texture class is taken
    #[error("No free {class} descriptor slots ({capacity} in use)")]
    OutOfSlots { class: TextureClass, capacity: u32 },

    /// The device cannot render at this sample count
    #[error("Unsupported MSAA sample count: {0}")]
    UnsupportedSampleCount(u32),

    /// A frame slot was driven through an illegal transition
    #[error("Cannot {operation} frame slot {slot} while it is {state}")]
    InvalidSlotState {
        slot: usize,
        state: SlotState,
        operation: &'static str,
    },

    /// No pipeline exists for a technique at a sample count
    #[error("No {technique} pipeline at {samples}")]
    MissingPipeline {
        technique: RenderPipeline,
        samples: SampleCount,
    },

    /// Frames in flight outside the supported range
    #[error("Frames in flight must be 2 or 3, got {0}")]
    InvalidFrameCount(usize),

    /// A slot was about to be reused before the GPU finished with it
    #[error("Frame slot {slot} reused at fence value {completed}, needs {watermark}")]
    FenceInvariant {
        slot: usize,
        completed: u64,
        watermark: u64,
    },

    /// A per-frame call arrived outside begin_frame/end_frame
    #[error("No frame is being recorded")]
    FrameNotStarted,
}

impl RendererError {
    /// True when the surface must be recreated before rendering continues.
    pub fn is_surface_out_of_date(&self) -> bool {
        matches!(self, RendererError::Rhi(RhiError::SurfaceOutOfDate))
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;
