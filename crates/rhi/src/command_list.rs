//! Backend-neutral command recording.
//!
//! A [`CommandList`] is the CPU-side record of one frame's GPU work. Backends
//! translate it into native commands when it is submitted.

use bytemuck::Pod;

use crate::error::{RhiError, RhiResult};
use crate::types::{
    ImageHandle, MeshHandle, PipelineHandle, ResourceState, ScissorRect, Viewport,
};

/// Per-draw constants pushed inline with a draw.
///
/// Limited to 128 bytes, the push constant size every Vulkan device supports.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PushConstants {
    words: [u32; Self::MAX_BYTES / 4],
    len: usize,
}

impl PushConstants {
    pub const MAX_BYTES: usize = 128;

    /// Copy a plain-old-data value into a push constant block.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Unsupported`] if `T` is larger than [`Self::MAX_BYTES`]
    /// or not a whole number of 32-bit words.
    pub fn new<T: Pod>(value: &T) -> RhiResult<Self> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() > Self::MAX_BYTES || bytes.len() % 4 != 0 {
            return Err(RhiError::Unsupported(format!(
                "push constant block of {} bytes",
                bytes.len()
            )));
        }

        let mut words = [0u32; Self::MAX_BYTES / 4];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            words,
            len: bytes.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.len]
    }

    /// Read the block back as `T`, if the sizes match.
    pub fn read<T: Pod>(&self) -> Option<T> {
        bytemuck::try_pod_read_unaligned(self.as_bytes()).ok()
    }
}

impl std::fmt::Debug for PushConstants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PushConstants({} bytes)", self.len)
    }
}

/// One recorded GPU command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetPipeline(PipelineHandle),
    /// Bind the descriptor table whose constant view belongs to frame slot `slot`.
    BindDescriptorTable { slot: usize },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Barrier {
        image: ImageHandle,
        before: ResourceState,
        after: ResourceState,
    },
    /// Bind the color and depth targets that clears and draws apply to.
    SetRenderTargets {
        color: ImageHandle,
        depth: Option<ImageHandle>,
    },
    ClearRenderTarget { image: ImageHandle, color: [f32; 4] },
    ClearDepth { image: ImageHandle, depth: f32 },
    Draw {
        mesh: MeshHandle,
        constants: PushConstants,
    },
    /// Resolve a multisampled image into a single-sampled one.
    Resolve {
        source: ImageHandle,
        destination: ImageHandle,
    },
}

/// An ordered list of commands for one frame slot.
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<Command>,
    closed: bool,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all commands and reopen the list for recording.
    ///
    /// The backing storage is kept so steady-state frames do not allocate.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.closed = false;
    }

    /// Append a command.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the list has been closed.
    pub fn push(&mut self, command: Command) -> RhiResult<()> {
        if self.closed {
            return Err(RhiError::InvalidHandle(
                "cannot record into a closed command list".to_string(),
            ));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Finish recording. Further pushes fail until [`reset`](Self::reset).
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Recorded barriers as `(image, before, after)`, in order.
    pub fn barriers(&self) -> impl Iterator<Item = (ImageHandle, ResourceState, ResourceState)> + '_ {
        self.commands.iter().filter_map(|c| match *c {
            Command::Barrier {
                image,
                before,
                after,
            } => Some((image, before, after)),
            _ => None,
        })
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Small {
        a: [f32; 4],
        index: u32,
        _pad: [u32; 3],
    }

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct TooBig {
        data: [u32; 64],
    }

    #[test]
    fn test_push_constants_keep_bytes() {
        let value = Small {
            a: [1.0, 2.0, 3.0, 4.0],
            index: 7,
            _pad: [0; 3],
        };
        let block = PushConstants::new(&value).unwrap();
        assert_eq!(block.as_bytes().len(), 32);
        let back: Small = block.read().unwrap();
        assert_eq!(back.index, 7);
        assert_eq!(back.a, value.a);
    }

    #[test]
    fn test_push_constants_size_limit() {
        let value = TooBig { data: [0; 64] };
        assert!(matches!(
            PushConstants::new(&value),
            Err(RhiError::Unsupported(_))
        ));
    }

    #[test]
    fn test_closed_list_rejects_commands() {
        let mut list = CommandList::new();
        list.push(Command::BindDescriptorTable { slot: 0 }).unwrap();
        list.close();
        assert!(list.push(Command::BindDescriptorTable { slot: 0 }).is_err());

        list.reset();
        assert!(list.is_empty());
        assert!(!list.is_closed());
        list.push(Command::BindDescriptorTable { slot: 1 }).unwrap();
        assert_eq!(list.len(), 1);
    }
}
