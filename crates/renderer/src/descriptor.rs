//! Descriptor heap layout and constant buffer allocation.
//!
//! The shader-visible heap is carved into fixed ranges once at startup:
//!
//! ```text
//!  index  0 .. N-1      per-frame constants, one view per frame slot
//!         N             per-scene constants
//!         N+1           primary texture (checkerboard fallback)
//!         N+2 ..        height-field textures (256)
//!         ..            sky textures (16)
//!         ..            model albedo textures (64)
//! ```
//!
//! Texture indices are handed out in order within their class and never
//! reused. A class that runs out fails before anything is uploaded or written.

use std::fmt;
use std::ops::Range;

use tracing::{debug, info};

use vista_rhi::{Backend, BufferHandle, DescriptorView, HeapLayout, ImageHandle};

use crate::constants::{PerFrameConstants, PerSceneConstants};
use crate::error::{RendererError, RendererResult};

pub const MAX_HEIGHTMAP_TEXTURES: u32 = 256;
pub const MAX_SKY_TEXTURES: u32 = 16;
pub const MAX_MODEL_ALBEDO_TEXTURES: u32 = 64;

/// Kinds of texture, each with its own index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureClass {
    /// The single primary texture slot.
    Primary,
    Heightmap,
    Sky,
    ModelAlbedo,
}

impl TextureClass {
    pub const ALL: [TextureClass; 4] = [
        TextureClass::Primary,
        TextureClass::Heightmap,
        TextureClass::Sky,
        TextureClass::ModelAlbedo,
    ];

    fn position(self) -> usize {
        match self {
            TextureClass::Primary => 0,
            TextureClass::Heightmap => 1,
            TextureClass::Sky => 2,
            TextureClass::ModelAlbedo => 3,
        }
    }
}

impl fmt::Display for TextureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextureClass::Primary => "primary texture",
            TextureClass::Heightmap => "heightmap",
            TextureClass::Sky => "sky",
            TextureClass::ModelAlbedo => "model albedo",
        })
    }
}

/// Start index of every heap range for a given number of frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub frame_slots: u32,
    pub per_frame_cbv_start: u32,
    pub per_scene_cbv: u32,
    pub texture_srv: u32,
    pub heightmap_srv: u32,
    pub sky_srv: u32,
    pub model_albedo_srv: u32,
    pub num_descriptors: u32,
}

impl DescriptorLayout {
    pub const fn new(frame_slots: u32) -> Self {
        let per_frame_cbv_start = 0;
        let per_scene_cbv = per_frame_cbv_start + frame_slots;
        let texture_srv = per_scene_cbv + 1;
        let heightmap_srv = texture_srv + 1;
        let sky_srv = heightmap_srv + MAX_HEIGHTMAP_TEXTURES;
        let model_albedo_srv = sky_srv + MAX_SKY_TEXTURES;
        let num_descriptors = model_albedo_srv + MAX_MODEL_ALBEDO_TEXTURES;
        Self {
            frame_slots,
            per_frame_cbv_start,
            per_scene_cbv,
            texture_srv,
            heightmap_srv,
            sky_srv,
            model_albedo_srv,
            num_descriptors,
        }
    }

    /// Heap index of a slot's per-frame constant view.
    pub fn frame_cbv(&self, slot: usize) -> u32 {
        self.per_frame_cbv_start + slot as u32
    }

    /// Index range a texture class allocates from.
    pub fn range(&self, class: TextureClass) -> Range<u32> {
        match class {
            TextureClass::Primary => self.texture_srv..self.heightmap_srv,
            TextureClass::Heightmap => self.heightmap_srv..self.sky_srv,
            TextureClass::Sky => self.sky_srv..self.model_albedo_srv,
            TextureClass::ModelAlbedo => self.model_albedo_srv..self.num_descriptors,
        }
    }

    pub fn capacity(&self, class: TextureClass) -> u32 {
        let range = self.range(class);
        range.end - range.start
    }

    /// Class whose range contains a heap index.
    pub fn class_of(&self, index: u32) -> Option<TextureClass> {
        TextureClass::ALL
            .into_iter()
            .find(|class| self.range(*class).contains(&index))
    }

    /// Element of the bindless texture array a texture heap index maps to.
    pub fn texture_element(&self, index: u32) -> u32 {
        index.saturating_sub(self.texture_srv)
    }

    /// The heap as a backend sees it.
    pub fn heap_layout(&self) -> HeapLayout {
        HeapLayout {
            frame_slots: self.frame_slots,
            texture_capacity: self.num_descriptors - self.texture_srv,
        }
    }
}

/// Owns the descriptor heap contents and the constant buffers behind it.
#[derive(Debug)]
pub struct DescriptorAllocator {
    layout: DescriptorLayout,
    frame_buffers: Vec<BufferHandle>,
    scene_buffer: BufferHandle,
    next: [u32; 4],
    textures: Vec<(u32, ImageHandle)>,
}

impl DescriptorAllocator {
    /// Create the heap, one constant buffer per slot plus the scene buffer, and
    /// write their views. Constant views are written only here.
    pub fn new<B: Backend>(backend: &mut B, frame_slots: usize) -> RendererResult<Self> {
        let layout = DescriptorLayout::new(frame_slots as u32);
        backend.create_descriptor_heap(layout.heap_layout())?;

        let frame_size = PerFrameConstants::SIZE as u64;
        let mut frame_buffers = Vec::with_capacity(frame_slots);
        for slot in 0..frame_slots {
            let buffer =
                backend.create_constant_buffer(&format!("per-frame constants {slot}"), frame_size)?;
            backend.write_descriptor(
                layout.frame_cbv(slot),
                DescriptorView::Constants {
                    buffer,
                    size: frame_size,
                },
            )?;
            frame_buffers.push(buffer);
        }

        let scene_size = PerSceneConstants::SIZE as u64;
        let scene_buffer = backend.create_constant_buffer("per-scene constants", scene_size)?;
        backend.write_descriptor(
            layout.per_scene_cbv,
            DescriptorView::Constants {
                buffer: scene_buffer,
                size: scene_size,
            },
        )?;

        let next = TextureClass::ALL.map(|class| layout.range(class).start);

        info!(
            "Descriptor heap created: {} descriptors, {} frame slots",
            layout.num_descriptors, frame_slots
        );

        Ok(Self {
            layout,
            frame_buffers,
            scene_buffer,
            next,
            textures: Vec::new(),
        })
    }

    #[inline]
    pub fn layout(&self) -> &DescriptorLayout {
        &self.layout
    }

    pub fn frame_buffer(&self, slot: usize) -> BufferHandle {
        self.frame_buffers[slot]
    }

    pub fn scene_buffer(&self) -> BufferHandle {
        self.scene_buffer
    }

    /// Copy camera constants into one slot's buffer.
    ///
    /// The caller guarantees the slot's previous GPU work has completed.
    pub fn write_frame_constants<B: Backend>(
        &self,
        backend: &mut B,
        slot: usize,
        constants: &PerFrameConstants,
    ) -> RendererResult<()> {
        backend.write_buffer(self.frame_buffers[slot], 0, bytemuck::bytes_of(constants))?;
        Ok(())
    }

    pub fn write_scene_constants<B: Backend>(
        &self,
        backend: &mut B,
        constants: &PerSceneConstants,
    ) -> RendererResult<()> {
        backend.write_buffer(self.scene_buffer, 0, bytemuck::bytes_of(constants))?;
        Ok(())
    }

    /// Index the next texture of `class` would get.
    ///
    /// # Errors
    /// Returns [`RendererError::OutOfSlots`] when the class is exhausted.
    pub fn next_index(&self, class: TextureClass) -> RendererResult<u32> {
        let index = self.next[class.position()];
        if index >= self.layout.range(class).end {
            return Err(RendererError::OutOfSlots {
                class,
                capacity: self.layout.capacity(class),
            });
        }
        Ok(index)
    }

    /// Write a texture view at the next index of its class and claim it.
    pub fn register<B: Backend>(
        &mut self,
        backend: &mut B,
        class: TextureClass,
        image: ImageHandle,
    ) -> RendererResult<u32> {
        let index = self.next_index(class)?;
        backend.write_descriptor(index, DescriptorView::Texture(image))?;
        self.next[class.position()] += 1;
        self.textures.push((index, image));
        debug!("Registered {} at descriptor {}", class, index);
        Ok(index)
    }

    /// Textures registered in a class so far.
    pub fn registered(&self, class: TextureClass) -> u32 {
        self.next[class.position()] - self.layout.range(class).start
    }

    /// Image registered at a heap index.
    pub fn texture(&self, index: u32) -> Option<ImageHandle> {
        self.textures
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, image)| *image)
    }

    /// Hand back every registered texture for destruction.
    pub fn take_textures(&mut self) -> Vec<ImageHandle> {
        self.textures.drain(..).map(|(_, image)| image).collect()
    }
}
