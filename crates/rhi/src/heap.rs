//! Shader-visible descriptor heap partitioning.
//!
//! The heap is one flat index space. The first `frame_slots` entries are the
//! per-slot constant views, the next one is the per-scene constant view, and
//! everything after it is a texture view.

use crate::types::{BufferHandle, ImageHandle};

/// Size of the descriptor heap as seen by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLayout {
    /// Number of frame slots, each with its own constant view.
    pub frame_slots: u32,
    /// Number of texture views following the constant views.
    pub texture_capacity: u32,
}

/// Where a flat heap index lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeapBinding {
    FrameConstants { slot: u32 },
    SceneConstants,
    Texture { element: u32 },
}

impl HeapLayout {
    /// First texture index.
    pub fn first_texture(&self) -> u32 {
        self.frame_slots + 1
    }

    /// Total number of descriptors.
    pub fn len(&self) -> u32 {
        self.first_texture() + self.texture_capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map a flat index to its binding, or `None` if out of range.
    pub fn classify(&self, index: u32) -> Option<HeapBinding> {
        if index < self.frame_slots {
            Some(HeapBinding::FrameConstants { slot: index })
        } else if index == self.frame_slots {
            Some(HeapBinding::SceneConstants)
        } else if index < self.len() {
            Some(HeapBinding::Texture {
                element: index - self.first_texture(),
            })
        } else {
            None
        }
    }
}

/// What a descriptor heap entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorView {
    Constants { buffer: BufferHandle, size: u64 },
    Texture(ImageHandle),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_partitions() {
        let layout = HeapLayout {
            frame_slots: 3,
            texture_capacity: 337,
        };
        assert_eq!(layout.len(), 341);
        assert_eq!(
            layout.classify(0),
            Some(HeapBinding::FrameConstants { slot: 0 })
        );
        assert_eq!(
            layout.classify(2),
            Some(HeapBinding::FrameConstants { slot: 2 })
        );
        assert_eq!(layout.classify(3), Some(HeapBinding::SceneConstants));
        assert_eq!(layout.classify(4), Some(HeapBinding::Texture { element: 0 }));
        assert_eq!(
            layout.classify(340),
            Some(HeapBinding::Texture { element: 336 })
        );
        assert_eq!(layout.classify(341), None);
    }
}
