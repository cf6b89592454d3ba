//! CPU-side resources.
//!
//! This crate produces the data the renderer uploads:
//! - Procedural primitive meshes and the height-field grid
//! - Decoded RGBA8 textures and the checkerboard fallback

mod error;

pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, PrimitiveType};
pub use texture::TextureData;
