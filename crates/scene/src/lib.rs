//! Scene objects and their components.
//!
//! This crate provides scene management:
//! - A bounded list of objects, each with a transform, technique and kind
//! - Camera
//! - Scene lighting

mod error;

pub mod camera;
pub mod light;
pub mod object;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Projection};
pub use error::{SceneError, SceneResult};
pub use light::SceneLighting;
pub use object::{ObjectKind, RenderPipeline, SceneObject};
pub use scene::{MAX_SCENE_OBJECTS, Scene};
pub use transform::Transform;
pub use vista_resources::PrimitiveType;
