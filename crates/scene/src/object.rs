//! Scene objects.

use std::fmt;
use std::path::PathBuf;

use vista_resources::PrimitiveType;

use crate::transform::Transform;

/// Shading technique an object is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPipeline {
    /// Standard UV mapping.
    #[default]
    Default,
    /// Triplanar projection, no UVs needed.
    Triplanar,
    /// Vertex displacement from a heightmap.
    Heightfield,
}

impl RenderPipeline {
    pub const ALL: [RenderPipeline; 3] = [
        RenderPipeline::Default,
        RenderPipeline::Triplanar,
        RenderPipeline::Heightfield,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RenderPipeline::Default => "Default",
            RenderPipeline::Triplanar => "Triplanar",
            RenderPipeline::Heightfield => "Heightfield",
        }
    }

    /// Position in [`RenderPipeline::ALL`].
    pub fn index(self) -> usize {
        match self {
            RenderPipeline::Default => 0,
            RenderPipeline::Triplanar => 1,
            RenderPipeline::Heightfield => 2,
        }
    }
}

impl fmt::Display for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an object is, with only the fields that kind needs.
///
/// Texture fields hold the descriptor index returned when the texture was
/// registered with the renderer; `None` draws with the fallback texture.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    Primitive { primitive: PrimitiveType },
    HeightField { heightmap: Option<u32> },
    LoadedModel { path: PathBuf },
    Sky { texture: Option<u32> },
    Water { choppiness: f32 },
}

impl ObjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Primitive { .. } => "Primitive",
            ObjectKind::HeightField { .. } => "Heightfield",
            ObjectKind::LoadedModel { .. } => "Loaded Model",
            ObjectKind::Sky { .. } => "Sky",
            ObjectKind::Water { .. } => "Water",
        }
    }
}

/// One object in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub pipeline: RenderPipeline,
    pub kind: ObjectKind,
}

impl SceneObject {
    /// Create an object at the origin drawn with the default technique.
    pub fn new(name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            pipeline: RenderPipeline::default(),
            kind,
        }
    }

    /// A primitive shape.
    pub fn primitive(name: impl Into<String>, primitive: PrimitiveType) -> Self {
        Self::new(name, ObjectKind::Primitive { primitive })
    }

    /// A height field, drawn with the heightfield technique.
    pub fn height_field(name: impl Into<String>, heightmap: Option<u32>) -> Self {
        Self::new(name, ObjectKind::HeightField { heightmap })
            .with_pipeline(RenderPipeline::Heightfield)
    }

    /// A sky dome.
    pub fn sky(name: impl Into<String>, texture: Option<u32>) -> Self {
        Self::new(name, ObjectKind::Sky { texture })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_pipeline(mut self, pipeline: RenderPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }
}
