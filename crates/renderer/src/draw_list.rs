//! Flattening a scene into per-frame draw items.

use tracing::warn;

use vista_scene::{ObjectKind, PrimitiveType, RenderPipeline, Scene, SceneObject, Transform};

use crate::descriptor::{DescriptorLayout, TextureClass};

/// Which cached mesh a draw uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshSelector {
    Primitive(PrimitiveType),
    /// Flat unit grid shared by height fields and water.
    Grid,
}

/// Object kind without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKindTag {
    Primitive,
    HeightField,
    LoadedModel,
    Sky,
    Water,
}

impl From<&ObjectKind> for ObjectKindTag {
    fn from(kind: &ObjectKind) -> Self {
        match kind {
            ObjectKind::Primitive { .. } => ObjectKindTag::Primitive,
            ObjectKind::HeightField { .. } => ObjectKindTag::HeightField,
            ObjectKind::LoadedModel { .. } => ObjectKindTag::LoadedModel,
            ObjectKind::Sky { .. } => ObjectKindTag::Sky,
            ObjectKind::Water { .. } => ObjectKindTag::Water,
        }
    }
}

/// One draw, rebuilt every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub transform: Transform,
    pub mesh: MeshSelector,
    pub pipeline: RenderPipeline,
    pub kind: ObjectKindTag,
    /// Descriptor heap index of the texture to sample.
    pub texture_index: u32,
}

/// Reusable draw-item storage.
#[derive(Debug)]
pub struct DrawListAssembler {
    items: Vec<DrawItem>,
    layout: DescriptorLayout,
}

impl DrawListAssembler {
    pub fn new(layout: DescriptorLayout) -> Self {
        Self {
            items: Vec::new(),
            layout,
        }
    }

    /// One item per scene object, in scene order.
    pub fn assemble(&mut self, scene: &Scene) -> &[DrawItem] {
        self.items.clear();
        for object in scene.iter() {
            let item = self.item(object);
            self.items.push(item);
        }
        &self.items
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    fn item(&self, object: &SceneObject) -> DrawItem {
        let mesh = match &object.kind {
            ObjectKind::Primitive { primitive } => MeshSelector::Primitive(*primitive),
            ObjectKind::HeightField { .. } | ObjectKind::Water { .. } => MeshSelector::Grid,
            ObjectKind::Sky { .. } => MeshSelector::Primitive(PrimitiveType::InvertedSphere),
            // Models are drawn as a cube proxy.
            ObjectKind::LoadedModel { .. } => MeshSelector::Primitive(PrimitiveType::Cube),
        };

        let texture_index = match &object.kind {
            ObjectKind::HeightField { heightmap } => {
                self.texture(object, *heightmap, TextureClass::Heightmap)
            }
            ObjectKind::Sky { texture } => self.texture(object, *texture, TextureClass::Sky),
            _ => self.layout.texture_srv,
        };

        DrawItem {
            transform: object.transform,
            mesh,
            pipeline: object.pipeline,
            kind: ObjectKindTag::from(&object.kind),
            texture_index,
        }
    }

    fn texture(&self, object: &SceneObject, index: Option<u32>, class: TextureClass) -> u32 {
        match index {
            Some(index) if self.layout.range(class).contains(&index) => index,
            Some(index) => {
                warn!(
                    "'{}' uses descriptor {} outside the {} range, drawing with the fallback",
                    object.name, index, class
                );
                self.layout.texture_srv
            }
            None => self.layout.texture_srv,
        }
    }
}
