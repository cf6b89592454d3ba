//! GPU copies of the built-in meshes, uploaded once at startup.

use std::collections::HashMap;

use tracing::debug;

use vista_resources::mesh::GRID_QUADS_PER_SIDE;
use vista_resources::{MeshData, PrimitiveType};
use vista_rhi::{Backend, MeshHandle, Vertex};

use crate::draw_list::MeshSelector;
use crate::error::RendererResult;

/// Interleave a mesh's attribute arrays into the vertex layout.
pub fn interleave(mesh: &MeshData) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .zip(&mesh.tex_coords)
        .map(|((position, normal), uv)| Vertex::new(*position, *normal, *uv))
        .collect()
}

#[derive(Debug, Default)]
pub struct MeshCache {
    meshes: HashMap<MeshSelector, MeshHandle>,
}

impl MeshCache {
    /// Generate and upload every primitive and the height-field grid.
    pub fn build<B: Backend>(backend: &mut B) -> RendererResult<Self> {
        let mut cache = Self::default();
        for primitive in PrimitiveType::ALL {
            cache.upload(
                backend,
                MeshSelector::Primitive(primitive),
                primitive.name(),
                &primitive.mesh(),
            )?;
        }
        let grid = MeshData::grid(GRID_QUADS_PER_SIDE);
        cache.upload(backend, MeshSelector::Grid, "grid", &grid)?;
        Ok(cache)
    }

    fn upload<B: Backend>(
        &mut self,
        backend: &mut B,
        selector: MeshSelector,
        label: &str,
        mesh: &MeshData,
    ) -> RendererResult<()> {
        let vertices = interleave(mesh);
        let handle = backend.create_mesh(label, &vertices, &mesh.indices)?;
        debug!(
            "Uploaded mesh '{}' ({} vertices, {} indices)",
            label,
            vertices.len(),
            mesh.index_count()
        );
        self.meshes.insert(selector, handle);
        Ok(())
    }

    pub fn get(&self, selector: MeshSelector) -> Option<MeshHandle> {
        self.meshes.get(&selector).copied()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
