//! Procedural meshes generated on the CPU.
//!
//! Every primitive fits in a unit box centered on the origin. Triangles are
//! counter-clockwise when seen from outside, except the inverted sphere which
//! faces inward for sky domes.

use std::f32::consts::{PI, TAU};
use std::fmt;

use glam::{Vec2, Vec3};

/// Slices around the cylinder axis.
pub const CYLINDER_SLICES: u32 = 12;
/// Meridians of the UV spheres.
pub const SPHERE_SLICES: u32 = 20;
/// Latitude bands of the UV spheres.
pub const SPHERE_STACKS: u32 = 12;
/// Quads per side of the height-field grid.
pub const GRID_QUADS_PER_SIDE: u32 = 64;

const HALF: f32 = 0.5;

/// Built-in primitive shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Cube,
    Cylinder,
    Prism,
    Sphere,
    InvertedSphere,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 5] = [
        PrimitiveType::Cube,
        PrimitiveType::Cylinder,
        PrimitiveType::Prism,
        PrimitiveType::Sphere,
        PrimitiveType::InvertedSphere,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Cube => "cube",
            PrimitiveType::Cylinder => "cylinder",
            PrimitiveType::Prism => "prism",
            PrimitiveType::Sphere => "sphere",
            PrimitiveType::InvertedSphere => "inverted sphere",
        }
    }

    /// Generate the mesh for this primitive.
    pub fn mesh(self) -> MeshData {
        match self {
            PrimitiveType::Cube => MeshData::cube(),
            PrimitiveType::Cylinder => MeshData::cylinder(CYLINDER_SLICES),
            PrimitiveType::Prism => MeshData::prism(),
            PrimitiveType::Sphere => MeshData::sphere(SPHERE_SLICES, SPHERE_STACKS),
            PrimitiveType::InvertedSphere => {
                MeshData::inverted_sphere(SPHERE_SLICES, SPHERE_STACKS)
            }
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Indexed triangle mesh with per-vertex attributes in separate arrays.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        self.positions.push(position);
        self.normals.push(normal);
        self.tex_coords.push(uv);
        (self.positions.len() - 1) as u32
    }

    /// Two triangles over four consecutive vertices starting at `base`.
    fn push_quad(&mut self, base: u32) {
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Unit cube: 24 vertices (4 per face) and 36 indices.
    pub fn cube() -> Self {
        let corners = [
            Vec3::new(-HALF, -HALF, -HALF),
            Vec3::new(HALF, -HALF, -HALF),
            Vec3::new(HALF, -HALF, HALF),
            Vec3::new(-HALF, -HALF, HALF),
            Vec3::new(-HALF, HALF, -HALF),
            Vec3::new(HALF, HALF, -HALF),
            Vec3::new(HALF, HALF, HALF),
            Vec3::new(-HALF, HALF, HALF),
        ];
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        let faces: [([usize; 4], Vec3); 6] = [
            ([0, 1, 2, 3], Vec3::NEG_Y),
            ([7, 6, 5, 4], Vec3::Y),
            ([2, 6, 7, 3], Vec3::Z),
            ([0, 4, 5, 1], Vec3::NEG_Z),
            ([3, 7, 4, 0], Vec3::NEG_X),
            ([6, 2, 1, 5], Vec3::X),
        ];

        let mut mesh = Self::default();
        for (corner_ids, normal) in faces {
            let base = mesh.vertex_count() as u32;
            for (corner, uv) in corner_ids.iter().zip(uvs) {
                mesh.push_vertex(corners[*corner], normal, uv);
            }
            mesh.push_quad(base);
        }
        mesh
    }

    /// Cylinder of radius 0.5 and height 1 with capped ends.
    ///
    /// Ring vertices are shared between the side and the caps, interleaved
    /// bottom/top per slice. `slices` is clamped to at least 3.
    pub fn cylinder(slices: u32) -> Self {
        let slices = slices.max(3);
        let step = TAU / slices as f32;
        let mut mesh = Self::default();

        let bottom_center = mesh.push_vertex(Vec3::new(0.0, -HALF, 0.0), Vec3::NEG_Y, Vec2::splat(0.5));
        let top_center = mesh.push_vertex(Vec3::new(0.0, HALF, 0.0), Vec3::Y, Vec2::splat(0.5));
        let ring_start = mesh.vertex_count() as u32;

        for i in 0..slices {
            let angle = i as f32 * step;
            let (sin, cos) = angle.sin_cos();
            let radial = Vec3::new(cos, 0.0, sin);
            let u = i as f32 / slices as f32;
            mesh.push_vertex(Vec3::new(HALF * cos, -HALF, HALF * sin), radial, Vec2::new(u, 0.0));
            mesh.push_vertex(Vec3::new(HALF * cos, HALF, HALF * sin), radial, Vec2::new(u, 1.0));
        }

        let bottom = |i: u32| ring_start + (i % slices) * 2;
        let top = |i: u32| ring_start + (i % slices) * 2 + 1;

        for i in 0..slices {
            let (b0, b1, t0, t1) = (bottom(i), bottom(i + 1), top(i), top(i + 1));
            mesh.indices.extend_from_slice(&[b0, t1, b1, b0, t0, t1]);
        }
        for i in 0..slices {
            mesh.indices
                .extend_from_slice(&[bottom_center, bottom(i), bottom(i + 1)]);
        }
        for i in 0..slices {
            mesh.indices.extend_from_slice(&[top_center, top(i + 1), top(i)]);
        }
        mesh
    }

    /// Equilateral triangular prism inscribed in radius 0.5, height 1.
    pub fn prism() -> Self {
        let angles = [PI / 2.0, 7.0 * PI / 6.0, 11.0 * PI / 6.0];
        let ring = |y: f32| angles.map(|a| Vec3::new(HALF * a.cos(), y, HALF * a.sin()));
        let bottom = ring(-HALF);
        let top = ring(HALF);
        let cap_uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.5, 1.0)];

        let mut mesh = Self::default();

        let base = mesh.vertex_count() as u32;
        for (position, uv) in bottom.iter().zip(cap_uvs) {
            mesh.push_vertex(*position, Vec3::NEG_Y, uv);
        }
        mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);

        let base = mesh.vertex_count() as u32;
        for (position, uv) in top.iter().zip(cap_uvs) {
            mesh.push_vertex(*position, Vec3::Y, uv);
        }
        mesh.indices.extend_from_slice(&[base, base + 2, base + 1]);

        for edge in 0..3 {
            let next = (edge + 1) % 3;
            let mid = (bottom[edge] + bottom[next]) * 0.5;
            let normal = Vec3::new(mid.x, 0.0, mid.z).normalize_or_zero();

            let base = mesh.vertex_count() as u32;
            mesh.push_vertex(bottom[edge], normal, Vec2::new(0.0, 0.0));
            mesh.push_vertex(top[edge], normal, Vec2::new(0.0, 1.0));
            mesh.push_vertex(top[next], normal, Vec2::new(1.0, 1.0));
            mesh.push_vertex(bottom[next], normal, Vec2::new(1.0, 0.0));
            mesh.push_quad(base);
        }
        mesh
    }

    /// UV sphere of radius 0.5.
    pub fn sphere(slices: u32, stacks: u32) -> Self {
        let mut mesh = Self::sphere_vertices(slices, stacks, false);
        mesh.sphere_indices(slices, stacks, |a, b, c, d| [a, d, b, a, c, d]);
        mesh
    }

    /// UV sphere of radius 0.5 facing inward.
    ///
    /// Same vertices as [`sphere`](Self::sphere) with the winding reversed and
    /// the normals pointing to the center.
    pub fn inverted_sphere(slices: u32, stacks: u32) -> Self {
        let mut mesh = Self::sphere_vertices(slices, stacks, true);
        mesh.sphere_indices(slices, stacks, |a, b, c, d| [a, b, d, a, d, c]);
        mesh
    }

    fn sphere_vertices(slices: u32, stacks: u32, inward: bool) -> Self {
        let mut mesh = Self::default();
        for i in 0..=stacks {
            let v = i as f32 / stacks as f32;
            let phi = (1.0 - v) * PI;
            let (sin_phi, cos_phi) = phi.sin_cos();

            for j in 0..=slices {
                let u = j as f32 / slices as f32;
                let (sin_theta, cos_theta) = (u * TAU).sin_cos();
                let direction = Vec3::new(sin_phi * cos_theta, cos_phi, sin_phi * sin_theta);
                let normal = if inward { -direction } else { direction };
                mesh.push_vertex(direction * HALF, normal, Vec2::new(u, v));
            }
        }
        mesh
    }

    fn sphere_indices(&mut self, slices: u32, stacks: u32, quad: impl Fn(u32, u32, u32, u32) -> [u32; 6]) {
        let row = slices + 1;
        for i in 0..stacks {
            for j in 0..slices {
                let a = i * row + j;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                self.indices.extend_from_slice(&quad(a, b, c, d));
            }
        }
    }

    /// Flat grid in the XZ plane covering [-0.5, 0.5] with normals up.
    ///
    /// Vertices are row-major with z as the row; `uv = (i, j) / quads`.
    pub fn grid(quads_per_side: u32) -> Self {
        let quads = quads_per_side.max(1);
        let per_side = quads + 1;
        let step = 1.0 / quads as f32;

        let mut mesh = Self {
            positions: Vec::with_capacity((per_side * per_side) as usize),
            normals: Vec::with_capacity((per_side * per_side) as usize),
            tex_coords: Vec::with_capacity((per_side * per_side) as usize),
            indices: Vec::with_capacity((quads * quads * 6) as usize),
        };

        for j in 0..per_side {
            let z = -HALF + j as f32 * step;
            for i in 0..per_side {
                let x = -HALF + i as f32 * step;
                mesh.push_vertex(
                    Vec3::new(x, 0.0, z),
                    Vec3::Y,
                    Vec2::new(i as f32 / quads as f32, j as f32 / quads as f32),
                );
            }
        }

        for j in 0..quads {
            for i in 0..quads {
                let bl = j * per_side + i;
                let br = bl + 1;
                let tl = bl + per_side;
                let tr = tl + 1;
                mesh.indices.extend_from_slice(&[bl, tl, br, br, tl, tr]);
            }
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.normals.len(), 24);
        assert_eq!(cube.tex_coords.len(), 24);
    }

    #[test]
    fn test_cube_normals_point_out_of_their_face() {
        let cube = MeshData::cube();
        for (position, normal) in cube.positions.iter().zip(&cube.normals) {
            assert!((position.dot(*normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_cylinder_counts() {
        let cylinder = MeshData::cylinder(12);
        assert_eq!(cylinder.vertex_count(), 2 + 2 * 12);
        assert_eq!(cylinder.index_count(), 12 * 6 + 12 * 3 * 2);

        let clamped = MeshData::cylinder(1);
        assert_eq!(clamped.vertex_count(), 2 + 2 * 3);
    }

    #[test]
    fn test_prism_counts() {
        let prism = MeshData::prism();
        assert_eq!(prism.vertex_count(), 3 + 3 + 3 * 4);
        assert_eq!(prism.index_count(), 3 + 3 + 3 * 6);
    }

    #[test]
    fn test_sphere_vertices_on_radius() {
        let sphere = MeshData::sphere(20, 12);
        assert_eq!(sphere.vertex_count(), 21 * 13);
        assert_eq!(sphere.index_count(), 20 * 12 * 6);
        for position in &sphere.positions {
            assert!((position.length() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_inverted_sphere_reverses_winding() {
        let outward = MeshData::sphere(20, 12);
        let inward = MeshData::inverted_sphere(20, 12);
        assert_eq!(outward.positions, inward.positions);
        assert_eq!(&outward.indices[..3], &[0, 22, 1]);
        assert_eq!(&inward.indices[..3], &[0, 1, 22]);
        assert_eq!(inward.normals[30], -outward.normals[30]);
    }

    #[test]
    fn test_grid_layout() {
        let grid = MeshData::grid(GRID_QUADS_PER_SIDE);
        assert_eq!(grid.vertex_count(), 65 * 65);
        assert_eq!(grid.index_count(), 64 * 64 * 6);
        assert_eq!(grid.positions[0], Vec3::new(-0.5, 0.0, -0.5));
        assert_eq!(grid.positions[65 * 65 - 1], Vec3::new(0.5, 0.0, 0.5));
        assert!(grid.normals.iter().all(|n| *n == Vec3::Y));
        assert_eq!(grid.tex_coords[65], Vec2::new(0.0, 1.0 / 64.0));
        assert_eq!(&grid.indices[..6], &[0, 65, 1, 1, 65, 66]);
    }

    #[test]
    fn test_every_primitive_indexes_in_range() {
        for primitive in PrimitiveType::ALL {
            let mesh = primitive.mesh();
            assert!(!mesh.indices.is_empty(), "{primitive} has no triangles");
            assert_eq!(mesh.index_count() % 3, 0);
            assert!(
                mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()),
                "{primitive} indexes past its vertices"
            );
        }
    }
}
