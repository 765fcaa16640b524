//! Triangle-soup chunk meshes

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One triangle as emitted by a surface kernel.
///
/// `vec4` per corner keeps the GPU storage layout free of implicit padding;
/// `w` is unused.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub a: [f32; 4],
    pub b: [f32; 4],
    pub c: [f32; 4],
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            a: a.extend(0.0).to_array(),
            b: b.extend(0.0).to_array(),
            c: c.extend(0.0).to_array(),
        }
    }

    pub fn corners(&self) -> [Vec3; 3] {
        [
            Vec3::new(self.a[0], self.a[1], self.a[2]),
            Vec3::new(self.b[0], self.b[1], self.b[2]),
            Vec3::new(self.c[0], self.c[1], self.c[2]),
        ]
    }
}

/// Renderable/collidable surface of one chunk at one LOD.
///
/// Vertices are chunk-local; the pool slot's transform places them in the
/// world. Every triangle owns its three vertices, so `indices` is `0..3k`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// 32-bit so chunks can exceed 65535 vertices
    pub indices: Vec<u32>,
    pub colors: Option<Vec<[f32; 4]>>,
}

impl ChunkMesh {
    /// Build a mesh from the first `count` emitted triangles.
    ///
    /// `color_at` receives each vertex's chunk-local position.
    pub fn from_triangles(
        triangles: &[Triangle],
        count: usize,
        color_at: Option<&dyn Fn(Vec3) -> [f32; 4]>,
    ) -> Self {
        let count = count.min(triangles.len());
        let mut vertices = Vec::with_capacity(count * 3);
        for tri in &triangles[..count] {
            vertices.extend_from_slice(&tri.corners());
        }

        let indices = (0..vertices.len() as u32).collect();
        let colors = color_at.map(|f| vertices.iter().map(|&v| f(v)).collect());
        let mut mesh = Self {
            vertices,
            normals: Vec::new(),
            indices,
            colors,
        };
        mesh.recalculate_normals();
        mesh
    }

    /// Recompute per-vertex normals from the triangle soup.
    ///
    /// Vertices are not shared between triangles so each vertex takes its
    /// face normal. Degenerate faces get a zero normal.
    pub fn recalculate_normals(&mut self) {
        self.normals = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [ia, ib, ic] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (a, b, c) = (self.vertices[ia], self.vertices[ib], self.vertices[ic]);
            let n = (b - a).cross(c - a);
            self.normals[ia] += n;
            self.normals[ib] += n;
            self.normals[ic] += n;
        }
        for n in &mut self.normals {
            *n = n.normalize_or_zero();
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Vec<Triangle> {
        vec![
            Triangle::new(Vec3::ZERO, Vec3::Z, Vec3::X),
            Triangle::new(Vec3::X, Vec3::Z, Vec3::new(1.0, 0.0, 1.0)),
        ]
    }

    #[test]
    fn test_indices_are_sequential() {
        let mesh = ChunkMesh::from_triangles(&quad(), 2, None);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.colors.is_none());
    }

    #[test]
    fn test_count_truncates() {
        let mesh = ChunkMesh::from_triangles(&quad(), 1, None);
        assert_eq!(mesh.triangle_count(), 1);
        let mesh = ChunkMesh::from_triangles(&quad(), 10, None);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn test_normals_follow_winding() {
        let mesh = ChunkMesh::from_triangles(&quad(), 2, None);
        // (Z - 0) x (X - 0) = +Y
        for n in &mesh.normals {
            assert!((*n - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_colors_per_vertex() {
        let color = |p: Vec3| [p.x, 0.0, 0.0, 1.0];
        let mesh = ChunkMesh::from_triangles(&quad(), 2, Some(&color));
        let colors = mesh.colors.unwrap();
        assert_eq!(colors.len(), 6);
        assert_eq!(colors[2], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_triangle_pod_layout() {
        assert_eq!(std::mem::size_of::<Triangle>(), 48);
        let tri = Triangle::new(Vec3::X, Vec3::Y, Vec3::Z);
        let bytes: &[u8] = bytemuck::bytes_of(&tri);
        let back: Triangle = *bytemuck::from_bytes(bytes);
        assert_eq!(back.corners(), [Vec3::X, Vec3::Y, Vec3::Z]);
    }
}
