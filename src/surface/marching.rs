//! CPU marching cubes

use glam::Vec3;
use rayon::prelude::*;

use crate::config::SurfaceParams;
use crate::density::DensityField;
use crate::surface::color::ColorGradient;
use crate::surface::mesh::{ChunkMesh, Triangle};
use crate::surface::tables::{CORNER_OFFSETS, EDGE_CONNECTIONS, EDGE_TABLE, MAX_TRIANGLES_PER_CELL, TRI_TABLE};

/// Upper bound on triangles emitted for a `points³` field
pub fn triangle_capacity(points: u32) -> usize {
    MAX_TRIANGLES_PER_CELL * (points as usize).pow(3)
}

/// Extracts the iso-surface of a density field.
///
/// Cells span `0..points-1` on each axis. Corners below the iso value are
/// air; triangles wind so their face normal points into the air.
#[derive(Clone, Debug)]
pub struct SurfaceExtractor {
    iso_value: f32,
    interpolate: bool,
    colors: Option<ColorGradient>,
}

impl SurfaceExtractor {
    pub fn new(params: &SurfaceParams) -> Self {
        Self {
            iso_value: params.iso_value,
            interpolate: params.interpolate,
            colors: params.colors.clone(),
        }
    }

    /// Emit the raw triangle list, ordered by cell (x fastest, z slowest).
    pub fn triangles(&self, field: &DensityField, step: f32) -> Vec<Triangle> {
        let n = field.points();
        if n < 2 {
            return Vec::new();
        }
        let cells = n - 1;

        let slabs: Vec<Vec<Triangle>> = (0..cells)
            .into_par_iter()
            .map(|z| {
                let mut out = Vec::new();
                for y in 0..cells {
                    for x in 0..cells {
                        self.polygonise(field, [x, y, z], step, &mut out);
                    }
                }
                out
            })
            .collect();

        slabs.concat()
    }

    /// Extract a mesh for a chunk whose minimum corner is at `chunk_origin`.
    pub fn extract(&self, field: &DensityField, step: f32, chunk_origin: Vec3) -> ChunkMesh {
        let triangles = self.triangles(field, step);
        self.build_mesh(&triangles, triangles.len(), chunk_origin)
    }

    /// Turn emitted triangles into a mesh, coloring by world height.
    pub fn build_mesh(&self, triangles: &[Triangle], count: usize, chunk_origin: Vec3) -> ChunkMesh {
        match &self.colors {
            Some(gradient) => {
                let color_at = |local: Vec3| gradient.sample(chunk_origin.y + local.y);
                ChunkMesh::from_triangles(triangles, count, Some(&color_at))
            }
            None => ChunkMesh::from_triangles(triangles, count, None),
        }
    }

    fn polygonise(&self, field: &DensityField, cell: [u32; 3], step: f32, out: &mut Vec<Triangle>) {
        let mut corner_pos = [Vec3::ZERO; 8];
        let mut corner_val = [0.0f32; 8];
        let mut cube_index = 0usize;

        for (i, offset) in CORNER_OFFSETS.iter().enumerate() {
            let (x, y, z) = (cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2]);
            corner_pos[i] = DensityField::local_position(x, y, z, step);
            corner_val[i] = field.get(x, y, z);
            if corner_val[i] < self.iso_value {
                cube_index |= 1 << i;
            }
        }

        let edges = EDGE_TABLE[cube_index];
        if edges == 0 {
            return;
        }

        let mut edge_vertex = [Vec3::ZERO; 12];
        for (e, &[a, b]) in EDGE_CONNECTIONS.iter().enumerate() {
            if edges & (1 << e) != 0 {
                edge_vertex[e] = self.edge_point(corner_pos[a], corner_pos[b], corner_val[a], corner_val[b]);
            }
        }

        for tri in TRI_TABLE[cube_index].chunks_exact(3) {
            if tri[0] < 0 {
                break;
            }
            out.push(Triangle::new(
                edge_vertex[tri[0] as usize],
                edge_vertex[tri[1] as usize],
                edge_vertex[tri[2] as usize],
            ));
        }
    }

    fn edge_point(&self, pa: Vec3, pb: Vec3, va: f32, vb: f32) -> Vec3 {
        if !self.interpolate {
            return (pa + pb) * 0.5;
        }
        let denom = vb - va;
        if denom.abs() < 1e-6 {
            return (pa + pb) * 0.5;
        }
        let t = ((self.iso_value - va) / denom).clamp(0.0, 1.0);
        pa + (pb - pa) * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(interpolate: bool) -> SurfaceExtractor {
        SurfaceExtractor::new(&SurfaceParams {
            iso_value: 0.0,
            interpolate,
            colors: None,
        })
    }

    /// Solid below `height` (in sample units)
    fn flat_ground(points: u32, height: f32) -> DensityField {
        DensityField::from_fn(points, |_, y, _| height - y as f32)
    }

    #[test]
    fn test_uniform_field_is_empty() {
        let ex = extractor(true);
        assert!(ex.extract(&DensityField::filled(8, 1.0), 1.0, Vec3::ZERO).is_empty());
        assert!(ex.extract(&DensityField::filled(8, -1.0), 1.0, Vec3::ZERO).is_empty());
    }

    #[test]
    fn test_flat_ground_normals_point_up() {
        let mesh = extractor(true).extract(&flat_ground(8, 3.5), 2.0, Vec3::ZERO);
        // 7x7 cells, two triangles each
        assert_eq!(mesh.triangle_count(), 7 * 7 * 2);
        for n in &mesh.normals {
            assert!((n.y - 1.0).abs() < 1e-5, "normal {n:?}");
        }
        for v in &mesh.vertices {
            assert!((v.y - 7.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_midpoint_mode() {
        let mesh = extractor(false).extract(&flat_ground(8, 3.2), 1.0, Vec3::ZERO);
        for v in &mesh.vertices {
            assert!((v.y - 3.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_indices_sequential() {
        let mesh = extractor(true).extract(&flat_ground(8, 3.5), 1.0, Vec3::ZERO);
        assert!(mesh.indices.iter().enumerate().all(|(i, &idx)| idx as usize == i));
    }

    #[test]
    fn test_checkerboard_within_capacity() {
        let points = 8;
        let field = DensityField::from_fn(points, |x, y, z| if (x + y + z) % 2 == 0 { 1.0 } else { -1.0 });
        let tris = extractor(true).triangles(&field, 1.0);
        let cells = (points as usize - 1).pow(3);
        assert!(!tris.is_empty());
        assert!(tris.len() <= MAX_TRIANGLES_PER_CELL * cells);
        assert!(tris.len() <= triangle_capacity(points));
    }

    #[test]
    fn test_colors_use_world_height() {
        let ex = SurfaceExtractor::new(&SurfaceParams {
            iso_value: 0.0,
            interpolate: true,
            colors: Some(ColorGradient::new(vec![(0.0, [0.0; 4]), (100.0, [1.0; 4])])),
        });
        let field = flat_ground(8, 3.5);
        let low = ex.extract(&field, 1.0, Vec3::ZERO);
        let high = ex.extract(&field, 1.0, Vec3::new(0.0, 50.0, 0.0));
        let low_c = low.colors.unwrap()[0];
        let high_c = high.colors.unwrap()[0];
        assert!(high_c[0] > low_c[0]);
    }

    #[test]
    fn test_deterministic_order() {
        let field = DensityField::from_fn(16, |x, y, z| {
            ((x as f32 * 0.7).sin() + (z as f32 * 0.4).cos()) * 3.0 + 6.0 - y as f32
        });
        let ex = extractor(true);
        assert_eq!(ex.triangles(&field, 1.0), ex.triangles(&field, 1.0));
    }
}
