//! Cached per-chunk state

use std::sync::Arc;

use crate::density::DensityField;
use crate::math::{Aabb, GridPos};
use crate::surface::ChunkMesh;

/// Cached results of one LOD
#[derive(Clone, Debug, Default)]
struct LodData {
    density: Option<Arc<DensityField>>,
    mesh: Option<Arc<ChunkMesh>>,
    /// Chunk generation `mesh` was extracted at
    mesh_generation: u64,
}

/// A chunk of terrain at one grid cell.
///
/// Holds whatever has been computed for each LOD. Terraform edits bump the
/// generation, which marks meshes from earlier generations as stale.
#[derive(Clone, Debug)]
pub struct Chunk {
    pos: GridPos,
    bounds: Aabb,
    lods: Vec<LodData>,
    generation: u64,
    pub(crate) last_access: u64,
}

impl Chunk {
    pub fn new(pos: GridPos, chunk_axis_size: f32, lod_count: usize) -> Self {
        Self {
            pos,
            bounds: Aabb::from_origin_size(pos.to_world(chunk_axis_size), chunk_axis_size),
            lods: vec![LodData::default(); lod_count],
            generation: 0,
            last_access: 0,
        }
    }

    pub fn pos(&self) -> GridPos {
        self.pos
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate every cached mesh. Returns the new generation.
    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    pub fn density(&self, lod: usize) -> Option<&Arc<DensityField>> {
        self.lods.get(lod)?.density.as_ref()
    }

    pub fn density_mut(&mut self, lod: usize) -> Option<&mut Arc<DensityField>> {
        self.lods.get_mut(lod)?.density.as_mut()
    }

    /// Latest mesh at `lod`, possibly stale
    pub fn mesh(&self, lod: usize) -> Option<&Arc<ChunkMesh>> {
        self.lods.get(lod)?.mesh.as_ref()
    }

    /// Whether `lod` holds a mesh of the current generation
    pub fn is_fresh(&self, lod: usize) -> bool {
        self.lods
            .get(lod)
            .is_some_and(|d| d.mesh.is_some() && d.mesh_generation == self.generation)
    }

    /// Store a computed mesh (and the density it came from) at `lod`
    pub fn store(&mut self, lod: usize, density: Option<Arc<DensityField>>, mesh: Arc<ChunkMesh>, generation: u64) {
        if let Some(data) = self.lods.get_mut(lod) {
            if density.is_some() {
                data.density = density;
            }
            data.mesh = Some(mesh);
            data.mesh_generation = generation;
        }
    }

    /// LODs that have a cached density field
    pub fn density_lods(&self) -> impl Iterator<Item = usize> + '_ {
        self.lods
            .iter()
            .enumerate()
            .filter(|(_, d)| d.density.is_some())
            .map(|(lod, _)| lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_bounds_anchor_min_corner() {
        let chunk = Chunk::new(GridPos::new(1, -1, 0), 32.0, 4);
        assert_eq!(chunk.bounds().min, Vec3::new(32.0, -32.0, 0.0));
        assert_eq!(chunk.bounds().max, Vec3::new(64.0, 0.0, 32.0));
    }

    #[test]
    fn test_generation_staleness() {
        let mut chunk = Chunk::new(GridPos::ZERO, 32.0, 2);
        assert!(!chunk.is_fresh(0));
        chunk.store(0, Some(Arc::new(DensityField::filled(8, 0.0))), Arc::new(ChunkMesh::default()), 0);
        assert!(chunk.is_fresh(0));
        assert!(!chunk.is_fresh(1));

        assert_eq!(chunk.bump_generation(), 1);
        assert!(!chunk.is_fresh(0));
        // Stale mesh stays available for display
        assert!(chunk.mesh(0).is_some());
        assert_eq!(chunk.density_lods().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_out_of_range_lod_is_ignored() {
        let mut chunk = Chunk::new(GridPos::ZERO, 32.0, 1);
        chunk.store(3, None, Arc::new(ChunkMesh::default()), 0);
        assert!(chunk.mesh(3).is_none());
        assert!(!chunk.is_fresh(3));
    }
}
