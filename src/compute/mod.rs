//! Compute backends for the density and surface stages.
//!
//! Both stages are non-blocking: `submit` returns a [`PendingRequest`] whose
//! completion is observed by polling. The CPU backend runs kernels on the
//! rayon pool, the GPU backend dispatches wgpu compute shaders and maps the
//! results back.

pub mod cpu;
pub mod gpu;
pub mod request;

use std::sync::Arc;

use glam::Vec3;

use crate::config::MapConfig;
use crate::core::{Error, Result};
use crate::density::DensityField;
use crate::math::GridPos;
use crate::surface::{ChunkMesh, TerraformEdit, apply_edit};

pub use cpu::{CpuDensityStage, CpuSurfaceStage};
pub use gpu::{GpuContext, GpuDensityStage, GpuSurfaceStage};
pub use request::{Completed, ComputeTask, PendingRequest, ReadyTask, RequestState};

/// Generates `n³` density fields
pub trait DensityStage: Send {
    fn name(&self) -> &'static str;

    /// Start generating the field of chunk `pos` at `lod`
    fn submit(&mut self, pos: GridPos, lod: usize) -> Result<PendingRequest<DensityField>>;
}

/// Extracts chunk meshes from density fields and applies terraform edits
pub trait SurfaceStage: Send {
    fn name(&self) -> &'static str;

    fn map(&self) -> &MapConfig;

    /// Start extracting the mesh of chunk `pos` from `field`
    fn submit(&mut self, field: Arc<DensityField>, pos: GridPos, lod: usize) -> Result<PendingRequest<ChunkMesh>>;

    /// Apply `edit` to `field` in place. Blocks until done.
    ///
    /// Returns the number of samples changed.
    fn edit(&self, field: &mut DensityField, edit: &TerraformEdit, chunk_origin: Vec3, lod: usize) -> Result<usize> {
        let expected = self.map().points_per_axis(lod)?;
        if field.points() != expected {
            return Err(Error::Compute(format!(
                "terraform on a {}³ field at LOD {lod}, expected {expected}³",
                field.points()
            )));
        }
        let step = self.map().sample_step(lod)?;
        Ok(apply_edit(field, edit, chunk_origin, step))
    }
}
