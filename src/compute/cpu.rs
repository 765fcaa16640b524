//! CPU backend: kernels run on the rayon pool, results come back over a
//! per-request channel.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::compute::request::{ComputeTask, PendingRequest};
use crate::compute::{DensityStage, SurfaceStage};
use crate::config::{MapConfig, NoiseParams, SurfaceParams};
use crate::core::{Error, Result};
use crate::density::{DensityField, DensityKernel};
use crate::math::GridPos;
use crate::surface::{ChunkMesh, SurfaceExtractor};

/// Receiving end of a job spawned on the rayon pool
pub struct ChannelTask<T> {
    rx: Receiver<Result<T>>,
    result: Option<Result<T>>,
}

impl<T: Send + 'static> ChannelTask<T> {
    /// Run `job` on the rayon pool
    pub fn spawn(job: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel();
        rayon::spawn(move || {
            // Receiver gone means the request was cleared
            let _ = tx.send(job());
        });
        Self { rx, result: None }
    }
}

impl<T: Send> ComputeTask<T> for ChannelTask<T> {
    fn poll(&mut self) -> bool {
        if self.result.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.result = Some(result);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.result = Some(Err(Error::Compute("worker exited without a result".into())));
                true
            }
        }
    }

    fn consume(mut self: Box<Self>) -> Result<T> {
        self.result
            .take()
            .unwrap_or_else(|| Err(Error::Compute("consumed before completion".into())))
    }
}

/// Density fields from [`DensityKernel`] on rayon workers
pub struct CpuDensityStage {
    map: MapConfig,
    kernel: Arc<DensityKernel>,
}

impl CpuDensityStage {
    pub fn new(map: MapConfig, noise: NoiseParams) -> Self {
        log::info!("CPU density stage: {} LODs, seed {}", map.lod_count(), noise.seed);
        Self {
            map,
            kernel: Arc::new(DensityKernel::new(noise)),
        }
    }
}

impl DensityStage for CpuDensityStage {
    fn name(&self) -> &'static str {
        "cpu-density"
    }

    fn submit(&mut self, pos: GridPos, lod: usize) -> Result<PendingRequest<DensityField>> {
        let points = self.map.points_per_axis(lod)?;
        let step = self.map.sample_step(lod)?;
        let kernel = Arc::clone(&self.kernel);
        log::trace!("density submit {:?} lod {}", pos, lod);
        let task = ChannelTask::spawn(move || Ok(kernel.generate(pos, points, step)));
        Ok(PendingRequest::new(pos, lod, Box::new(task)))
    }
}

/// Marching cubes from [`SurfaceExtractor`] on rayon workers
pub struct CpuSurfaceStage {
    map: MapConfig,
    extractor: Arc<SurfaceExtractor>,
}

impl CpuSurfaceStage {
    pub fn new(map: MapConfig, surface: &SurfaceParams) -> Self {
        log::info!(
            "CPU surface stage: iso {}, interpolate {}",
            surface.iso_value,
            surface.interpolate
        );
        Self {
            map,
            extractor: Arc::new(SurfaceExtractor::new(surface)),
        }
    }
}

impl SurfaceStage for CpuSurfaceStage {
    fn name(&self) -> &'static str {
        "cpu-surface"
    }

    fn map(&self) -> &MapConfig {
        &self.map
    }

    fn submit(&mut self, field: Arc<DensityField>, pos: GridPos, lod: usize) -> Result<PendingRequest<ChunkMesh>> {
        let points = self.map.points_per_axis(lod)?;
        if field.points() != points {
            return Err(Error::Compute(format!(
                "surface submit for {:?}: field has {} points per axis, LOD {lod} needs {points}",
                pos,
                field.points()
            )));
        }
        let step = self.map.sample_step(lod)?;
        let origin = pos.to_world(self.map.chunk_axis_size);
        let extractor = Arc::clone(&self.extractor);
        let input = Arc::clone(&field);
        log::trace!("surface submit {:?} lod {}", pos, lod);
        let task = ChannelTask::spawn(move || Ok(extractor.extract(&input, step, origin)));
        Ok(PendingRequest::new(pos, lod, Box::new(task)).with_input(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::TerraformEdit;
    use glam::Vec3;

    /// Spin on poll; rayon jobs finish quickly
    fn wait<T>(req: &mut PendingRequest<T>) {
        let start = std::time::Instant::now();
        while !req.poll() {
            assert!(start.elapsed().as_secs() < 30, "request never completed");
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_density_then_surface() {
        let map = MapConfig::default();
        let mut density = CpuDensityStage::new(map.clone(), NoiseParams::default());
        let mut surface = CpuSurfaceStage::new(map.clone(), &SurfaceParams::default());

        let mut req = density.submit(GridPos::new(0, 0, 0), 0).unwrap();
        wait(&mut req);
        let field = Arc::new(req.consume().unwrap().result.unwrap());
        assert_eq!(field.points(), 8);
        assert_eq!(field.samples().len(), 512);

        let mut req = surface.submit(field.clone(), GridPos::ZERO, 0).unwrap();
        wait(&mut req);
        let done = req.consume().unwrap();
        assert!(Arc::ptr_eq(done.input.as_ref().unwrap(), &field));
        let mesh = done.result.unwrap();
        assert_eq!(mesh.indices.len(), mesh.vertices.len());
    }

    #[test]
    fn test_rejects_bad_lod() {
        let mut density = CpuDensityStage::new(MapConfig::default(), NoiseParams::default());
        assert!(matches!(density.submit(GridPos::ZERO, 7), Err(Error::OutOfRangeLod { .. })));
    }

    #[test]
    fn test_surface_rejects_mismatched_field() {
        let mut surface = CpuSurfaceStage::new(MapConfig::default(), &SurfaceParams::default());
        let field = Arc::new(DensityField::filled(16, 1.0));
        assert!(matches!(surface.submit(field, GridPos::ZERO, 0), Err(Error::Compute(_))));
    }

    #[test]
    fn test_edit_checks_field_size() {
        let surface = CpuSurfaceStage::new(MapConfig::default(), &SurfaceParams::default());
        let edit = TerraformEdit::construct(Vec3::ZERO, 4.0, 1.0);
        let mut wrong = DensityField::filled(16, 0.0);
        assert!(surface.edit(&mut wrong, &edit, Vec3::ZERO, 0).is_err());
        let mut right = DensityField::filled(8, 0.0);
        assert!(surface.edit(&mut right, &edit, Vec3::ZERO, 0).unwrap() > 0);
    }

    #[test]
    fn test_dropped_task_is_harmless() {
        let mut density = CpuDensityStage::new(MapConfig::default(), NoiseParams::default());
        for i in 0..16 {
            drop(density.submit(GridPos::new(i, 0, 0), 3).unwrap());
        }
    }
}
