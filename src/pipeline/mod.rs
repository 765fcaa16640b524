//! Two-stage asynchronous compute pipeline: density, then surface.
//!
//! Requests flow `backlog -> density queue -> surface queue -> result`. Each
//! tick drains at most `max_concurrent` completed heads per stage, chaining
//! finished density fields straight into surface requests.

pub mod queue;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::compute::{
    CpuDensityStage, CpuSurfaceStage, DensityStage, GpuContext, GpuDensityStage, GpuSurfaceStage, SurfaceStage,
};
use crate::config::TerrainConfig;
use crate::core::Result;
use crate::density::DensityField;
use crate::math::GridPos;
use crate::surface::ChunkMesh;

pub use queue::StageQueue;

type Key = (GridPos, usize);

/// A density job waiting for a free in-flight slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Job {
    pos: GridPos,
    lod: usize,
    generation: u64,
}

/// A finished chunk mesh ready to be applied
#[derive(Debug)]
pub struct SurfaceResult {
    pub pos: GridPos,
    pub lod: usize,
    pub generation: u64,
    /// Field the mesh was extracted from
    pub density: Option<Arc<DensityField>>,
    pub mesh: ChunkMesh,
}

/// Cumulative pipeline counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub density_submitted: u64,
    pub surface_submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub cleared: u64,
}

pub struct ComputePipeline {
    density_stage: Box<dyn DensityStage>,
    surface_stage: Box<dyn SurfaceStage>,
    backlog: VecDeque<Job>,
    density: StageQueue<DensityField>,
    surface: StageQueue<ChunkMesh>,
    /// Outstanding work per key across backlog and both stages
    in_flight: HashMap<Key, usize>,
    max_concurrent: usize,
    stats: PipelineStats,
}

impl ComputePipeline {
    pub fn new(density_stage: Box<dyn DensityStage>, surface_stage: Box<dyn SurfaceStage>, max_concurrent: usize) -> Self {
        log::info!(
            "Compute pipeline: {} -> {}, {} concurrent",
            density_stage.name(),
            surface_stage.name(),
            max_concurrent
        );
        Self {
            density_stage,
            surface_stage,
            backlog: VecDeque::new(),
            density: StageQueue::new("density"),
            surface: StageQueue::new("surface"),
            in_flight: HashMap::new(),
            max_concurrent: max_concurrent.max(1),
            stats: PipelineStats::default(),
        }
    }

    /// Pipeline running both stages on the rayon pool
    pub fn cpu(config: &TerrainConfig) -> Self {
        let density = CpuDensityStage::new(config.map.clone(), config.noise.clone());
        let surface = CpuSurfaceStage::new(config.map.clone(), &config.surface);
        Self::new(Box::new(density), Box::new(surface), config.map.concurrent_computing)
    }

    /// Pipeline running both stages as wgpu compute passes
    pub fn gpu(config: &TerrainConfig, gpu: Arc<GpuContext>) -> Result<Self> {
        let density = GpuDensityStage::new(Arc::clone(&gpu), config.map.clone(), config.noise.clone())?;
        let surface = GpuSurfaceStage::new(gpu, config.map.clone(), &config.surface)?;
        Ok(Self::new(Box::new(density), Box::new(surface), config.map.concurrent_computing))
    }

    /// Queue a density + surface computation for `(pos, lod)`.
    ///
    /// Returns false when the same key is already queued or in flight.
    pub fn request(&mut self, pos: GridPos, lod: usize, generation: u64) -> bool {
        if self.is_pending(pos, lod) {
            self.stats.duplicates += 1;
            return false;
        }
        *self.in_flight.entry((pos, lod)).or_default() += 1;
        self.backlog.push_back(Job { pos, lod, generation });
        log::trace!("Queued {:?} LOD {} (generation {})", pos, lod, generation);
        true
    }

    /// Re-extract the surface of an already generated field, skipping the
    /// density stage. Not deduplicated: a newer generation supersedes
    /// whatever is in flight.
    pub fn submit_surface(&mut self, field: Arc<DensityField>, pos: GridPos, lod: usize, generation: u64) -> Result<()> {
        let request = self.surface_stage.submit(field, pos, lod)?;
        *self.in_flight.entry((pos, lod)).or_default() += 1;
        self.surface.push(request.with_generation(generation));
        self.stats.surface_submitted += 1;
        Ok(())
    }

    pub fn is_pending(&self, pos: GridPos, lod: usize) -> bool {
        self.in_flight.contains_key(&(pos, lod))
    }

    /// Advance both stages. Returns the surfaces completed this tick, in
    /// submission order.
    pub fn tick(&mut self) -> Vec<SurfaceResult> {
        self.refill();

        for _ in 0..self.max_concurrent {
            let Some(done) = self.density.drain_head() else {
                break;
            };
            match done.result {
                Ok(field) => {
                    let field = Arc::new(field);
                    match self.surface_stage.submit(field, done.pos, done.lod) {
                        Ok(request) => {
                            self.surface.push(request.with_generation(done.generation));
                            self.stats.surface_submitted += 1;
                        }
                        Err(e) => self.fail(done.pos, done.lod, "surface submit", &e),
                    }
                }
                Err(e) => self.fail(done.pos, done.lod, "density", &e),
            }
        }

        let mut results = Vec::new();
        for _ in 0..self.max_concurrent {
            let Some(done) = self.surface.drain_head() else {
                break;
            };
            match done.result {
                Ok(mesh) => {
                    self.release(done.pos, done.lod);
                    self.stats.completed += 1;
                    results.push(SurfaceResult {
                        pos: done.pos,
                        lod: done.lod,
                        generation: done.generation,
                        density: done.input,
                        mesh,
                    });
                }
                Err(e) => self.fail(done.pos, done.lod, "surface", &e),
            }
        }

        self.refill();
        results
    }

    /// Drop the backlog and every in-flight request of both stages.
    ///
    /// Returns how many jobs were discarded.
    pub fn clear_all(&mut self) -> usize {
        let dropped = self.backlog.len() + self.density.clear_all() + self.surface.clear_all();
        self.backlog.clear();
        self.in_flight.clear();
        self.stats.cleared += dropped as u64;
        if dropped > 0 {
            log::debug!("Pipeline cleared: {} jobs discarded", dropped);
        }
        dropped
    }

    pub fn surface_stage(&self) -> &dyn SurfaceStage {
        self.surface_stage.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn density_in_flight(&self) -> usize {
        self.density.len()
    }

    pub fn surface_in_flight(&self) -> usize {
        self.surface.len()
    }

    pub fn is_idle(&self) -> bool {
        self.backlog.is_empty() && self.density.is_empty() && self.surface.is_empty()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Move backlog jobs into the density stage while under the in-flight cap
    fn refill(&mut self) {
        while self.density.len() < self.max_concurrent {
            let Some(job) = self.backlog.pop_front() else {
                break;
            };
            match self.density_stage.submit(job.pos, job.lod) {
                Ok(request) => {
                    self.density.push(request.with_generation(job.generation));
                    self.stats.density_submitted += 1;
                }
                Err(e) => self.fail(job.pos, job.lod, "density submit", &e),
            }
        }
    }

    fn fail(&mut self, pos: GridPos, lod: usize, what: &str, error: &crate::core::Error) {
        log::warn!("{} request for {:?} lod {} failed: {}", what, pos, lod, error);
        self.stats.failed += 1;
        self.release(pos, lod);
    }

    fn release(&mut self, pos: GridPos, lod: usize) {
        if let Some(count) = self.in_flight.get_mut(&(pos, lod)) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&(pos, lod));
            }
        }
    }
}
