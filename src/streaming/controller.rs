//! Streaming controller - keeps every viewer's view cube populated
//!
//! Each tick the controller resolves viewers that crossed into a new cell,
//! rotating pool slots from the trailing face of the view cube to the leading
//! one, then applies whatever the compute pipeline finished. Meshes already
//! cached in the [`ChunkStore`] are shown immediately; everything else is
//! requested and shown when it arrives.

use std::sync::Arc;

use glam::Vec3;
use serde::Serialize;

use crate::compute::GpuContext;
use crate::config::{MapConfig, TerrainConfig, ViewerConfig};
use crate::core::{Error, Result};
use crate::density::DensityField;
use crate::math::{Direction, GridPos};
use crate::pipeline::{ComputePipeline, SurfaceResult};
use crate::streaming::chunk::Chunk;
use crate::streaming::pool::{ChunkPool, NullRenderable, RenderableHandle, SlotId};
use crate::streaming::store::ChunkStore;
use crate::streaming::viewer::{Viewer, ViewerId, ViewerState};
use crate::surface::TerraformEdit;

/// Builds the renderable behind each pool slot
pub type RenderableFactory = Box<dyn FnMut(ViewerId, SlotId) -> Box<dyn RenderableHandle> + Send>;

/// Counters for one tick (or, from [`StreamingController::totals`], the
/// whole run). The last five fields are gauges sampled at the end of a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamingStats {
    /// Cells that entered a view cube
    pub loads: u64,
    /// Cells that left a view cube
    pub unloads: u64,
    /// Cells shown straight from a fresh cached mesh
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub requested: u64,
    pub completed: u64,
    pub failed: u64,
    /// Results dropped for a stale generation or an evicted chunk
    pub discarded: u64,
    /// Moves too large to step, resolved by reassigning the whole pool
    pub relocations: u64,
    pub backlog: usize,
    pub density_in_flight: usize,
    pub surface_in_flight: usize,
    pub cached_chunks: usize,
}

impl StreamingStats {
    fn accumulate(&mut self, other: &StreamingStats) {
        self.loads += other.loads;
        self.unloads += other.unloads;
        self.cache_hits += other.cache_hits;
        self.cache_misses += other.cache_misses;
        self.requested += other.requested;
        self.completed += other.completed;
        self.failed += other.failed;
        self.discarded += other.discarded;
        self.relocations += other.relocations;
        self.backlog = other.backlog;
        self.density_in_flight = other.density_in_flight;
        self.surface_in_flight = other.surface_in_flight;
        self.cached_chunks = other.cached_chunks;
    }
}

pub struct StreamingController {
    map: MapConfig,
    store: ChunkStore,
    pipeline: ComputePipeline,
    viewers: Vec<Viewer>,
    make_renderable: RenderableFactory,
    next_viewer: ViewerId,
    /// Counters since the last tick returned
    pending: StreamingStats,
    totals: StreamingStats,
    /// Pipeline failure count already reported
    reported_failures: u64,
}

impl StreamingController {
    pub fn new(map: MapConfig, pipeline: ComputePipeline) -> Result<Self> {
        map.validate()?;
        let store = ChunkStore::new(map.cache_capacity, map.chunk_axis_size, map.lod_count());
        log::info!(
            "Streaming controller: chunk size {}, {} LODs, cache capacity {}",
            map.chunk_axis_size,
            map.lod_count(),
            map.cache_capacity
        );
        Ok(Self {
            map,
            store,
            pipeline,
            viewers: Vec::new(),
            make_renderable: Box::new(|_, _| Box::new(NullRenderable)),
            next_viewer: 0,
            pending: StreamingStats::default(),
            totals: StreamingStats::default(),
            reported_failures: 0,
        })
    }

    /// Controller with the configured viewers already spawned
    pub fn from_config(config: &TerrainConfig, pipeline: ComputePipeline) -> Result<Self> {
        config.validate()?;
        let mut controller = Self::new(config.map.clone(), pipeline)?;
        for viewer in &config.viewers {
            controller.add_viewer(viewer)?;
        }
        Ok(controller)
    }

    pub fn cpu(config: &TerrainConfig) -> Result<Self> {
        Self::from_config(config, ComputePipeline::cpu(config))
    }

    pub fn gpu(config: &TerrainConfig, gpu: Arc<GpuContext>) -> Result<Self> {
        Self::from_config(config, ComputePipeline::gpu(config, gpu)?)
    }

    /// Set the renderable factory for viewers added from now on
    pub fn with_renderables(
        mut self,
        factory: impl FnMut(ViewerId, SlotId) -> Box<dyn RenderableHandle> + Send + 'static,
    ) -> Self {
        self.make_renderable = Box::new(factory);
        self
    }

    /// Spawn a viewer and load its whole view cube.
    pub fn add_viewer(&mut self, config: &ViewerConfig) -> Result<ViewerId> {
        self.map.check_lod(config.lod)?;
        let id = self.next_viewer;
        self.next_viewer += 1;

        let factory = &mut self.make_renderable;
        let pool = ChunkPool::new(config.view_distance, self.map.chunk_axis_size, |slot| factory(id, slot));
        let viewer = Viewer::new(
            id,
            config.start,
            config.view_distance,
            config.lod,
            self.map.chunk_axis_size,
            pool,
        );
        let center = viewer.grid();
        let cells = viewer.cube_around(center);
        self.viewers.push(viewer);

        let index = self.viewers.len() - 1;
        for pos in cells {
            self.load_cell(index, pos)?;
        }
        log::info!(
            "Added viewer {} at {:?} (view distance {}, LOD {})",
            id,
            center,
            config.view_distance,
            config.lod
        );
        Ok(id)
    }

    /// Remove a viewer, unpinning everything it showed.
    pub fn remove_viewer(&mut self, id: ViewerId) -> Result<()> {
        let index = self.viewer_index(id)?;
        let viewer = self.viewers.remove(index);
        for pos in viewer.pool.positions() {
            self.store.unpin(pos);
            self.pending.unloads += 1;
        }
        log::info!("Removed viewer {}", id);
        Ok(())
    }

    /// Move a viewer. Returns true if it entered a new cell; the view cube
    /// follows on the next tick.
    pub fn set_viewer_position(&mut self, id: ViewerId, position: Vec3) -> Result<bool> {
        let index = self.viewer_index(id)?;
        let moved = self.viewers[index].set_position(position, self.map.chunk_axis_size);
        if moved {
            log::trace!("Viewer {} moved to {:?}", id, self.viewers[index].grid());
        }
        Ok(moved)
    }

    /// Switch the LOD a viewer displays. Slots keep their current mesh until
    /// the new LOD is available.
    pub fn set_viewer_lod(&mut self, id: ViewerId, lod: usize) -> Result<()> {
        self.map.check_lod(lod)?;
        let index = self.viewer_index(id)?;
        if self.viewers[index].lod() == lod {
            return Ok(());
        }
        self.viewers[index].set_lod(lod);

        let cells: Vec<(GridPos, SlotId)> = {
            let pool = &self.viewers[index].pool;
            pool.positions()
                .filter_map(|pos| pool.slot_at(pos).map(|slot| (pos, slot)))
                .collect()
        };
        for (pos, slot) in cells {
            self.show_cell(index, slot, pos);
        }
        log::debug!("Viewer {} switched to LOD {}", id, lod);
        Ok(())
    }

    /// Resolve moved viewers, then apply finished pipeline work.
    ///
    /// Returns the counters accumulated since the previous tick.
    pub fn tick(&mut self) -> Result<StreamingStats> {
        for index in 0..self.viewers.len() {
            if self.viewers[index].state() == ViewerState::Moved {
                self.resolve_move(index)?;
            }
        }

        let stale: Vec<(GridPos, usize)> = self
            .pipeline
            .tick()
            .into_iter()
            .filter_map(|result| self.apply_result(result))
            .collect();
        // A newer result from the same tick may already have replaced these
        for (pos, lod) in stale {
            let displayed = self.viewers.iter().any(|v| v.lod() == lod && v.pool.slot_at(pos).is_some());
            let fresh = self.store.get(pos).is_some_and(|c| c.is_fresh(lod));
            if displayed && !fresh {
                self.request_chunk(pos, lod);
            }
        }

        let failed = self.pipeline.stats().failed;
        self.pending.failed += failed - self.reported_failures;
        self.reported_failures = failed;

        let mut stats = std::mem::take(&mut self.pending);
        stats.backlog = self.pipeline.backlog_len();
        stats.density_in_flight = self.pipeline.density_in_flight();
        stats.surface_in_flight = self.pipeline.surface_in_flight();
        stats.cached_chunks = self.store.len();
        self.totals.accumulate(&stats);
        Ok(stats)
    }

    /// Sculpt every cached chunk the brush touches and queue re-meshes.
    ///
    /// Only chunks with a cached density field can be edited. Returns the
    /// number of chunks that changed.
    pub fn terraform(&mut self, edit: &TerraformEdit) -> Result<usize> {
        let touched: Vec<GridPos> = self
            .store
            .iter()
            .filter(|chunk| edit.touches(chunk.bounds()))
            .map(Chunk::pos)
            .collect();

        let mut changed_chunks = 0;
        for pos in touched {
            let origin = pos.to_world(self.map.chunk_axis_size);
            let Some(chunk) = self.store.get_mut(pos) else {
                continue;
            };
            let lods: Vec<usize> = chunk.density_lods().collect();

            let mut changed = 0;
            for &lod in &lods {
                if let Some(density) = chunk.density_mut(lod) {
                    // Copy-on-write: in-flight requests keep the old field
                    let field = Arc::make_mut(density);
                    changed += self.pipeline.surface_stage().edit(field, edit, origin, lod)?;
                }
            }
            if changed == 0 {
                continue;
            }

            let generation = chunk.bump_generation();
            let jobs: Vec<(usize, Arc<DensityField>)> = lods
                .iter()
                .filter_map(|&lod| chunk.density(lod).map(|d| (lod, Arc::clone(d))))
                .collect();
            for (lod, density) in jobs {
                self.pipeline.submit_surface(density, pos, lod, generation)?;
                self.pending.requested += 1;
            }
            changed_chunks += 1;
        }

        log::debug!(
            "Terraform {:?} at {:?} (r={}): {} chunks changed",
            edit.mode,
            edit.hit,
            edit.radius,
            changed_chunks
        );
        Ok(changed_chunks)
    }

    /// Cached chunk containing a world position
    pub fn chunk_at_world(&self, pos: Vec3) -> Option<&Chunk> {
        self.store.chunk_at_world(pos)
    }

    pub fn viewer(&self, id: ViewerId) -> Option<&Viewer> {
        self.viewers.iter().find(|v| v.id() == id)
    }

    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    pub fn map(&self) -> &MapConfig {
        &self.map
    }

    /// Counters summed over every tick so far
    pub fn totals(&self) -> StreamingStats {
        self.totals
    }

    /// No pending moves and nothing left in the pipeline
    pub fn is_settled(&self) -> bool {
        self.pipeline.is_idle() && self.viewers.iter().all(|v| v.state() == ViewerState::Idle)
    }

    fn viewer_index(&self, id: ViewerId) -> Result<usize> {
        self.viewers
            .iter()
            .position(|v| v.id() == id)
            .ok_or(Error::UnknownViewer(id))
    }

    fn resolve_move(&mut self, index: usize) -> Result<()> {
        let viewer = &mut self.viewers[index];
        viewer.set_state(ViewerState::Resolving);
        let (from, to) = (viewer.last_grid(), viewer.grid());
        let delta = to - from;
        let span = delta.x.abs().max(delta.y.abs()).max(delta.z.abs());

        // One-cell moves always step, even for a single-cell view cube
        if span > viewer.view_distance().max(1) as i32 {
            return self.relocate_viewer(index, to);
        }

        // One cell per axis per step until the cube is centred on `to`
        let mut center = from;
        while center != to {
            for dir in Direction::of_delta(to - center) {
                self.step(index, dir, center)?;
                center = center + dir.unit();
            }
        }
        log::debug!("Viewer {} stepped {:?} -> {:?}", self.viewers[index].id(), from, to);
        self.viewers[index].finish_move(to);
        Ok(())
    }

    /// Rotate the trailing face of the cube to the leading face
    fn step(&mut self, index: usize, dir: Direction, old_center: GridPos) -> Result<()> {
        let new_center = old_center + dir.unit();
        let (outgoing, incoming): (Vec<GridPos>, Vec<GridPos>) = {
            let shells = self.viewers[index].shells();
            (
                shells.outgoing(dir, old_center).collect(),
                shells.incoming(dir, new_center).collect(),
            )
        };

        for pos in outgoing {
            self.viewers[index].pool.release_slot(pos)?;
            self.store.unpin(pos);
            self.pending.unloads += 1;
        }
        for pos in incoming {
            self.load_cell(index, pos)?;
        }
        Ok(())
    }

    /// Jump too far to step: drop in-flight work and reassign every slot
    fn relocate_viewer(&mut self, index: usize, to: GridPos) -> Result<()> {
        let dropped = self.pipeline.clear_all();

        let viewer = &mut self.viewers[index];
        let shown: Vec<GridPos> = viewer.pool.positions().collect();
        for pos in &shown {
            self.store.unpin(*pos);
        }
        viewer.pool.release_all();
        self.pending.unloads += shown.len() as u64;

        let cells = viewer.cube_around(to);
        for pos in cells {
            self.load_cell(index, pos)?;
        }
        self.viewers[index].finish_move(to);
        self.pending.relocations += 1;

        // The clear also dropped work other viewers were waiting on
        self.request_missing();
        log::debug!(
            "Viewer {} relocated to {:?}, {} in-flight jobs dropped",
            self.viewers[index].id(),
            to,
            dropped
        );
        Ok(())
    }

    /// Put a slot on `pos` for viewer `index`
    fn load_cell(&mut self, index: usize, pos: GridPos) -> Result<()> {
        let pool = &mut self.viewers[index].pool;
        let slot = pool.acquire_free_slot(pos)?;
        pool.remove_mesh(slot);
        self.store.pin(pos);
        self.pending.loads += 1;
        self.show_cell(index, slot, pos);
        Ok(())
    }

    /// Show whatever is cached for `pos` and request it if not fresh
    fn show_cell(&mut self, index: usize, slot: SlotId, pos: GridPos) {
        let lod = self.viewers[index].lod();
        let (chunk, _) = self.store.get_or_create(pos);
        let mesh = chunk.mesh(lod).cloned();
        let fresh = chunk.is_fresh(lod);

        if let Some(mesh) = mesh {
            self.viewers[index].pool.update_current_mesh(slot, mesh, lod);
        }
        if fresh {
            self.pending.cache_hits += 1;
        } else {
            self.pending.cache_misses += 1;
            self.request_chunk(pos, lod);
        }
    }

    /// Queue work for `(pos, lod)`, reusing a cached density field if any
    fn request_chunk(&mut self, pos: GridPos, lod: usize) {
        if self.pipeline.is_pending(pos, lod) {
            return;
        }
        let Some(chunk) = self.store.get(pos) else {
            return;
        };
        let generation = chunk.generation();
        match chunk.density(lod).cloned() {
            Some(density) => match self.pipeline.submit_surface(density, pos, lod, generation) {
                Ok(()) => self.pending.requested += 1,
                Err(e) => {
                    log::warn!("Surface request for {:?} LOD {} failed: {}", pos, lod, e);
                    self.pending.failed += 1;
                }
            },
            None => {
                if self.pipeline.request(pos, lod, generation) {
                    self.pending.requested += 1;
                }
            }
        }
    }

    /// Request every displayed cell that has no fresh mesh
    fn request_missing(&mut self) {
        let wanted: Vec<(GridPos, usize)> = self
            .viewers
            .iter()
            .flat_map(|v| v.pool.positions().map(move |pos| (pos, v.lod())))
            .collect();
        for (pos, lod) in wanted {
            let fresh = self.store.get(pos).is_some_and(|c| c.is_fresh(lod));
            if !fresh {
                self.request_chunk(pos, lod);
            }
        }
    }

    /// Store a finished mesh and show it. Returns the key of a stale result.
    fn apply_result(&mut self, result: SurfaceResult) -> Option<(GridPos, usize)> {
        let SurfaceResult {
            pos,
            lod,
            generation,
            density,
            mesh,
        } = result;

        let Some(chunk) = self.store.get_mut(pos) else {
            log::trace!("Dropped result for evicted chunk {:?}", pos);
            self.pending.discarded += 1;
            return None;
        };
        if generation != chunk.generation() {
            log::trace!(
                "Dropped stale result for {:?} LOD {} (generation {} < {})",
                pos,
                lod,
                generation,
                chunk.generation()
            );
            self.pending.discarded += 1;
            return Some((pos, lod));
        }

        let mesh = Arc::new(mesh);
        chunk.store(lod, density, Arc::clone(&mesh), generation);
        self.pending.completed += 1;

        for viewer in self.viewers.iter_mut().filter(|v| v.lod() == lod) {
            if let Some(slot) = viewer.pool.slot_at(pos) {
                viewer.pool.update_current_mesh(slot, Arc::clone(&mesh), lod);
            }
        }
        None
    }
}

impl std::fmt::Debug for StreamingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingController")
            .field("viewers", &self.viewers)
            .field("cached_chunks", &self.store.len())
            .field("totals", &self.totals)
            .finish()
    }
}
