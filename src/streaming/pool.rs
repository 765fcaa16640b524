//! Chunk Pool - fixed set of renderable slots per viewer
//!
//! A viewer owns exactly `(2d+1)³` slots, created once. Slots rotate between
//! grid cells as the viewer moves instead of being created and destroyed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use glam::Vec3;

use crate::core::{Error, Result};
use crate::math::GridPos;
use crate::surface::ChunkMesh;

/// Index of a slot within its pool
pub type SlotId = usize;

/// Engine-side object a slot drives (scene node, collider, ...)
pub trait RenderableHandle: Send {
    fn set_position(&mut self, pos: Vec3);
    fn set_mesh(&mut self, mesh: Option<Arc<ChunkMesh>>);
    fn set_visible(&mut self, visible: bool);
}

/// Renderable that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderable;

impl RenderableHandle for NullRenderable {
    fn set_position(&mut self, _pos: Vec3) {}
    fn set_mesh(&mut self, _mesh: Option<Arc<ChunkMesh>>) {}
    fn set_visible(&mut self, _visible: bool) {}
}

/// Last state pushed to a [`RecordingRenderable`]
#[derive(Clone, Debug, Default)]
pub struct RenderState {
    pub position: Vec3,
    pub mesh: Option<Arc<ChunkMesh>>,
    pub visible: bool,
    pub mesh_updates: u32,
}

/// Renderable that records what it was told; cloneable handle to shared state
#[derive(Clone, Debug, Default)]
pub struct RecordingRenderable {
    state: Arc<Mutex<RenderState>>,
}

impl RecordingRenderable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RenderState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut RenderState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

impl RenderableHandle for RecordingRenderable {
    fn set_position(&mut self, pos: Vec3) {
        self.update(|s| s.position = pos);
    }

    fn set_mesh(&mut self, mesh: Option<Arc<ChunkMesh>>) {
        self.update(|s| {
            s.mesh = mesh;
            s.mesh_updates += 1;
        });
    }

    fn set_visible(&mut self, visible: bool) {
        self.update(|s| s.visible = visible);
    }
}

/// One renderable unit of a pool
pub struct PoolSlot {
    id: SlotId,
    pos: Option<GridPos>,
    mesh: Option<Arc<ChunkMesh>>,
    /// LOD of `mesh`
    lod: usize,
    in_use: bool,
    handle: Box<dyn RenderableHandle>,
}

impl PoolSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn pos(&self) -> Option<GridPos> {
        self.pos
    }

    pub fn mesh(&self) -> Option<&Arc<ChunkMesh>> {
        self.mesh.as_ref()
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }
}

impl std::fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSlot")
            .field("id", &self.id)
            .field("pos", &self.pos)
            .field("lod", &self.lod)
            .field("in_use", &self.in_use)
            .field("has_mesh", &self.mesh.is_some())
            .finish()
    }
}

/// Fixed-size pool of renderable slots
pub struct ChunkPool {
    slots: Vec<PoolSlot>,
    /// In-use slot per grid cell
    by_pos: HashMap<GridPos, SlotId>,
    /// Free slot indices
    free: Vec<SlotId>,
    chunk_axis_size: f32,
}

impl ChunkPool {
    /// Slots needed for a view cube of radius `view_distance`
    pub fn capacity_for(view_distance: u32) -> usize {
        ((2 * view_distance + 1) as usize).pow(3)
    }

    /// Create the pool, building one renderable per slot with `make_handle`
    pub fn new(
        view_distance: u32,
        chunk_axis_size: f32,
        mut make_handle: impl FnMut(SlotId) -> Box<dyn RenderableHandle>,
    ) -> Self {
        let capacity = Self::capacity_for(view_distance);
        let slots = (0..capacity)
            .map(|id| {
                let mut handle = make_handle(id);
                handle.set_visible(false);
                PoolSlot {
                    id,
                    pos: None,
                    mesh: None,
                    lod: 0,
                    in_use: false,
                    handle,
                }
            })
            .collect();
        // Reverse so slot 0 is handed out first
        let free = (0..capacity).rev().collect();

        log::info!("Created chunk pool: {} slots (view distance {})", capacity, view_distance);

        Self {
            slots,
            by_pos: HashMap::with_capacity(capacity),
            free,
            chunk_axis_size,
        }
    }

    /// Take a free slot and place it at `pos`
    pub fn acquire_free_slot(&mut self, pos: GridPos) -> Result<SlotId> {
        if self.by_pos.contains_key(&pos) {
            return Err(Error::InvalidGridPos(pos));
        }
        let id = self.free.pop().ok_or(Error::ResourceExhausted(pos))?;
        let slot = &mut self.slots[id];
        slot.in_use = true;
        slot.handle.set_visible(true);
        self.relocate(id, pos)?;
        Ok(id)
    }

    /// Mark the slot at `pos` unused. It keeps its mesh until reassigned.
    pub fn release_slot(&mut self, pos: GridPos) -> Result<SlotId> {
        let id = self.by_pos.remove(&pos).ok_or(Error::InvalidGridPos(pos))?;
        let slot = &mut self.slots[id];
        slot.in_use = false;
        slot.handle.set_visible(false);
        self.free.push(id);
        Ok(id)
    }

    /// Release every in-use slot
    pub fn release_all(&mut self) {
        let positions: Vec<GridPos> = self.by_pos.keys().copied().collect();
        for pos in positions {
            // Keys come from by_pos, so release cannot fail
            let _ = self.release_slot(pos);
        }
    }

    /// Reassign an in-use slot to `pos` and move its renderable there
    pub fn relocate(&mut self, id: SlotId, pos: GridPos) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or(Error::InvalidGridPos(pos))?;
        if !slot.in_use {
            return Err(Error::InvalidGridPos(pos));
        }
        if let Some(&other) = self.by_pos.get(&pos) {
            if other != id {
                return Err(Error::InvalidGridPos(pos));
            }
        }
        if let Some(old) = slot.pos.take() {
            if self.by_pos.get(&old) == Some(&id) {
                self.by_pos.remove(&old);
            }
        }
        slot.pos = Some(pos);
        slot.handle.set_position(pos.to_world(self.chunk_axis_size));
        self.by_pos.insert(pos, id);
        Ok(())
    }

    /// Clear a slot's mesh
    pub fn remove_mesh(&mut self, id: SlotId) {
        if let Some(slot) = self.slots.get_mut(id) {
            if slot.mesh.take().is_some() {
                slot.handle.set_mesh(None);
            }
        }
    }

    /// Show `mesh` (extracted at `lod`) on a slot
    pub fn update_current_mesh(&mut self, id: SlotId, mesh: Arc<ChunkMesh>, lod: usize) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.lod = lod;
            slot.mesh = Some(Arc::clone(&mesh));
            slot.handle.set_mesh(Some(mesh));
        }
    }

    /// In-use slot showing `pos`
    pub fn slot_at(&self, pos: GridPos) -> Option<SlotId> {
        self.by_pos.get(&pos).copied()
    }

    pub fn slot(&self, id: SlotId) -> Option<&PoolSlot> {
        self.slots.get(id)
    }

    pub fn slots(&self) -> &[PoolSlot] {
        &self.slots
    }

    /// Grid cells of all in-use slots
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.by_pos.keys().copied()
    }

    pub fn in_use_count(&self) -> usize {
        self.by_pos.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(view_distance: u32) -> ChunkPool {
        ChunkPool::new(view_distance, 32.0, |_| Box::new(NullRenderable))
    }

    #[test]
    fn test_capacity() {
        assert_eq!(ChunkPool::capacity_for(0), 1);
        assert_eq!(ChunkPool::capacity_for(1), 27);
        assert_eq!(ChunkPool::capacity_for(2), 125);
        assert_eq!(pool(1).free_count(), 27);
    }

    #[test]
    fn test_acquire_and_release() {
        let mut pool = pool(1);
        let pos = GridPos::new(1, 0, 0);
        let id = pool.acquire_free_slot(pos).unwrap();
        assert_eq!(id, 0);
        assert_eq!(pool.slot_at(pos), Some(id));
        assert_eq!(pool.in_use_count(), 1);

        // Same cell twice is rejected
        assert!(matches!(pool.acquire_free_slot(pos), Err(Error::InvalidGridPos(_))));

        pool.update_current_mesh(id, Arc::new(ChunkMesh::default()), 0);
        assert_eq!(pool.release_slot(pos).unwrap(), id);
        assert_eq!(pool.in_use_count(), 0);
        // Mesh is kept on release
        assert!(pool.slot(id).unwrap().mesh().is_some());
        assert!(matches!(pool.release_slot(pos), Err(Error::InvalidGridPos(_))));
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = pool(0);
        pool.acquire_free_slot(GridPos::ZERO).unwrap();
        assert!(matches!(
            pool.acquire_free_slot(GridPos::new(1, 0, 0)),
            Err(Error::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_conservation() {
        let mut pool = pool(1);
        for x in 0..27 {
            pool.acquire_free_slot(GridPos::new(x, 0, 0)).unwrap();
        }
        for x in 0..9 {
            pool.release_slot(GridPos::new(x, 0, 0)).unwrap();
            pool.acquire_free_slot(GridPos::new(100 + x, 0, 0)).unwrap();
            assert_eq!(pool.in_use_count() + pool.free_count(), 27);
        }
        assert_eq!(pool.in_use_count(), 27);
    }

    #[test]
    fn test_relocate_moves_renderable() {
        let recorder = RecordingRenderable::new();
        let handle = recorder.clone();
        let mut pool = ChunkPool::new(0, 16.0, move |_| Box::new(handle.clone()));
        let id = pool.acquire_free_slot(GridPos::new(1, 2, 3)).unwrap();
        assert_eq!(recorder.snapshot().position, Vec3::new(16.0, 32.0, 48.0));
        assert!(recorder.snapshot().visible);

        pool.relocate(id, GridPos::new(-1, 0, 0)).unwrap();
        assert_eq!(recorder.snapshot().position, Vec3::new(-16.0, 0.0, 0.0));
        assert_eq!(pool.slot_at(GridPos::new(1, 2, 3)), None);
        assert_eq!(pool.slot_at(GridPos::new(-1, 0, 0)), Some(id));

        pool.update_current_mesh(id, Arc::new(ChunkMesh::default()), 2);
        pool.remove_mesh(id);
        let state = recorder.snapshot();
        assert!(state.mesh.is_none());
        assert_eq!(state.mesh_updates, 2);
    }

    #[test]
    fn test_release_all() {
        let mut pool = pool(1);
        for x in 0..5 {
            pool.acquire_free_slot(GridPos::new(x, 0, 0)).unwrap();
        }
        pool.release_all();
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 27);
    }
}
