//! Viewers the terrain is streamed around

use glam::Vec3;

use crate::math::grid::cube_offsets;
use crate::math::{GridPos, ShellOffsets};
use crate::streaming::pool::ChunkPool;

pub type ViewerId = usize;

/// Move-resolution state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerState {
    Idle,
    /// Crossed into a new cell; resolved on the next tick
    Moved,
    Resolving,
}

pub struct Viewer {
    id: ViewerId,
    position: Vec3,
    grid: GridPos,
    last_grid: GridPos,
    view_distance: u32,
    lod: usize,
    shells: ShellOffsets,
    state: ViewerState,
    pub(crate) pool: ChunkPool,
}

impl Viewer {
    pub(crate) fn new(id: ViewerId, position: Vec3, view_distance: u32, lod: usize, chunk_axis_size: f32, pool: ChunkPool) -> Self {
        let grid = GridPos::from_world(position, chunk_axis_size);
        Self {
            id,
            position,
            grid,
            last_grid: grid,
            view_distance,
            lod,
            shells: ShellOffsets::new(view_distance),
            state: ViewerState::Idle,
            pool,
        }
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Cell the viewer is in now
    pub fn grid(&self) -> GridPos {
        self.grid
    }

    /// Cell the loaded view cube is centred on
    pub fn last_grid(&self) -> GridPos {
        self.last_grid
    }

    pub fn view_distance(&self) -> u32 {
        self.view_distance
    }

    pub fn lod(&self) -> usize {
        self.lod
    }

    pub(crate) fn set_lod(&mut self, lod: usize) {
        self.lod = lod;
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ViewerState) {
        self.state = state;
    }

    pub fn shells(&self) -> &ShellOffsets {
        &self.shells
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    /// Update the world position. Returns true if the viewer entered a new cell.
    pub(crate) fn set_position(&mut self, position: Vec3, chunk_axis_size: f32) -> bool {
        self.position = position;
        self.grid = GridPos::from_world(position, chunk_axis_size);
        if self.grid != self.last_grid {
            self.state = ViewerState::Moved;
            true
        } else {
            false
        }
    }

    pub(crate) fn finish_move(&mut self, center: GridPos) {
        self.last_grid = center;
        self.state = ViewerState::Idle;
    }

    /// Cells of the view cube around `center`, nearest first
    pub fn cube_around(&self, center: GridPos) -> Vec<GridPos> {
        cube_offsets(self.view_distance)
            .into_iter()
            .map(|o| center + o)
            .collect()
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("id", &self.id)
            .field("grid", &self.grid)
            .field("last_grid", &self.last_grid)
            .field("view_distance", &self.view_distance)
            .field("lod", &self.lod)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::pool::NullRenderable;

    fn viewer(view_distance: u32) -> Viewer {
        let pool = ChunkPool::new(view_distance, 32.0, |_| Box::new(NullRenderable));
        Viewer::new(0, Vec3::new(16.0, 16.0, 16.0), view_distance, 0, 32.0, pool)
    }

    #[test]
    fn test_move_detection() {
        let mut v = viewer(1);
        assert_eq!(v.grid(), GridPos::ZERO);
        assert!(!v.set_position(Vec3::new(31.0, 0.5, 0.5), 32.0));
        assert_eq!(v.state(), ViewerState::Idle);
        assert!(v.set_position(Vec3::new(33.0, 0.5, 0.5), 32.0));
        assert_eq!(v.state(), ViewerState::Moved);
        assert_eq!(v.grid(), GridPos::new(1, 0, 0));
        assert_eq!(v.last_grid(), GridPos::ZERO);

        v.finish_move(v.grid());
        assert_eq!(v.state(), ViewerState::Idle);
        assert_eq!(v.last_grid(), GridPos::new(1, 0, 0));
    }

    #[test]
    fn test_cube_around() {
        let v = viewer(2);
        let cells = v.cube_around(GridPos::new(1, 0, 0));
        assert_eq!(cells.len(), 125);
        assert_eq!(cells[0], GridPos::new(1, 0, 0));
        assert!(cells.contains(&GridPos::new(3, -2, 0)));
        assert!(cells.iter().all(|c| c.chebyshev_distance(GridPos::new(1, 0, 0)) <= 2));
    }
}
