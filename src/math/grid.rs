//! Grid addressing: world <-> grid conversions and directional shells
//!
//! Chunk `g` covers the half-open world box `[g * size, (g + 1) * size)` on
//! every axis, so floor division tiles space without gaps or overlaps.

use std::ops::{Add, Mul, Sub};

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridPos {
    pub const ZERO: GridPos = GridPos { x: 0, y: 0, z: 0 };

    /// Create a new grid position
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert a world position to the grid cell containing it
    pub fn from_world(pos: Vec3, chunk_axis_size: f32) -> Self {
        Self {
            x: (pos.x / chunk_axis_size).floor() as i32,
            y: (pos.y / chunk_axis_size).floor() as i32,
            z: (pos.z / chunk_axis_size).floor() as i32,
        }
    }

    /// World-space origin (minimum corner) of this cell.
    ///
    /// Exact while `|g * size|` stays below 2^24, which makes
    /// `from_world(to_world(g)) == g`.
    pub fn to_world(self, chunk_axis_size: f32) -> Vec3 {
        Vec3::new(
            self.x as f32 * chunk_axis_size,
            self.y as f32 * chunk_axis_size,
            self.z as f32 * chunk_axis_size,
        )
    }

    /// Largest per-axis distance (cube radius) between two cells
    pub fn chebyshev_distance(self, other: GridPos) -> i32 {
        let d = self - other;
        d.x.abs().max(d.y.abs()).max(d.z.abs())
    }
}

impl Add for GridPos {
    type Output = GridPos;

    fn add(self, rhs: GridPos) -> GridPos {
        GridPos::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for GridPos {
    type Output = GridPos;

    fn sub(self, rhs: GridPos) -> GridPos {
        GridPos::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for GridPos {
    type Output = GridPos;

    fn mul(self, rhs: i32) -> GridPos {
        GridPos::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// One of the six axis directions a viewer can cross a cell boundary in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Right,
    Left,
    Up,
    Down,
    Forward,
    Back,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Right,
        Direction::Left,
        Direction::Up,
        Direction::Down,
        Direction::Forward,
        Direction::Back,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Forward => Direction::Back,
            Direction::Back => Direction::Forward,
        }
    }

    /// Axis index (0 = x, 1 = y, 2 = z)
    pub fn axis(self) -> usize {
        match self {
            Direction::Right | Direction::Left => 0,
            Direction::Up | Direction::Down => 1,
            Direction::Forward | Direction::Back => 2,
        }
    }

    /// +1 or -1 along the axis
    pub fn sign(self) -> i32 {
        match self {
            Direction::Right | Direction::Up | Direction::Forward => 1,
            Direction::Left | Direction::Down | Direction::Back => -1,
        }
    }

    /// One-cell step in this direction
    pub fn unit(self) -> GridPos {
        let mut v = [0; 3];
        v[self.axis()] = self.sign();
        GridPos::new(v[0], v[1], v[2])
    }

    /// Direction along `axis` for a signed delta, `None` when the delta is zero
    pub fn from_axis_delta(axis: usize, delta: i32) -> Option<Direction> {
        let dir = match (axis, delta.signum()) {
            (0, 1) => Direction::Right,
            (0, -1) => Direction::Left,
            (1, 1) => Direction::Up,
            (1, -1) => Direction::Down,
            (2, 1) => Direction::Forward,
            (2, -1) => Direction::Back,
            _ => return None,
        };
        Some(dir)
    }

    /// Up to three directions of movement, one per axis with a nonzero delta
    pub fn of_delta(delta: GridPos) -> Vec<Direction> {
        [delta.x, delta.y, delta.z]
            .iter()
            .enumerate()
            .filter_map(|(axis, &d)| Direction::from_axis_delta(axis, d))
            .collect()
    }
}

/// Per-direction planar offset tables for a fixed view distance.
///
/// For direction `k` the table holds the `(2d+1)²` offsets lying on the
/// face of the view cube at depth `d` along `k`'s axis. Built once, read-only
/// afterwards.
#[derive(Clone, Debug)]
pub struct ShellOffsets {
    view_distance: i32,
    shells: [Vec<GridPos>; 6],
}

impl ShellOffsets {
    pub fn new(view_distance: u32) -> Self {
        let d = view_distance as i32;
        let shells = Direction::ALL.map(|dir| {
            let side = (2 * d + 1) as usize;
            let mut offsets = Vec::with_capacity(side * side);
            for i in -d..=d {
                for j in -d..=d {
                    let mut v = [0; 3];
                    v[dir.axis()] = dir.sign() * d;
                    v[(dir.axis() + 1) % 3] = i;
                    v[(dir.axis() + 2) % 3] = j;
                    offsets.push(GridPos::new(v[0], v[1], v[2]));
                }
            }
            offsets
        });

        Self {
            view_distance: d,
            shells,
        }
    }

    pub fn view_distance(&self) -> u32 {
        self.view_distance as u32
    }

    /// Offsets of the face of the view cube in `direction`
    pub fn shell(&self, direction: Direction) -> &[GridPos] {
        &self.shells[direction.index()]
    }

    /// Cells entering the view cube when moving one step in `direction` to `new_center`
    pub fn incoming(&self, direction: Direction, new_center: GridPos) -> impl Iterator<Item = GridPos> + '_ {
        self.shell(direction).iter().map(move |&o| new_center + o)
    }

    /// Cells leaving the view cube when moving one step in `direction` away from `old_center`
    pub fn outgoing(&self, direction: Direction, old_center: GridPos) -> impl Iterator<Item = GridPos> + '_ {
        self.shell(direction.opposite()).iter().map(move |&o| old_center + o)
    }
}

/// Every offset of a view cube of radius `view_distance`, nearest rings first
pub fn cube_offsets(view_distance: u32) -> Vec<GridPos> {
    let d = view_distance as i32;
    let mut offsets = Vec::with_capacity(((2 * d + 1) as usize).pow(3));
    for z in -d..=d {
        for y in -d..=d {
            for x in -d..=d {
                offsets.push(GridPos::new(x, y, z));
            }
        }
    }
    offsets.sort_by_key(|o| o.chebyshev_distance(GridPos::ZERO));
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_from_world_floor() {
        let size = 32.0;
        assert_eq!(GridPos::from_world(Vec3::new(10.0, 0.0, 31.9), size), GridPos::new(0, 0, 0));
        assert_eq!(GridPos::from_world(Vec3::new(32.0, 64.0, 0.0), size), GridPos::new(1, 2, 0));
        // Negative coordinates floor away from zero
        assert_eq!(GridPos::from_world(Vec3::new(-0.5, -32.0, -32.1), size), GridPos::new(-1, -1, -2));
    }

    #[test]
    fn test_round_trip() {
        for size in [1.0, 32.0, 1000.0] {
            for g in (-2000..2000).step_by(7) {
                let pos = GridPos::new(g, -g, g / 3);
                assert_eq!(GridPos::from_world(pos.to_world(size), size), pos);
            }
        }
    }

    #[test]
    fn test_adjacent_cells_tile() {
        let size = 16.0;
        // Points just either side of a boundary land in neighbouring cells
        let a = GridPos::from_world(Vec3::new(15.999, 0.0, 0.0), size);
        let b = GridPos::from_world(Vec3::new(16.0, 0.0, 0.0), size);
        assert_eq!(b - a, GridPos::new(1, 0, 0));
    }

    #[test]
    fn test_direction_opposite_and_unit() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
            assert_eq!(dir.unit() + dir.opposite().unit(), GridPos::ZERO);
            assert_eq!(dir.unit().chebyshev_distance(GridPos::ZERO), 1);
        }
    }

    #[test]
    fn test_of_delta() {
        assert_eq!(Direction::of_delta(GridPos::new(1, 0, 0)), vec![Direction::Right]);
        assert_eq!(
            Direction::of_delta(GridPos::new(-1, 1, -1)),
            vec![Direction::Left, Direction::Up, Direction::Back]
        );
        assert!(Direction::of_delta(GridPos::ZERO).is_empty());
    }

    #[test]
    fn test_shell_sizes_match() {
        for v in 0..5u32 {
            let shells = ShellOffsets::new(v);
            let expected = ((2 * v + 1) * (2 * v + 1)) as usize;
            for dir in Direction::ALL {
                assert_eq!(shells.shell(dir).len(), expected);
                assert_eq!(shells.shell(dir.opposite()).len(), expected);
                let unique: HashSet<_> = shells.shell(dir).iter().collect();
                assert_eq!(unique.len(), expected);
            }
        }
    }

    #[test]
    fn test_shell_lies_on_face() {
        let v = 3;
        let shells = ShellOffsets::new(v);
        for dir in Direction::ALL {
            for o in shells.shell(dir) {
                let c = [o.x, o.y, o.z];
                assert_eq!(c[dir.axis()], dir.sign() * v as i32);
                for (axis, value) in c.iter().enumerate() {
                    assert!(value.abs() <= v as i32, "axis {axis} out of cube");
                }
            }
            // Disjoint from the opposite face
            let this: HashSet<_> = shells.shell(dir).iter().collect();
            assert!(shells.shell(dir.opposite()).iter().all(|o| !this.contains(o)));
        }
    }

    #[test]
    fn test_move_shells_partition_cube() {
        // Moving one step right: old cube minus outgoing == new cube minus incoming
        let v = 2;
        let shells = ShellOffsets::new(v);
        let old = GridPos::new(4, -1, 7);
        for dir in Direction::ALL {
            let new = old + dir.unit();
            let old_cube: HashSet<_> = cube_offsets(v).into_iter().map(|o| old + o).collect();
            let new_cube: HashSet<_> = cube_offsets(v).into_iter().map(|o| new + o).collect();
            let outgoing: HashSet<_> = shells.outgoing(dir, old).collect();
            let incoming: HashSet<_> = shells.incoming(dir, new).collect();

            assert_eq!(outgoing.len(), incoming.len());
            let expected_out: HashSet<_> = old_cube.difference(&new_cube).copied().collect();
            let expected_in: HashSet<_> = new_cube.difference(&old_cube).copied().collect();
            assert_eq!(outgoing, expected_out);
            assert_eq!(incoming, expected_in);
        }
    }

    #[test]
    fn test_cube_offsets_nearest_first() {
        let offsets = cube_offsets(1);
        assert_eq!(offsets.len(), 27);
        assert_eq!(offsets[0], GridPos::ZERO);
    }
}
