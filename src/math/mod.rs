//! Mathematical utilities and grid addressing

pub mod aabb;
pub mod grid;

pub use aabb::Aabb;
pub use grid::{Direction, GridPos, ShellOffsets};
