//! Surface extraction: marching cubes, meshes, vertex colors and terraform edits

pub mod color;
pub mod marching;
pub mod mesh;
pub mod tables;
pub mod terraform;

pub use color::ColorGradient;
pub use marching::{SurfaceExtractor, triangle_capacity};
pub use mesh::{ChunkMesh, Triangle};
pub use terraform::{EditMode, TerraformEdit, apply_edit};
