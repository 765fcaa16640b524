//! Voxterra - streaming marching-cubes voxel terrain

pub mod core;
pub mod math;
pub mod config;
pub mod density;
pub mod surface;
pub mod compute;
pub mod pipeline;
pub mod streaming;

pub use config::TerrainConfig;
pub use core::{Error, Result};
pub use streaming::{StreamingController, StreamingStats};
