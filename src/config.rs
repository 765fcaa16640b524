//! Terrain streaming configuration.
//!
//! Everything is serde-(de)serializable so a whole setup can be loaded from a
//! JSON file; missing fields fall back to their defaults.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::surface::color::ColorGradient;

/// Grid and LOD layout shared by every stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// World size of one chunk along each axis.
    pub chunk_axis_size: f32,
    /// Density samples per chunk axis, indexed by LOD.
    pub lod_points: Vec<u32>,
    /// Compute threads per workgroup axis. Every LOD point count is a multiple of it.
    pub threads_per_group: u32,
    /// Max requests drained per stage per tick, and max density requests in flight.
    pub concurrent_computing: usize,
    /// Soft bound on cached chunks. Chunks displayed by a pool slot are never evicted.
    pub cache_capacity: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            chunk_axis_size: 32.0,
            lod_points: vec![8, 16, 24, 32],
            threads_per_group: 8,
            concurrent_computing: 8,
            cache_capacity: 4096,
        }
    }
}

impl MapConfig {
    pub fn lod_count(&self) -> usize {
        self.lod_points.len()
    }

    /// Reject LODs outside the table
    pub fn check_lod(&self, lod: usize) -> Result<()> {
        if lod < self.lod_points.len() {
            Ok(())
        } else {
            Err(Error::OutOfRangeLod {
                lod,
                count: self.lod_points.len(),
            })
        }
    }

    /// Density samples per axis at `lod`
    pub fn points_per_axis(&self, lod: usize) -> Result<u32> {
        self.check_lod(lod)?;
        Ok(self.lod_points[lod])
    }

    /// Workgroups per dispatch axis at `lod`
    pub fn thread_groups(&self, lod: usize) -> Result<u32> {
        Ok(self.points_per_axis(lod)?.div_ceil(self.threads_per_group))
    }

    /// World distance between neighbouring samples at `lod`
    pub fn sample_step(&self, lod: usize) -> Result<f32> {
        let n = self.points_per_axis(lod)?;
        Ok(self.chunk_axis_size / (n - 1) as f32)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.chunk_axis_size > 0.0) {
            return Err(Error::Config(format!(
                "chunk_axis_size must be positive, got {}",
                self.chunk_axis_size
            )));
        }
        if self.lod_points.is_empty() {
            return Err(Error::Config("lod_points must not be empty".into()));
        }
        if self.threads_per_group == 0 {
            return Err(Error::Config("threads_per_group must be nonzero".into()));
        }
        for (lod, &n) in self.lod_points.iter().enumerate() {
            if n < 2 || n % self.threads_per_group != 0 {
                return Err(Error::Config(format!(
                    "LOD {lod}: {n} points per axis must be >= 2 and a multiple of {}",
                    self.threads_per_group
                )));
            }
        }
        if self.concurrent_computing == 0 {
            return Err(Error::Config("concurrent_computing must be nonzero".into()));
        }
        Ok(())
    }
}

/// Parameters of the fractal density function
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub seed: u32,
    pub octaves: u32,
    pub amplitude: f32,
    pub frequency: f32,
    pub lacunarity: f32,
    pub persistence: f32,
    /// Constant added to every sample (raises the ground plane)
    pub ground_offset: f32,
    /// World height per unit of density falloff
    pub scale: f32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 4,
            amplitude: 5.0,
            frequency: 0.02,
            lacunarity: 2.0,
            persistence: 0.5,
            ground_offset: 0.2,
            scale: 8.0,
        }
    }
}

/// Surface extraction parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceParams {
    pub iso_value: f32,
    /// Interpolate vertices along edges (false = edge midpoints)
    pub interpolate: bool,
    /// Height -> RGBA mapping for vertex colors; `None` disables colors
    pub colors: Option<ColorGradient>,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            iso_value: 0.0,
            interpolate: true,
            colors: Some(ColorGradient::terrain()),
        }
    }
}

/// A viewer streamed around at startup
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Radius of the view cube in cells, inclusive
    pub view_distance: u32,
    pub lod: usize,
    pub start: Vec3,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            view_distance: 2,
            lod: 0,
            start: Vec3::ZERO,
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub map: MapConfig,
    pub noise: NoiseParams,
    pub surface: SurfaceParams,
    pub viewers: Vec<ViewerConfig>,
}

impl TerrainConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded terrain config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: TerrainConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        if self.noise.scale == 0.0 {
            return Err(Error::Config("noise.scale must be nonzero".into()));
        }
        for viewer in &self.viewers {
            self.map.check_lod(viewer.lod)?;
        }
        Ok(())
    }
}
