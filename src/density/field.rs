//! Flat `n³` scalar density grid

use glam::Vec3;

use crate::core::{Error, Result};

/// Density samples of one chunk at one LOD.
///
/// Layout is `x + n * (y + n * z)`, matching the kernel output buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityField {
    points: u32,
    samples: Vec<f32>,
}

impl DensityField {
    /// Wrap kernel output, checking it holds exactly `points³` samples
    pub fn new(points: u32, samples: Vec<f32>) -> Result<Self> {
        let expected = (points as usize).pow(3);
        if samples.len() != expected {
            return Err(Error::Compute(format!(
                "density readback has {} samples, expected {expected}",
                samples.len()
            )));
        }
        Ok(Self { points, samples })
    }

    /// Wrap a buffer already known to hold `points³` samples
    pub(crate) fn from_raw(points: u32, samples: Vec<f32>) -> Self {
        debug_assert_eq!(samples.len(), (points as usize).pow(3));
        Self { points, samples }
    }

    /// Field with every sample set to `value`
    pub fn filled(points: u32, value: f32) -> Self {
        Self {
            points,
            samples: vec![value; (points as usize).pow(3)],
        }
    }

    /// Build a field by evaluating `f(x, y, z)` at every sample index
    pub fn from_fn(points: u32, mut f: impl FnMut(u32, u32, u32) -> f32) -> Self {
        let mut samples = Vec::with_capacity((points as usize).pow(3));
        for z in 0..points {
            for y in 0..points {
                for x in 0..points {
                    samples.push(f(x, y, z));
                }
            }
        }
        Self { points, samples }
    }

    /// Samples per axis
    pub fn points(&self) -> u32 {
        self.points
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        let n = self.points as usize;
        x as usize + n * (y as usize + n * z as usize)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32) -> f32 {
        self.samples[self.index(x, y, z)]
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Chunk-local position of a sample for the given sample spacing
    #[inline]
    pub fn local_position(x: u32, y: u32, z: u32, step: f32) -> Vec3 {
        Vec3::new(x as f32, y as f32, z as f32) * step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_layout() {
        let field = DensityField::filled(4, 0.0);
        assert_eq!(field.index(0, 0, 0), 0);
        assert_eq!(field.index(1, 0, 0), 1);
        assert_eq!(field.index(0, 1, 0), 4);
        assert_eq!(field.index(0, 0, 1), 16);
        assert_eq!(field.index(3, 3, 3), 63);
    }

    #[test]
    fn test_from_fn_matches_index() {
        let field = DensityField::from_fn(3, |x, y, z| (x * 100 + y * 10 + z) as f32);
        assert_eq!(field.get(2, 1, 0), 210.0);
        assert_eq!(field.get(0, 2, 1), 21.0);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(DensityField::new(4, vec![0.0; 63]).is_err());
        assert!(DensityField::new(4, vec![0.0; 64]).is_ok());
    }

    #[test]
    fn test_samples_mut_writes_through_index() {
        let mut field = DensityField::filled(8, 1.0);
        let i = field.index(7, 6, 5);
        field.samples_mut()[i] = -3.0;
        assert_eq!(field.get(7, 6, 5), -3.0);
        assert_eq!(field.samples().len(), 512);
    }
}
