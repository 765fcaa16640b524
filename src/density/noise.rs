//! CPU density kernel: fractal Perlin noise over a sloped ground plane

use glam::Vec3;
use noise::{NoiseFn, Perlin};
use rayon::prelude::*;

use crate::config::NoiseParams;
use crate::density::field::DensityField;
use crate::math::grid::GridPos;

/// Evaluates the terrain density function.
///
/// `density(p) = ground_offset - p.y / scale + Σ amplitude·persistenceⁱ · perlin(p · frequency · lacunarityⁱ)`
///
/// Positive density is solid ground.
pub struct DensityKernel {
    params: NoiseParams,
    perlin: Perlin,
}

impl DensityKernel {
    pub fn new(params: NoiseParams) -> Self {
        let perlin = Perlin::new(params.seed);
        Self { params, perlin }
    }

    /// Density at a world position
    pub fn sample(&self, p: Vec3) -> f32 {
        let mut value = 0.0f64;
        let mut amplitude = self.params.amplitude as f64;
        let mut frequency = self.params.frequency as f64;

        for _ in 0..self.params.octaves {
            let q = [
                p.x as f64 * frequency,
                p.y as f64 * frequency,
                p.z as f64 * frequency,
            ];
            value += self.perlin.get(q) * amplitude;
            amplitude *= self.params.persistence as f64;
            frequency *= self.params.lacunarity as f64;
        }

        self.params.ground_offset - p.y / self.params.scale + value as f32
    }

    /// Fill the `points³` field of chunk `pos`.
    ///
    /// The integer kernel offset is `pos * (points - 1)`, so the last sample
    /// of one chunk and the first of its neighbour hit the same world point.
    pub fn generate(&self, pos: GridPos, points: u32, step: f32) -> DensityField {
        let n = points as usize;
        let offset = pos * (points as i32 - 1);
        let mut samples = vec![0.0f32; n * n * n];

        samples
            .par_chunks_mut(n * n)
            .enumerate()
            .for_each(|(z, slab)| {
                for y in 0..n {
                    for x in 0..n {
                        let p = Vec3::new(
                            (offset.x + x as i32) as f32,
                            (offset.y + y as i32) as f32,
                            (offset.z + z as i32) as f32,
                        ) * step;
                        slab[x + n * y] = self.sample(p);
                    }
                }
            });

        DensityField::from_raw(points, samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_params() -> NoiseParams {
        NoiseParams {
            octaves: 0,
            ground_offset: 0.0,
            scale: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_ground_sign() {
        let kernel = DensityKernel::new(flat_params());
        assert!(kernel.sample(Vec3::new(0.0, -1.0, 0.0)) > 0.0);
        assert!(kernel.sample(Vec3::new(0.0, 1.0, 0.0)) < 0.0);
        assert_eq!(kernel.sample(Vec3::new(5.0, 0.0, 9.0)), 0.0);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let params = NoiseParams { seed: 42, ..Default::default() };
        let a = DensityKernel::new(params.clone()).generate(GridPos::new(1, 0, -2), 8, 4.0);
        let b = DensityKernel::new(params).generate(GridPos::new(1, 0, -2), 8, 4.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_neighbours_share_border_samples() {
        let kernel = DensityKernel::new(NoiseParams { seed: 7, ..Default::default() });
        let n = 8;
        let step = 32.0 / (n - 1) as f32;
        let a = kernel.generate(GridPos::new(0, 0, 0), n, step);
        let b = kernel.generate(GridPos::new(1, 0, 0), n, step);
        for z in 0..n {
            for y in 0..n {
                assert_eq!(a.get(n - 1, y, z), b.get(0, y, z));
            }
        }
    }

    #[test]
    fn test_generate_layout_matches_sample() {
        let kernel = DensityKernel::new(NoiseParams::default());
        let step = 2.0;
        let field = kernel.generate(GridPos::new(0, 1, 0), 8, step);
        let world = Vec3::new(3.0, (7 + 2) as f32, 5.0) * step;
        assert_eq!(field.get(3, 2, 5), kernel.sample(world));
    }
}
