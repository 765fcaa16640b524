//! Height-keyed vertex color gradient.
//!
//! [`ColorGradient`] maps a world-space height to an RGBA color by linear
//! interpolation between sorted keys, clamping outside the key range.

use serde::{Deserialize, Serialize};

#[inline]
fn lerp_rgba(a: &[f32; 4], b: &[f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

/// Keys are `(height, rgba)` pairs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(f32, [f32; 4])>", into = "Vec<(f32, [f32; 4])>")]
pub struct ColorGradient {
    keys: Vec<(f32, [f32; 4])>,
}

impl ColorGradient {
    /// Create a gradient from unsorted keys. Keys are sorted by height.
    pub fn new(mut keys: Vec<(f32, [f32; 4])>) -> Self {
        keys.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Self { keys }
    }

    /// Sand at the bottom, grass, rock, snow on top
    pub fn terrain() -> Self {
        Self::new(vec![
            (-16.0, [0.76, 0.70, 0.50, 1.0]),
            (-4.0, [0.33, 0.55, 0.21, 1.0]),
            (16.0, [0.25, 0.42, 0.18, 1.0]),
            (32.0, [0.45, 0.42, 0.40, 1.0]),
            (56.0, [0.95, 0.95, 0.97, 1.0]),
        ])
    }

    /// Color at world height `h`
    pub fn sample(&self, h: f32) -> [f32; 4] {
        let Some(&(first_h, first)) = self.keys.first() else {
            return [1.0; 4];
        };
        if h <= first_h || self.keys.len() == 1 {
            return first;
        }

        match self.keys.iter().position(|k| k.0 > h) {
            Some(idx) => {
                let (h_a, ref c_a) = self.keys[idx - 1];
                let (h_b, ref c_b) = self.keys[idx];
                let span = h_b - h_a;
                if span < 1e-6 {
                    return *c_a;
                }
                lerp_rgba(c_a, c_b, (h - h_a) / span)
            }
            None => self.keys[self.keys.len() - 1].1,
        }
    }
}

impl From<Vec<(f32, [f32; 4])>> for ColorGradient {
    fn from(keys: Vec<(f32, [f32; 4])>) -> Self {
        Self::new(keys)
    }
}

impl From<ColorGradient> for Vec<(f32, [f32; 4])> {
    fn from(gradient: ColorGradient) -> Self {
        gradient.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
    const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    #[test]
    fn test_interpolates_between_keys() {
        let g = ColorGradient::new(vec![(10.0, WHITE), (0.0, BLACK)]);
        assert_eq!(g.sample(5.0), [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_clamps_outside_range() {
        let g = ColorGradient::new(vec![(0.0, BLACK), (10.0, WHITE)]);
        assert_eq!(g.sample(-100.0), BLACK);
        assert_eq!(g.sample(100.0), WHITE);
    }

    #[test]
    fn test_single_key_is_constant() {
        let g = ColorGradient::new(vec![(0.0, WHITE)]);
        assert_eq!(g.sample(-3.0), WHITE);
        assert_eq!(g.sample(3.0), WHITE);
    }

    #[test]
    fn test_serde_as_key_list() {
        let g = ColorGradient::new(vec![(1.0, WHITE), (0.0, BLACK)]);
        let json = serde_json::to_string(&g).unwrap();
        let back: ColorGradient = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
        assert_eq!(back.sample(0.0), BLACK);
    }
}
