//! Spherical density edits

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::density::DensityField;
use crate::math::Aabb;

/// Whether an edit adds or removes material
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    Construct,
    Excavate,
}

impl EditMode {
    pub fn sign(self) -> f32 {
        match self {
            EditMode::Construct => 1.0,
            EditMode::Excavate => -1.0,
        }
    }
}

/// A brush stroke centred on a raycast hit
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerraformEdit {
    pub hit: Vec3,
    pub radius: f32,
    pub mode: EditMode,
    pub strength: f32,
}

impl TerraformEdit {
    pub fn construct(hit: Vec3, radius: f32, strength: f32) -> Self {
        Self {
            hit,
            radius,
            mode: EditMode::Construct,
            strength,
        }
    }

    pub fn excavate(hit: Vec3, radius: f32, strength: f32) -> Self {
        Self {
            hit,
            radius,
            mode: EditMode::Excavate,
            strength,
        }
    }

    /// `1 - smoothstep(0, 1, d / radius)`, zero at and beyond the radius
    pub fn falloff(&self, distance: f32) -> f32 {
        if self.radius <= 0.0 || distance >= self.radius {
            return 0.0;
        }
        let t = (distance / self.radius).clamp(0.0, 1.0);
        1.0 - t * t * (3.0 - 2.0 * t)
    }

    /// Signed density change at world position `p`
    pub fn delta_at(&self, p: Vec3) -> f32 {
        self.mode.sign() * self.strength * self.falloff(p.distance(self.hit))
    }

    /// Whether the brush can touch samples inside `bounds`
    pub fn touches(&self, bounds: &Aabb) -> bool {
        self.radius > 0.0 && bounds.intersects_sphere(self.hit, self.radius)
    }
}

/// Apply `edit` in place to a chunk field whose minimum corner is `chunk_origin`.
///
/// Falloff is evaluated on world positions, so neighbouring chunks sharing a
/// border sample receive the same delta. Returns the number of samples changed.
pub fn apply_edit(field: &mut DensityField, edit: &TerraformEdit, chunk_origin: Vec3, step: f32) -> usize {
    if edit.strength == 0.0 || edit.radius <= 0.0 {
        return 0;
    }

    let n = field.points();
    // Only visit the sample range the sphere can reach
    let lo = ((edit.hit - Vec3::splat(edit.radius) - chunk_origin) / step).floor();
    let hi = ((edit.hit + Vec3::splat(edit.radius) - chunk_origin) / step).ceil();
    let clamp = |v: f32| v.clamp(0.0, (n - 1) as f32) as u32;
    if hi.x < 0.0 || hi.y < 0.0 || hi.z < 0.0 {
        return 0;
    }
    let max = (n - 1) as f32;
    if lo.x > max || lo.y > max || lo.z > max {
        return 0;
    }

    let mut changed = 0;
    for z in clamp(lo.z)..=clamp(hi.z) {
        for y in clamp(lo.y)..=clamp(hi.y) {
            for x in clamp(lo.x)..=clamp(hi.x) {
                let world = chunk_origin + DensityField::local_position(x, y, z, step);
                let delta = edit.delta_at(world);
                if delta != 0.0 {
                    let idx = field.index(x, y, z);
                    field.samples_mut()[idx] += delta;
                    changed += 1;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceParams;
    use crate::surface::marching::SurfaceExtractor;

    fn ground() -> DensityField {
        DensityField::from_fn(8, |_, y, _| 3.5 - y as f32)
    }

    #[test]
    fn test_falloff_shape() {
        let edit = TerraformEdit::construct(Vec3::ZERO, 4.0, 1.0);
        assert_eq!(edit.falloff(0.0), 1.0);
        assert!((edit.falloff(2.0) - 0.5).abs() < 1e-6);
        assert_eq!(edit.falloff(4.0), 0.0);
        assert_eq!(edit.falloff(10.0), 0.0);
    }

    #[test]
    fn test_zero_strength_is_identity() {
        let mut field = ground();
        let before = field.clone();
        let edit = TerraformEdit::excavate(Vec3::new(3.0, 3.0, 3.0), 3.0, 0.0);
        assert_eq!(apply_edit(&mut field, &edit, Vec3::ZERO, 1.0), 0);
        assert_eq!(field, before);

        let ex = SurfaceExtractor::new(&SurfaceParams::default());
        assert_eq!(ex.extract(&field, 1.0, Vec3::ZERO), ex.extract(&before, 1.0, Vec3::ZERO));
    }

    #[test]
    fn test_construct_and_excavate_are_opposite() {
        let hit = Vec3::new(3.0, 3.0, 3.0);
        let mut up = ground();
        let mut down = ground();
        apply_edit(&mut up, &TerraformEdit::construct(hit, 2.5, 2.0), Vec3::ZERO, 1.0);
        apply_edit(&mut down, &TerraformEdit::excavate(hit, 2.5, 2.0), Vec3::ZERO, 1.0);

        let base = ground();
        let i = base.index(3, 3, 3);
        assert_eq!(up.samples()[i] - base.samples()[i], 2.0);
        assert_eq!(down.samples()[i] - base.samples()[i], -2.0);
        // Outside the radius nothing changes
        let far = base.index(7, 7, 7);
        assert_eq!(up.samples()[far], base.samples()[far]);
    }

    #[test]
    fn test_shared_border_gets_same_delta() {
        // Two chunks of 7 world units side by side along x, step 1
        let hit = Vec3::new(7.0, 3.0, 3.0);
        let edit = TerraformEdit::excavate(hit, 3.0, 1.0);
        let mut left = ground();
        let mut right = ground();
        apply_edit(&mut left, &edit, Vec3::ZERO, 1.0);
        apply_edit(&mut right, &edit, Vec3::new(7.0, 0.0, 0.0), 1.0);
        for z in 0..8 {
            for y in 0..8 {
                assert_eq!(left.get(7, y, z), right.get(0, y, z));
            }
        }
    }

    #[test]
    fn test_edit_outside_chunk_is_noop() {
        let mut field = ground();
        let edit = TerraformEdit::construct(Vec3::new(100.0, 0.0, 0.0), 2.0, 1.0);
        assert_eq!(apply_edit(&mut field, &edit, Vec3::ZERO, 1.0), 0);
        assert_eq!(field, ground());
    }

    #[test]
    fn test_touches_bounds() {
        let bounds = Aabb::from_origin_size(Vec3::ZERO, 8.0);
        assert!(TerraformEdit::construct(Vec3::new(9.0, 4.0, 4.0), 1.5, 1.0).touches(&bounds));
        assert!(!TerraformEdit::construct(Vec3::new(12.0, 4.0, 4.0), 1.5, 1.0).touches(&bounds));
    }
}
