//! Axis-aligned bounding box

use crate::core::types::Vec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Cube with its minimum corner at `origin`
    pub fn from_origin_size(origin: Vec3, size: f32) -> Self {
        Self {
            min: origin,
            max: origin + Vec3::splat(size),
        }
    }

    /// Check if a sphere touches the box (closest-point test)
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        closest.distance_squared(center) <= radius * radius
    }
}
