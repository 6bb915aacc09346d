//! Axis-aligned bounding boxes

use crate::math::Scalar;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// An inverted box that unions into anything.
    pub const INVERTED: Self = Self {
        min: Vec3::splat(Scalar::MAX),
        max: Vec3::splat(Scalar::MIN),
    };

    /// Create from min/max corners.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create from a center and half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Overlap test, inclusive on the boundary.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Whether `other` is fully contained in `self`.
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    /// Smallest box enclosing both.
    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Shrink by `amount` on every side. A negative amount inflates the box.
    #[inline]
    pub fn inset(&self, amount: Scalar) -> Aabb {
        let v = Vec3::splat(amount);
        Aabb {
            min: self.min + v,
            max: self.max - v,
        }
    }

    /// Grow by `margin` on every side.
    #[inline]
    pub fn fattened(&self, margin: Scalar) -> Aabb {
        self.inset(-margin)
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    /// Surface area, the cost metric for tree insertion.
    #[inline]
    pub fn surface_area(&self) -> Scalar {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }
}
