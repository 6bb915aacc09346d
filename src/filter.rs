//! Collision filtering
//!
//! Bitmask filter carried by every body with a shape. A pair is allowed to
//! collide iff each body's group intersects the other's mask:
//! `(a.group & b.mask) != 0 && (b.group & a.mask) != 0`.

use serde::{Deserialize, Serialize};

/// Group/mask collision filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionFilter {
    /// Which group(s) this body belongs to.
    pub group: u64,
    /// Which groups this body accepts collisions with.
    pub mask: u64,
}

impl CollisionFilter {
    /// Belongs to every group, collides with everything.
    pub const ALL: Self = Self {
        group: u64::MAX,
        mask: u64::MAX,
    };

    /// Collides with nothing.
    pub const NONE: Self = Self { group: 0, mask: 0 };

    #[inline]
    pub const fn new(group: u64, mask: u64) -> Self {
        Self { group, mask }
    }

    /// Bidirectional group/mask check.
    #[inline]
    pub fn should_collide(a: &Self, b: &Self) -> bool {
        (a.group & b.mask) != 0 && (b.group & a.mask) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collides() {
        let a = CollisionFilter::default();
        let b = CollisionFilter::default();
        assert!(CollisionFilter::should_collide(&a, &b));
    }

    #[test]
    fn test_none_never_collides() {
        let a = CollisionFilter::NONE;
        let b = CollisionFilter::ALL;
        assert!(!CollisionFilter::should_collide(&a, &b));
    }

    #[test]
    fn test_one_way_acceptance_is_not_enough() {
        // a accepts b's group, but b does not accept a's.
        let a = CollisionFilter::new(1 << 0, 1 << 1);
        let b = CollisionFilter::new(1 << 1, 1 << 2);
        assert!(!CollisionFilter::should_collide(&a, &b));
    }

    #[test]
    fn test_mutual_acceptance() {
        let a = CollisionFilter::new(1 << 0, 1 << 1);
        let b = CollisionFilter::new(1 << 1, 1 << 0);
        assert!(CollisionFilter::should_collide(&a, &b));
        assert!(CollisionFilter::should_collide(&b, &a));
    }
}
