//! Surface materials and pair mixing
//!
//! A body with a `Material` responds to contacts; a body with a shape but no
//! material is a sensor: it still produces manifolds but never impulses.
//! When two materials meet, the contact's coefficients come from the mixing
//! functions below, unless the pair has an explicit override registered in
//! the [`MaterialMixTable`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::math::{Scalar, LARGE_SCALAR};

/// Identifier used to key per-pair overrides in the mix table.
pub type MaterialId = u32;

/// Surface response parameters of a body.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Optional id for pair overrides.
    pub id: MaterialId,
    /// Bounciness in [0, 1].
    pub restitution: Scalar,
    /// Coulomb friction coefficient.
    pub friction: Scalar,
    /// Contact spring stiffness; at or above `LARGE_SCALAR` the contact is rigid.
    pub stiffness: Scalar,
    /// Contact damping, used together with a finite stiffness.
    pub damping: Scalar,
}

impl Material {
    pub fn new(restitution: Scalar, friction: Scalar) -> Self {
        Self {
            id: 0,
            restitution,
            friction,
            stiffness: LARGE_SCALAR,
            damping: LARGE_SCALAR,
        }
    }

    pub fn with_id(mut self, id: MaterialId) -> Self {
        self.id = id;
        self
    }

    pub fn with_spring(mut self, stiffness: Scalar, damping: Scalar) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        self
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new(0.0, 0.5)
    }
}

/// Friction mixes as the geometric mean of the two coefficients.
#[inline]
pub fn mix_friction(a: Scalar, b: Scalar) -> Scalar {
    (a * b).sqrt()
}

/// Restitution mixes as the maximum: the bouncier surface wins.
#[inline]
pub fn mix_restitution(a: Scalar, b: Scalar) -> Scalar {
    a.max(b)
}

/// Stiffness combines in series, so the softer contact dominates.
#[inline]
pub fn mix_stiffness(a: Scalar, b: Scalar) -> Scalar {
    if a >= LARGE_SCALAR && b >= LARGE_SCALAR {
        LARGE_SCALAR
    } else {
        a * b / (a + b)
    }
}

/// Damping combines in series like stiffness.
#[inline]
pub fn mix_damping(a: Scalar, b: Scalar) -> Scalar {
    mix_stiffness(a, b)
}

/// Combined coefficients for a contact pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactMaterial {
    pub restitution: Scalar,
    pub friction: Scalar,
    pub stiffness: Scalar,
    pub damping: Scalar,
}

impl ContactMaterial {
    /// Mix two materials with the default rules.
    pub fn mix(a: &Material, b: &Material) -> Self {
        Self {
            restitution: mix_restitution(a.restitution, b.restitution),
            friction: mix_friction(a.friction, b.friction),
            stiffness: mix_stiffness(a.stiffness, b.stiffness),
            damping: mix_damping(a.damping, b.damping),
        }
    }
}

/// Per-pair override table keyed by unordered material id pairs.
#[derive(Default)]
pub struct MaterialMixTable {
    overrides: HashMap<(MaterialId, MaterialId), ContactMaterial>,
}

impl MaterialMixTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: MaterialId, b: MaterialId) -> (MaterialId, MaterialId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn insert(&mut self, a: MaterialId, b: MaterialId, contact: ContactMaterial) {
        self.overrides.insert(Self::key(a, b), contact);
    }

    pub fn try_get(&self, a: MaterialId, b: MaterialId) -> Option<&ContactMaterial> {
        self.overrides.get(&Self::key(a, b))
    }

    /// Combined coefficients for a pair: override if registered, mixed otherwise.
    pub fn combine(&self, a: &Material, b: &Material) -> ContactMaterial {
        if let Some(over) = self.try_get(a.id, b.id) {
            *over
        } else {
            ContactMaterial::mix(a, b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friction_geometric_mean() {
        assert!((mix_friction(0.5, 0.5) - 0.5).abs() < 1.0e-6);
        assert!((mix_friction(0.25, 1.0) - 0.5).abs() < 1.0e-6);
        assert_eq!(mix_friction(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_restitution_max() {
        assert_eq!(mix_restitution(0.2, 0.9), 0.9);
        assert_eq!(mix_restitution(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_stiffness_series() {
        // Two equal finite springs in series halve the stiffness.
        assert!((mix_stiffness(100.0, 100.0) - 50.0).abs() < 1.0e-4);
        // Rigid-rigid stays rigid.
        assert!(mix_stiffness(LARGE_SCALAR, LARGE_SCALAR) >= LARGE_SCALAR);
        // A soft spring against a rigid surface stays close to the soft value.
        let mixed = mix_stiffness(100.0, LARGE_SCALAR);
        assert!((mixed - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_pair_override_wins() {
        let mut table = MaterialMixTable::new();
        let ice = Material::new(0.05, 0.02).with_id(1);
        let rubber = Material::new(0.8, 1.0).with_id(2);

        table.insert(
            2,
            1,
            ContactMaterial {
                restitution: 0.0,
                friction: 0.123,
                stiffness: LARGE_SCALAR,
                damping: LARGE_SCALAR,
            },
        );

        // Lookup is unordered.
        let combined = table.combine(&ice, &rubber);
        assert!((combined.friction - 0.123).abs() < 1.0e-6);

        let no_override = table.combine(&ice, &Material::new(0.3, 0.5).with_id(3));
        assert!((no_override.friction - mix_friction(0.02, 0.5)).abs() < 1.0e-6);
    }
}
