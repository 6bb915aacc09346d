//! Constraint row cache
//!
//! Flat array of linearized constraint rows feeding the solver. Rows are
//! appended per constraint in registry iteration order; `con_num_rows`
//! records the block size each constraint contributed, so the cache length
//! always equals the sum of the block sizes. Delta-velocity accumulators
//! live in a parallel arena addressed by slot index; rows reference them by
//! index, never by pointer.

use std::collections::HashMap;

use glam::{Mat3, Vec3};

use crate::math::Scalar;
use crate::registry::Entity;

/// One linearized constraint row: Jacobian blocks for both bodies, inverse
/// mass/inertia, effective mass, right-hand side and impulse limits.
#[derive(Clone, Debug)]
pub struct ConstraintRow {
    /// `(J_linA, J_angA, J_linB, J_angB)`
    pub j: [Vec3; 4],
    pub inv_mass_a: Scalar,
    pub inv_inertia_a: Mat3,
    pub inv_mass_b: Scalar,
    pub inv_inertia_b: Mat3,
    /// `1 / (J M^-1 J^T)`
    pub eff_mass: Scalar,
    pub rhs: Scalar,
    pub lower_limit: Scalar,
    pub upper_limit: Scalar,
    /// Accumulated impulse, clamped to the limits.
    pub impulse: Scalar,
    /// Delta-velocity accumulator slots of each body.
    pub slot_a: usize,
    pub slot_b: usize,
}

/// Per-row tuning applied in `prepare_row`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowOptions {
    /// Positional error expressed as a velocity.
    pub error: Scalar,
    pub restitution: Scalar,
}

/// Delta-velocity accumulator of one body for the current solve.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeltaVel {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Index of each constraint kind's first row in the cache.
pub const KIND_CONTACT: usize = 0;
pub const KIND_DISTANCE: usize = 1;
pub const KIND_POINT: usize = 2;
pub const KIND_HINGE: usize = 3;
pub const KIND_GENERIC: usize = 4;
pub const NUM_CONSTRAINT_KINDS: usize = 5;

/// Flat row storage for one solver update.
#[derive(Default)]
pub struct RowCache {
    pub rows: Vec<ConstraintRow>,
    /// Rows contributed per constraint, in preparation order across kinds.
    pub con_num_rows: Vec<u32>,
    /// Per-kind start index into `rows`, filled during preparation.
    pub start_index: [usize; NUM_CONSTRAINT_KINDS],
    delta_vels: Vec<DeltaVel>,
    slots: HashMap<Entity, usize>,
    slot_entities: Vec<Entity>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for the next step. Keeps allocations.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.con_num_rows.clear();
        self.start_index = [0; NUM_CONSTRAINT_KINDS];
        self.delta_vels.clear();
        self.slots.clear();
        self.slot_entities.clear();
    }

    /// Accumulator slot for a body, allocating on first use.
    pub fn body_slot(&mut self, entity: Entity) -> usize {
        if let Some(&slot) = self.slots.get(&entity) {
            return slot;
        }
        let slot = self.delta_vels.len();
        self.delta_vels.push(DeltaVel::default());
        self.slots.insert(entity, slot);
        self.slot_entities.push(entity);
        slot
    }

    /// Bodies with an accumulator slot, in allocation order, paired with
    /// their accumulated delta velocities.
    pub fn drain_slots(&mut self) -> Vec<(Entity, DeltaVel)> {
        self.slot_entities
            .iter()
            .copied()
            .zip(self.delta_vels.iter().copied())
            .collect()
    }

    #[inline]
    pub fn delta_vel(&self, slot: usize) -> DeltaVel {
        self.delta_vels[slot]
    }

    /// Apply the previous step's accumulated impulse to the accumulators.
    pub fn warm_start(&mut self, row_idx: usize) {
        let row = self.rows[row_idx].clone();
        self.apply_impulse(&row, row.impulse);
    }

    /// One projected Gauss-Seidel relaxation of a row: compute the impulse
    /// correction, clamp the accumulated impulse to the limits, and apply
    /// the clamped correction to both bodies' accumulators.
    pub fn solve_row(&mut self, row_idx: usize) {
        let row = self.rows[row_idx].clone();
        let dv_a = self.delta_vels[row.slot_a];
        let dv_b = self.delta_vels[row.slot_b];

        let delta_relvel = row.j[0].dot(dv_a.linear)
            + row.j[1].dot(dv_a.angular)
            + row.j[2].dot(dv_b.linear)
            + row.j[3].dot(dv_b.angular);
        let mut delta_impulse = (row.rhs - delta_relvel) * row.eff_mass;
        let accumulated = row.impulse + delta_impulse;

        let clamped = accumulated.clamp(row.lower_limit, row.upper_limit);
        delta_impulse = clamped - row.impulse;
        self.rows[row_idx].impulse = clamped;

        self.apply_impulse(&row, delta_impulse);
    }

    fn apply_impulse(&mut self, row: &ConstraintRow, impulse: Scalar) {
        let dv_a = &mut self.delta_vels[row.slot_a];
        dv_a.linear += row.j[0] * (row.inv_mass_a * impulse);
        dv_a.angular += row.inv_inertia_a * row.j[1] * impulse;

        let dv_b = &mut self.delta_vels[row.slot_b];
        dv_b.linear += row.j[2] * (row.inv_mass_b * impulse);
        dv_b.angular += row.inv_inertia_b * row.j[3] * impulse;
    }
}

/// Compute the effective mass and right-hand side of a freshly appended row
/// from the bodies' current velocities.
pub fn prepare_row(
    row: &mut ConstraintRow,
    options: &RowOptions,
    linvel_a: Vec3,
    angvel_a: Vec3,
    linvel_b: Vec3,
    angvel_b: Vec3,
) {
    let diag = row.j[0].dot(row.j[0]) * row.inv_mass_a
        + (row.inv_inertia_a * row.j[1]).dot(row.j[1])
        + row.j[2].dot(row.j[2]) * row.inv_mass_b
        + (row.inv_inertia_b * row.j[3]).dot(row.j[3]);
    debug_assert!(diag > 0.0, "constraint row with zero effective mass");
    row.eff_mass = 1.0 / diag;

    let relvel = row.j[0].dot(linvel_a)
        + row.j[1].dot(angvel_a)
        + row.j[2].dot(linvel_b)
        + row.j[3].dot(angvel_b);
    row.rhs = -(options.error + relvel * (1.0 + options.restitution));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn row_between(slot_a: usize, slot_b: usize, j: [Vec3; 4]) -> ConstraintRow {
        ConstraintRow {
            j,
            inv_mass_a: 1.0,
            inv_inertia_a: Mat3::IDENTITY,
            inv_mass_b: 1.0,
            inv_inertia_b: Mat3::IDENTITY,
            eff_mass: 0.0,
            rhs: 0.0,
            lower_limit: 0.0,
            upper_limit: Scalar::MAX,
            impulse: 0.0,
            slot_a,
            slot_b,
        }
    }

    #[test]
    fn test_body_slots_are_stable() {
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();

        let mut cache = RowCache::new();
        let slot_a = cache.body_slot(a);
        let slot_b = cache.body_slot(b);
        assert_ne!(slot_a, slot_b);
        assert_eq!(cache.body_slot(a), slot_a, "slot lookup must be idempotent");
    }

    #[test]
    fn test_prepare_row_effective_mass() {
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();
        let mut cache = RowCache::new();
        let sa = cache.body_slot(a);
        let sb = cache.body_slot(b);

        // Unit masses, normal row along Y with no lever arms:
        // diag = 1*1 + 0 + 1*1 + 0 = 2 => eff_mass = 0.5
        let mut row = row_between(sa, sb, [Vec3::Y, Vec3::ZERO, -Vec3::Y, Vec3::ZERO]);
        let options = RowOptions::default();
        prepare_row(&mut row, &options, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO);
        assert!((row.eff_mass - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn test_solve_row_clamps_to_limits() {
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();
        let mut cache = RowCache::new();
        let sa = cache.body_slot(a);
        let sb = cache.body_slot(b);

        // A approaching B at 1 m/s along -Y: a normal row must push back,
        // never pull (lower limit zero).
        let mut row = row_between(sa, sb, [Vec3::Y, Vec3::ZERO, -Vec3::Y, Vec3::ZERO]);
        let options = RowOptions::default();
        prepare_row(
            &mut row,
            &options,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
        );
        cache.rows.push(row);
        cache.con_num_rows.push(1);

        for _ in 0..10 {
            cache.solve_row(0);
        }
        let impulse = cache.rows[0].impulse;
        assert!(impulse >= 0.0, "normal impulse must stay non-negative");
        assert!((impulse - 0.5).abs() < 1.0e-4, "impulse = {impulse}");

        // Velocity correction splits evenly across equal masses.
        let dv_a = cache.delta_vel(sa);
        assert!((dv_a.linear.y - 0.5).abs() < 1.0e-4);
    }

    #[test]
    fn test_warm_start_applies_accumulated_impulse() {
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();
        let mut cache = RowCache::new();
        let sa = cache.body_slot(a);
        let sb = cache.body_slot(b);

        let mut row = row_between(sa, sb, [Vec3::Y, Vec3::ZERO, -Vec3::Y, Vec3::ZERO]);
        row.impulse = 2.0;
        row.eff_mass = 0.5;
        cache.rows.push(row);

        cache.warm_start(0);
        assert!((cache.delta_vel(sa).linear.y - 2.0).abs() < 1.0e-6);
        assert!((cache.delta_vel(sb).linear.y + 2.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_row_count_matches_block_sizes() {
        let mut cache = RowCache::new();
        let mut reg = Registry::new();
        let a = reg.create();
        let b = reg.create();
        let sa = cache.body_slot(a);
        let sb = cache.body_slot(b);

        for block in [2u32, 3, 1] {
            for _ in 0..block {
                cache
                    .rows
                    .push(row_between(sa, sb, [Vec3::X, Vec3::ZERO, -Vec3::X, Vec3::ZERO]));
            }
            cache.con_num_rows.push(block);
        }
        let total: u32 = cache.con_num_rows.iter().sum();
        assert_eq!(cache.rows.len(), total as usize);
    }
}
