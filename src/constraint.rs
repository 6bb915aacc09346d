//! Constraint preparation
//!
//! For every constraint kind there are two operations: `prepare` appends
//! linearized rows to the row cache in registry iteration order, and
//! `iterate` runs at the start of each solver pass to refresh limits that
//! depend on already-solved rows; the friction cone clamped by the contact
//! normal impulse being the canonical case.
//!
//! Kinds are always processed in the same canonical order so the impulse
//! write-back can walk `con_num_rows` with a running cursor.

use glam::{Mat3, Quat, Vec3};

use crate::components::{
    AngVel, Constraint, ConstraintImpulse, ContactManifold, InertiaWorldInv, LinVel, MassInv,
    Orientation, Position,
};
use crate::math::{tangent_basis, Scalar, EPSILON, LARGE_SCALAR};
use crate::registry::{Entity, Registry};
use crate::row_cache::{
    prepare_row, ConstraintRow, RowCache, RowOptions, KIND_CONTACT, KIND_DISTANCE, KIND_GENERIC,
    KIND_HINGE, KIND_POINT,
};

struct BodyState {
    pos: Vec3,
    orn: Quat,
    linvel: Vec3,
    angvel: Vec3,
    inv_mass: Scalar,
    inv_inertia: Mat3,
    slot: usize,
}

fn body_state(registry: &Registry, cache: &mut RowCache, entity: Entity) -> BodyState {
    BodyState {
        pos: registry.get::<Position>(entity).0,
        orn: registry.get::<Orientation>(entity).0,
        linvel: registry.get::<LinVel>(entity).0,
        angvel: registry.get::<AngVel>(entity).0,
        inv_mass: registry.get::<MassInv>(entity).0,
        inv_inertia: registry.get::<InertiaWorldInv>(entity).0,
        slot: cache.body_slot(entity),
    }
}

fn new_row(a: &BodyState, b: &BodyState, j: [Vec3; 4], impulse: Scalar) -> ConstraintRow {
    ConstraintRow {
        j,
        inv_mass_a: a.inv_mass,
        inv_inertia_a: a.inv_inertia,
        inv_mass_b: b.inv_mass,
        inv_inertia_b: b.inv_inertia,
        eff_mass: 0.0,
        rhs: 0.0,
        lower_limit: -LARGE_SCALAR,
        upper_limit: LARGE_SCALAR,
        impulse,
        slot_a: a.slot,
        slot_b: b.slot,
    }
}

fn skew_row(r: Vec3, i: usize) -> Vec3 {
    match i {
        0 => Vec3::new(0.0, -r.z, r.y),
        1 => Vec3::new(r.z, 0.0, -r.x),
        _ => Vec3::new(-r.y, r.x, 0.0),
    }
}

fn axis_row(i: usize) -> Vec3 {
    match i {
        0 => Vec3::X,
        1 => Vec3::Y,
        _ => Vec3::Z,
    }
}

/// Constraint entities of each kind, in registry iteration order.
fn constraints_of_kind(registry: &Registry, kind: usize) -> Vec<Entity> {
    registry
        .iter::<Constraint>()
        .filter(|(_, con)| match con {
            Constraint::Contact { .. } => kind == KIND_CONTACT,
            Constraint::Distance { .. } => kind == KIND_DISTANCE,
            Constraint::Point { .. } => kind == KIND_POINT,
            Constraint::Hinge { .. } => kind == KIND_HINGE,
            Constraint::Generic { .. } => kind == KIND_GENERIC,
        })
        .map(|(e, _)| e)
        .collect()
}

/// Append rows for every constraint, kind by kind in canonical order.
pub fn prepare_constraints(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    prepare_contacts(registry, cache, dt);
    prepare_distances(registry, cache, dt);
    prepare_points(registry, cache, dt);
    prepare_hinges(registry, cache, dt);
    prepare_generics(registry, cache, dt);
}

/// Refresh iteration-dependent limits; called before every solver pass.
pub fn iterate_constraints(registry: &Registry, cache: &mut RowCache, _dt: Scalar) {
    // Friction rows are clamped by the current normal impulse.
    let mut row_idx = cache.start_index[KIND_CONTACT];
    for entity in constraints_of_kind(registry, KIND_CONTACT) {
        let manifold = registry.get::<ContactManifold>(entity);
        for cp in &manifold.points {
            let normal_impulse = cache.rows[row_idx].impulse;
            let friction_limit = (normal_impulse * cp.friction).abs();
            let friction_row = &mut cache.rows[row_idx + 1];
            friction_row.lower_limit = -friction_limit;
            friction_row.upper_limit = friction_limit;
            row_idx += 2;
        }
    }
}

/// Copy accumulated row impulses back into each constraint's persistent
/// impulse for next-step warm starting. Walks kinds in preparation order.
pub fn update_impulses(registry: &mut Registry, cache: &RowCache) {
    let mut con_idx = 0;
    let mut row_idx = 0;
    for kind in [KIND_CONTACT, KIND_DISTANCE, KIND_POINT, KIND_HINGE, KIND_GENERIC] {
        for entity in constraints_of_kind(registry, kind) {
            let num_rows = cache.con_num_rows[con_idx] as usize;
            let imp = registry.get_mut::<ConstraintImpulse>(entity);
            for k in 0..num_rows {
                imp.values[k] = cache.rows[row_idx + k].impulse;
            }
            row_idx += num_rows;
            con_idx += 1;
        }
    }
    debug_assert_eq!(row_idx, cache.rows.len());
}

fn prepare_contacts(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    cache.start_index[KIND_CONTACT] = cache.rows.len();

    for entity in constraints_of_kind(registry, KIND_CONTACT) {
        let Constraint::Contact {
            body,
            stiffness,
            damping,
        } = registry.get::<Constraint>(entity).clone()
        else {
            unreachable!()
        };
        let manifold = registry.get::<ContactManifold>(entity).clone();
        let imp = *registry.get::<ConstraintImpulse>(entity);

        let a = body_state(registry, cache, body[0]);
        let b = body_state(registry, cache, body[1]);

        for (i, cp) in manifold.points.iter().enumerate() {
            let normal = b.orn * cp.normal_b;
            let r_a = a.orn * cp.pivot_a;
            let r_b = b.orn * cp.pivot_b;
            let relvel = a.linvel + a.angvel.cross(r_a) - b.linvel - b.angvel.cross(r_b);
            let normal_relvel = relvel.dot(normal);

            // Normal row: impulses only push, never pull.
            let mut normal_row = new_row(
                &a,
                &b,
                [normal, r_a.cross(normal), -normal, -r_b.cross(normal)],
                imp.values[i * 2],
            );
            normal_row.lower_limit = 0.0;
            normal_row.upper_limit = if stiffness < LARGE_SCALAR {
                let spring_force = cp.distance * stiffness;
                let damper_force = normal_relvel * damping;
                (spring_force + damper_force).abs() * dt
            } else {
                LARGE_SCALAR
            };

            let separation = (a.pos + r_a - b.pos - r_b).dot(normal);
            let approach_vel = separation / dt;
            let mut options = RowOptions {
                restitution: cp.restitution,
                error: 0.0,
            };
            // When separated and the closing speed needed to touch within dt
            // exceeds the bounce velocity, apply the impulse that prevents
            // penetration next step; a penetrating resting contact instead
            // gets pushed out.
            if separation > 0.0 && approach_vel > -cp.restitution * normal_relvel {
                options.error = approach_vel.max(0.0);
            } else {
                options.error = approach_vel.min(0.0);
            }

            prepare_row(&mut normal_row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
            cache.rows.push(normal_row);
            cache.warm_start(cache.rows.len() - 1);

            // Friction row along the tangential relative velocity; limits
            // are filled per-iteration from the normal impulse.
            let tangent_relvel = relvel - normal * normal_relvel;
            let tangent_speed = tangent_relvel.length();
            let tangent = if tangent_speed > EPSILON {
                tangent_relvel / tangent_speed
            } else {
                Vec3::X
            };
            let mut friction_row = new_row(
                &a,
                &b,
                [tangent, r_a.cross(tangent), -tangent, -r_b.cross(tangent)],
                imp.values[i * 2 + 1],
            );
            friction_row.lower_limit = 0.0;
            friction_row.upper_limit = 0.0;
            prepare_row(
                &mut friction_row,
                &RowOptions::default(),
                a.linvel,
                a.angvel,
                b.linvel,
                b.angvel,
            );
            cache.rows.push(friction_row);
            cache.warm_start(cache.rows.len() - 1);
        }

        cache.con_num_rows.push(manifold.points.len() as u32 * 2);
    }
}

fn prepare_distances(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    cache.start_index[KIND_DISTANCE] = cache.rows.len();

    for entity in constraints_of_kind(registry, KIND_DISTANCE) {
        let Constraint::Distance {
            body,
            pivots,
            distance,
            stiffness,
            damping,
        } = registry.get::<Constraint>(entity).clone()
        else {
            unreachable!()
        };
        let imp = *registry.get::<ConstraintImpulse>(entity);
        let a = body_state(registry, cache, body[0]);
        let b = body_state(registry, cache, body[1]);

        let r_a = a.orn * pivots[0];
        let r_b = b.orn * pivots[1];
        let d = a.pos + r_a - b.pos - r_b;
        let len_sq = d.length_squared().max(EPSILON);
        let len = len_sq.sqrt();
        let dn = d / len;

        let mut row = new_row(&a, &b, [d, r_a.cross(d), -d, -r_b.cross(d)], imp.values[0]);
        if stiffness < LARGE_SCALAR {
            let relvel = (a.linvel + a.angvel.cross(r_a) - b.linvel - b.angvel.cross(r_b)).dot(dn);
            let force = stiffness * (len - distance) + damping * relvel.abs();
            let impulse_limit = (force * dt).abs();
            row.lower_limit = -impulse_limit;
            row.upper_limit = impulse_limit;
        }

        let options = RowOptions {
            error: 0.5 * (len_sq - distance * distance) / dt,
            restitution: 0.0,
        };
        prepare_row(&mut row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
        cache.rows.push(row);
        cache.warm_start(cache.rows.len() - 1);

        cache.con_num_rows.push(1);
    }
}

fn prepare_points(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    cache.start_index[KIND_POINT] = cache.rows.len();

    for entity in constraints_of_kind(registry, KIND_POINT) {
        let Constraint::Point { body, pivots } = registry.get::<Constraint>(entity).clone()
        else {
            unreachable!()
        };
        let imp = *registry.get::<ConstraintImpulse>(entity);
        let a = body_state(registry, cache, body[0]);
        let b = body_state(registry, cache, body[1]);
        push_point_rows(cache, &a, &b, pivots, &imp, 0, dt);
        cache.con_num_rows.push(3);
    }
}

/// Three positional rows pinning the world-space pivots together.
fn push_point_rows(
    cache: &mut RowCache,
    a: &BodyState,
    b: &BodyState,
    pivots: [Vec3; 2],
    imp: &ConstraintImpulse,
    imp_offset: usize,
    dt: Scalar,
) {
    let r_a = a.orn * pivots[0];
    let r_b = b.orn * pivots[1];
    let error = a.pos + r_a - b.pos - r_b;

    for i in 0..3 {
        let mut row = new_row(
            a,
            b,
            [axis_row(i), -skew_row(r_a, i), -axis_row(i), skew_row(r_b, i)],
            imp.values[imp_offset + i],
        );
        let options = RowOptions {
            error: error[i] / dt,
            restitution: 0.0,
        };
        prepare_row(&mut row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
        cache.rows.push(row);
        cache.warm_start(cache.rows.len() - 1);
    }
}

fn prepare_hinges(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    cache.start_index[KIND_HINGE] = cache.rows.len();

    for entity in constraints_of_kind(registry, KIND_HINGE) {
        let Constraint::Hinge { body, pivots, axes } = registry.get::<Constraint>(entity).clone()
        else {
            unreachable!()
        };
        let imp = *registry.get::<ConstraintImpulse>(entity);
        let a = body_state(registry, cache, body[0]);
        let b = body_state(registry, cache, body[1]);

        push_point_rows(cache, &a, &b, pivots, &imp, 0, dt);

        // Two angular rows locking rotation off the hinge axis.
        let axis_a = a.orn * axes[0];
        let axis_b = b.orn * axes[1];
        let (p, q) = tangent_basis(axis_a);
        for (i, u) in [p, q].into_iter().enumerate() {
            let mut row = new_row(
                &a,
                &b,
                [Vec3::ZERO, u, Vec3::ZERO, -u],
                imp.values[3 + i],
            );
            let options = RowOptions {
                error: axis_b.cross(axis_a).dot(u) / dt,
                restitution: 0.0,
            };
            prepare_row(&mut row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
            cache.rows.push(row);
            cache.warm_start(cache.rows.len() - 1);
        }

        cache.con_num_rows.push(5);
    }
}

fn prepare_generics(registry: &Registry, cache: &mut RowCache, dt: Scalar) {
    cache.start_index[KIND_GENERIC] = cache.rows.len();

    for entity in constraints_of_kind(registry, KIND_GENERIC) {
        let Constraint::Generic {
            body,
            pivots,
            fixed_linear,
            fixed_angular,
        } = registry.get::<Constraint>(entity).clone()
        else {
            unreachable!()
        };
        let imp = *registry.get::<ConstraintImpulse>(entity);
        let a = body_state(registry, cache, body[0]);
        let b = body_state(registry, cache, body[1]);

        let r_a = a.orn * pivots[0];
        let r_b = b.orn * pivots[1];
        let error = a.pos + r_a - b.pos - r_b;

        let mut num_rows = 0u32;
        for i in 0..3 {
            if !fixed_linear[i] {
                continue;
            }
            let mut row = new_row(
                &a,
                &b,
                [axis_row(i), -skew_row(r_a, i), -axis_row(i), skew_row(r_b, i)],
                imp.values[num_rows as usize],
            );
            let options = RowOptions {
                error: error[i] / dt,
                restitution: 0.0,
            };
            prepare_row(&mut row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
            cache.rows.push(row);
            cache.warm_start(cache.rows.len() - 1);
            num_rows += 1;
        }
        for i in 0..3 {
            if !fixed_angular[i] {
                continue;
            }
            // Velocity-level angular lock.
            let mut row = new_row(
                &a,
                &b,
                [Vec3::ZERO, axis_row(i), Vec3::ZERO, -axis_row(i)],
                imp.values[num_rows as usize],
            );
            let options = RowOptions::default();
            prepare_row(&mut row, &options, a.linvel, a.angvel, b.linvel, b.angvel);
            cache.rows.push(row);
            cache.warm_start(cache.rows.len() - 1);
            num_rows += 1;
        }

        cache.con_num_rows.push(num_rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{ContactPoint, DynamicTag};
    use crate::math::LARGE_SCALAR;

    fn make_body(registry: &mut Registry, pos: Vec3, mass: Scalar) -> Entity {
        let e = registry.create();
        registry.assign(e, Position(pos));
        registry.assign(e, Orientation(Quat::IDENTITY));
        registry.assign(e, LinVel(Vec3::ZERO));
        registry.assign(e, AngVel(Vec3::ZERO));
        registry.assign(e, MassInv(if mass > 0.0 { 1.0 / mass } else { 0.0 }));
        registry.assign(
            e,
            InertiaWorldInv(if mass > 0.0 { Mat3::IDENTITY } else { Mat3::ZERO }),
        );
        if mass > 0.0 {
            registry.assign(e, DynamicTag);
        }
        e
    }

    fn contact_manifold_between(
        registry: &mut Registry,
        a: Entity,
        b: Entity,
        points: Vec<ContactPoint>,
    ) -> Entity {
        let entity = registry.create();
        let mut manifold = ContactManifold::new([a, b], 0.1);
        manifold.points = points;
        registry.assign(entity, manifold);
        registry.assign(
            entity,
            Constraint::Contact {
                body: [a, b],
                stiffness: LARGE_SCALAR,
                damping: LARGE_SCALAR,
            },
        );
        registry.assign(entity, ConstraintImpulse::default());
        entity
    }

    fn resting_point() -> ContactPoint {
        ContactPoint {
            pivot_a: Vec3::new(0.0, -0.5, 0.0),
            pivot_b: Vec3::new(0.0, 0.5, 0.0),
            normal_b: Vec3::Y,
            distance: -0.01,
            restitution: 0.0,
            friction: 0.5,
            lifetime: 0,
            normal_impulse: 0.0,
            friction_impulse: 0.0,
        }
    }

    #[test]
    fn test_contact_contributes_two_rows_per_point() {
        let mut registry = Registry::new();
        let a = make_body(&mut registry, Vec3::new(0.0, 0.99, 0.0), 1.0);
        let b = make_body(&mut registry, Vec3::ZERO, 0.0);
        contact_manifold_between(&mut registry, a, b, vec![resting_point(), resting_point()]);

        let mut cache = RowCache::new();
        prepare_constraints(&registry, &mut cache, 1.0 / 60.0);

        assert_eq!(cache.rows.len(), 4);
        assert_eq!(cache.con_num_rows, vec![4]);
        // Normal rows never pull.
        assert_eq!(cache.rows[0].lower_limit, 0.0);
        assert_eq!(cache.rows[2].lower_limit, 0.0);
    }

    #[test]
    fn test_friction_limits_follow_normal_impulse() {
        let mut registry = Registry::new();
        let a = make_body(&mut registry, Vec3::new(0.0, 0.99, 0.0), 1.0);
        let b = make_body(&mut registry, Vec3::ZERO, 0.0);
        contact_manifold_between(&mut registry, a, b, vec![resting_point()]);

        let mut cache = RowCache::new();
        prepare_constraints(&registry, &mut cache, 1.0 / 60.0);

        cache.rows[0].impulse = 10.0;
        iterate_constraints(&registry, &mut cache, 1.0 / 60.0);

        assert!((cache.rows[1].lower_limit + 5.0).abs() < 1.0e-5);
        assert!((cache.rows[1].upper_limit - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_point_constraint_three_rows() {
        let mut registry = Registry::new();
        let a = make_body(&mut registry, Vec3::ZERO, 1.0);
        let b = make_body(&mut registry, Vec3::new(2.0, 0.0, 0.0), 1.0);
        let e = registry.create();
        registry.assign(
            e,
            Constraint::Point {
                body: [a, b],
                pivots: [Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)],
            },
        );
        registry.assign(e, ConstraintImpulse::default());

        let mut cache = RowCache::new();
        prepare_constraints(&registry, &mut cache, 1.0 / 60.0);
        assert_eq!(cache.rows.len(), 3);
        assert_eq!(cache.con_num_rows, vec![3]);
    }

    #[test]
    fn test_update_impulses_writes_back_in_order() {
        let mut registry = Registry::new();
        let a = make_body(&mut registry, Vec3::new(0.0, 0.99, 0.0), 1.0);
        let b = make_body(&mut registry, Vec3::ZERO, 0.0);
        let contact = contact_manifold_between(&mut registry, a, b, vec![resting_point()]);

        let mut cache = RowCache::new();
        prepare_constraints(&registry, &mut cache, 1.0 / 60.0);
        cache.rows[0].impulse = 3.0;
        cache.rows[1].impulse = 1.5;

        update_impulses(&mut registry, &cache);
        let imp = registry.get::<ConstraintImpulse>(contact);
        assert_eq!(imp.values[0], 3.0);
        assert_eq!(imp.values[1], 1.5);
    }

    #[test]
    fn test_hinge_has_five_rows() {
        let mut registry = Registry::new();
        let a = make_body(&mut registry, Vec3::ZERO, 1.0);
        let b = make_body(&mut registry, Vec3::new(1.0, 0.0, 0.0), 1.0);
        let e = registry.create();
        registry.assign(
            e,
            Constraint::Hinge {
                body: [a, b],
                pivots: [Vec3::new(0.5, 0.0, 0.0), Vec3::new(-0.5, 0.0, 0.0)],
                axes: [Vec3::Z, Vec3::Z],
            },
        );
        registry.assign(e, ConstraintImpulse::default());

        let mut cache = RowCache::new();
        prepare_constraints(&registry, &mut cache, 1.0 / 60.0);
        assert_eq!(cache.rows.len(), 5);
    }
}
