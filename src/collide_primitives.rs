//! Collision routines for sphere/capsule/cylinder/plane pairs
//!
//! Each routine works in world space and converts points through
//! [`crate::collide::world_point`]. Shape A is the first shape of the
//! dispatch pair; normals always point from B toward A.

use glam::Vec3;

use crate::collide::{world_point, CollisionContext, CollisionResult};
use crate::math::{closest_point_segment, closest_points_segment_segment, Scalar, EPSILON};

/// Signed distance of a world point to B's plane, given in B object space.
fn plane_distance(point: Vec3, normal_world: Vec3, ctx: &CollisionContext, constant: Scalar) -> Scalar {
    (point - ctx.pos_b).dot(normal_world) - constant
}

pub(crate) fn collide_sphere_sphere(
    radius_a: Scalar,
    radius_b: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let delta = ctx.pos_a - ctx.pos_b;
    let dist = delta.length();
    let separation = dist - radius_a - radius_b;
    if separation > ctx.threshold {
        return result;
    }
    let normal = if dist > EPSILON { delta / dist } else { Vec3::Y };
    let on_a = ctx.pos_a - normal * radius_a;
    let on_b = ctx.pos_b + normal * radius_b;
    result.maybe_add(world_point(ctx, on_a, on_b, normal));
    result
}

pub(crate) fn collide_sphere_plane(
    radius: Scalar,
    plane_normal: Vec3,
    constant: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let normal = ctx.orn_b * plane_normal;
    let center_dist = plane_distance(ctx.pos_a, normal, ctx, constant);
    let separation = center_dist - radius;
    if separation > ctx.threshold {
        return result;
    }
    let on_a = ctx.pos_a - normal * radius;
    let on_b = ctx.pos_a - normal * center_dist;
    result.maybe_add(world_point(ctx, on_a, on_b, normal));
    result
}

pub(crate) fn collide_sphere_box(
    radius: Scalar,
    half_extents: Vec3,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let local_center = ctx.orn_b.conjugate() * (ctx.pos_a - ctx.pos_b);
    let clamped = local_center.clamp(-half_extents, half_extents);

    if (local_center - clamped).length_squared() > EPSILON {
        // Center outside the box: closest-point contact.
        let delta = local_center - clamped;
        let dist = delta.length();
        let separation = dist - radius;
        if separation > ctx.threshold {
            return result;
        }
        let normal = ctx.orn_b * (delta / dist);
        let on_b = ctx.pos_b + ctx.orn_b * clamped;
        let on_a = ctx.pos_a - normal * radius;
        result.maybe_add(world_point(ctx, on_a, on_b, normal));
    } else {
        // Center inside the box: push out along the face of least penetration.
        let overshoot = half_extents - local_center.abs();
        let (axis, face_pen) = if overshoot.x <= overshoot.y && overshoot.x <= overshoot.z {
            (0, overshoot.x)
        } else if overshoot.y <= overshoot.z {
            (1, overshoot.y)
        } else {
            (2, overshoot.z)
        };
        let mut local_normal = Vec3::ZERO;
        local_normal[axis] = 1.0_f32.copysign(local_center[axis]);
        let mut surface = local_center;
        surface[axis] = half_extents[axis].copysign(local_center[axis]);

        let normal = ctx.orn_b * local_normal;
        let on_b = ctx.pos_b + ctx.orn_b * surface;
        let on_a = ctx.pos_a - normal * (radius + face_pen);
        result.maybe_add(world_point(ctx, on_a, on_b, normal));
    }
    result
}

pub(crate) fn collide_sphere_capsule(
    radius_a: Scalar,
    radius_b: Scalar,
    half_length_b: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let tip = ctx.orn_b * Vec3::new(0.0, half_length_b, 0.0);
    let closest = closest_point_segment(ctx.pos_b - tip, ctx.pos_b + tip, ctx.pos_a);
    let delta = ctx.pos_a - closest;
    let dist = delta.length();
    let separation = dist - radius_a - radius_b;
    if separation > ctx.threshold {
        return result;
    }
    let normal = if dist > EPSILON { delta / dist } else { Vec3::Y };
    let on_a = ctx.pos_a - normal * radius_a;
    let on_b = closest + normal * radius_b;
    result.maybe_add(world_point(ctx, on_a, on_b, normal));
    result
}

pub(crate) fn collide_sphere_cylinder(
    radius_a: Scalar,
    radius_b: Scalar,
    half_length_b: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let local = ctx.orn_b.conjugate() * (ctx.pos_a - ctx.pos_b);
    let radial = Vec3::new(local.x, 0.0, local.z);
    let radial_len = radial.length();

    let inside_axially = local.y.abs() <= half_length_b;
    let inside_radially = radial_len <= radius_b;

    let (local_normal, on_surface) = if inside_axially && inside_radially {
        // Center inside: exit through the nearer of cap or lateral surface.
        let cap_pen = half_length_b - local.y.abs();
        let side_pen = radius_b - radial_len;
        if cap_pen < side_pen {
            let n = Vec3::new(0.0, 1.0_f32.copysign(local.y), 0.0);
            (n, Vec3::new(local.x, half_length_b.copysign(local.y), local.z))
        } else {
            let dir = if radial_len > EPSILON { radial / radial_len } else { Vec3::X };
            (dir, dir * radius_b + Vec3::new(0.0, local.y, 0.0))
        }
    } else {
        // Closest point on the solid cylinder.
        let clamped_y = local.y.clamp(-half_length_b, half_length_b);
        let clamped_radial = if radial_len > radius_b {
            radial * (radius_b / radial_len)
        } else {
            radial
        };
        let q = Vec3::new(clamped_radial.x, clamped_y, clamped_radial.z);
        let delta = local - q;
        let d = delta.length();
        if d - radius_a > ctx.threshold {
            return result;
        }
        (if d > EPSILON { delta / d } else { Vec3::Y }, q)
    };

    let normal = ctx.orn_b * local_normal;
    let on_b = ctx.pos_b + ctx.orn_b * on_surface;
    let on_a = ctx.pos_a - normal * radius_a;
    let point = world_point(ctx, on_a, on_b, normal);
    if point.distance <= ctx.threshold {
        result.maybe_add(point);
    }
    result
}

pub(crate) fn collide_capsule_plane(
    radius: Scalar,
    half_length: Scalar,
    plane_normal: Vec3,
    constant: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let normal = ctx.orn_b * plane_normal;
    let tip = ctx.orn_a * Vec3::new(0.0, half_length, 0.0);

    for endpoint in [ctx.pos_a + tip, ctx.pos_a - tip] {
        let center_dist = plane_distance(endpoint, normal, ctx, constant);
        if center_dist - radius <= ctx.threshold {
            let on_a = endpoint - normal * radius;
            let on_b = endpoint - normal * center_dist;
            result.maybe_add(world_point(ctx, on_a, on_b, normal));
        }
    }
    result
}

pub(crate) fn collide_capsule_capsule(
    radius_a: Scalar,
    half_length_a: Scalar,
    radius_b: Scalar,
    half_length_b: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let tip_a = ctx.orn_a * Vec3::new(0.0, half_length_a, 0.0);
    let tip_b = ctx.orn_b * Vec3::new(0.0, half_length_b, 0.0);
    let (a0, a1) = (ctx.pos_a - tip_a, ctx.pos_a + tip_a);
    let (b0, b1) = (ctx.pos_b - tip_b, ctx.pos_b + tip_b);

    let mut push_pair = |on_segment_a: Vec3, on_segment_b: Vec3| {
        let delta = on_segment_a - on_segment_b;
        let dist = delta.length();
        if dist - radius_a - radius_b > ctx.threshold {
            return;
        }
        let normal = if dist > EPSILON { delta / dist } else { Vec3::Y };
        let on_a = on_segment_a - normal * radius_a;
        let on_b = on_segment_b + normal * radius_b;
        result.maybe_add(world_point(ctx, on_a, on_b, normal));
    };

    let (c1, c2) = closest_points_segment_segment(a0, a1, b0, b1);
    push_pair(c1, c2);

    // Near-parallel capsules rest on a line contact; add the endpoint
    // projections so the manifold can hold the pose without wobbling.
    let dir_a = (a1 - a0).normalize_or_zero();
    let dir_b = (b1 - b0).normalize_or_zero();
    if dir_a.dot(dir_b).abs() > 0.99 {
        for endpoint in [a0, a1] {
            let on_b_seg = closest_point_segment(b0, b1, endpoint);
            push_pair(endpoint, on_b_seg);
        }
    }
    result
}

pub(crate) fn collide_cylinder_plane(
    radius: Scalar,
    half_length: Scalar,
    plane_normal: Vec3,
    constant: Scalar,
    ctx: &CollisionContext,
) -> CollisionResult {
    let mut result = CollisionResult::new();
    let normal = ctx.orn_b * plane_normal;
    let local_normal = ctx.orn_a.conjugate() * normal;
    let radial = Vec3::new(local_normal.x, 0.0, local_normal.z);
    let radial_len = radial.length();

    for cap_sign in [-1.0_f32, 1.0] {
        let cap_center = ctx.pos_a + ctx.orn_a * Vec3::new(0.0, cap_sign * half_length, 0.0);
        if radial_len > EPSILON {
            // Tilted cylinder: the deepest rim point is opposite the plane normal.
            let rim_local = -radial / radial_len * radius;
            let rim = cap_center + ctx.orn_a * rim_local;
            let dist = plane_distance(rim, normal, ctx, constant);
            if dist <= ctx.threshold {
                result.maybe_add(world_point(ctx, rim, rim - normal * dist, normal));
            }
        } else {
            // Cap face parallel to the plane: emit a rim triangle so the
            // manifold can support the resting cylinder.
            for angle in [0.0_f32, 2.0944, 4.18879] {
                let rim_local = Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
                let rim = cap_center + ctx.orn_a * rim_local;
                let dist = plane_distance(rim, normal, ctx, constant);
                if dist <= ctx.threshold {
                    result.maybe_add(world_point(ctx, rim, rim - normal * dist, normal));
                }
            }
        }
    }
    result
}
