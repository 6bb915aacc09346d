//! Math helpers on top of `glam`
//!
//! The engine uses `glam` for vectors, quaternions and matrices. This module
//! adds the handful of operations the solver and collision code need that
//! `glam` does not provide directly: quaternion integration by an angular
//! velocity, an orthonormal tangent basis, and the world-space inertia
//! transform.

use glam::{Mat3, Quat, Vec3};

/// Scalar type used throughout the engine.
pub type Scalar = f32;

/// General-purpose epsilon for degenerate-direction checks.
pub const EPSILON: Scalar = 1.0e-6;

/// Sentinel for "infinitely stiff" / "infinite mass" quantities.
pub const LARGE_SCALAR: Scalar = 1.0e9;

/// Integrate an orientation by an angular velocity over `dt`.
///
/// Uses the first-order quaternion derivative `q' = 0.5 * w * q` followed by
/// renormalization, which keeps the orientation unit-length after every step.
pub fn integrate_orientation(orn: Quat, angvel: Vec3, dt: Scalar) -> Quat {
    let spin = Quat::from_xyzw(angvel.x, angvel.y, angvel.z, 0.0);
    let derivative = spin * orn;
    let q = Quat::from_xyzw(
        orn.x + derivative.x * 0.5 * dt,
        orn.y + derivative.y * 0.5 * dt,
        orn.z + derivative.z * 0.5 * dt,
        orn.w + derivative.w * 0.5 * dt,
    );
    q.normalize()
}

/// Build an orthonormal basis `(t1, t2)` perpendicular to `normal`.
///
/// Picks the world axis least parallel to the normal as the reference.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let abs = normal.abs();
    let reference = if abs.x <= abs.y && abs.x <= abs.z {
        Vec3::X
    } else if abs.y <= abs.z {
        Vec3::Y
    } else {
        Vec3::Z
    };

    let t1 = normal.cross(reference).normalize();
    let t2 = normal.cross(t1);
    (t1, t2)
}

/// World-space inverse inertia: `R * diag(inv_I) * R^T`.
pub fn inertia_world_inverse(orn: Quat, inv_inertia_diag: Vec3) -> Mat3 {
    let basis = Mat3::from_quat(orn);
    basis * Mat3::from_diagonal(inv_inertia_diag) * basis.transpose()
}

/// Transform a point from object space to world space.
#[inline]
pub fn to_world_space(point: Vec3, origin: Vec3, orn: Quat) -> Vec3 {
    origin + orn * point
}

/// Transform a point from world space to object space.
#[inline]
pub fn to_object_space(point: Vec3, origin: Vec3, orn: Quat) -> Vec3 {
    orn.conjugate() * (point - origin)
}

/// Closest point on segment `[a, b]` to `p`.
pub fn closest_point_segment(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest pair of points between segments `[p1, q1]` and `[p2, q2]`.
///
/// Returns `(point_on_1, point_on_2)`. Parallel segments fall back to the
/// endpoint projection, which is adequate for contact generation.
pub fn closest_points_segment_segment(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a < EPSILON && e < EPSILON {
        return (p1, p2);
    }

    let (s, t);
    if a < EPSILON {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(r);
        if e < EPSILON {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s_tmp = if denom > EPSILON {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t_tmp = (b * s_tmp + f) / e;
            if t_tmp < 0.0 {
                t_tmp = 0.0;
                s_tmp = (-c / a).clamp(0.0, 1.0);
            } else if t_tmp > 1.0 {
                t_tmp = 1.0;
                s_tmp = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s_tmp;
            t = t_tmp;
        }
    }

    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrate_orientation_stays_unit() {
        let mut orn = Quat::IDENTITY;
        let angvel = Vec3::new(3.0, -1.0, 0.5);
        for _ in 0..1000 {
            orn = integrate_orientation(orn, angvel, 1.0 / 60.0);
        }
        assert!(
            (orn.length() - 1.0).abs() < 1.0e-4,
            "orientation drifted off unit length"
        );
    }

    #[test]
    fn test_integrate_orientation_rotates_about_axis() {
        // Integrating pi/2 rad/s about Y for one second should rotate X toward -Z.
        let mut orn = Quat::IDENTITY;
        let angvel = Vec3::new(0.0, core::f32::consts::FRAC_PI_2, 0.0);
        let dt = 1.0 / 600.0;
        for _ in 0..600 {
            orn = integrate_orientation(orn, angvel, dt);
        }
        let rotated = orn * Vec3::X;
        assert!(rotated.z < -0.95, "expected X to rotate toward -Z, got {rotated:?}");
    }

    #[test]
    fn test_tangent_basis_orthonormal() {
        for normal in [Vec3::Y, Vec3::X, Vec3::new(1.0, 2.0, -0.5).normalize()] {
            let (t1, t2) = tangent_basis(normal);
            assert!(normal.dot(t1).abs() < 1.0e-5);
            assert!(normal.dot(t2).abs() < 1.0e-5);
            assert!(t1.dot(t2).abs() < 1.0e-5);
            assert!((t1.length() - 1.0).abs() < 1.0e-5);
        }
    }

    #[test]
    fn test_inertia_world_inverse_identity_orientation() {
        let inv = Vec3::new(1.0, 2.0, 3.0);
        let m = inertia_world_inverse(Quat::IDENTITY, inv);
        assert!((m.x_axis.x - 1.0).abs() < 1.0e-6);
        assert!((m.y_axis.y - 2.0).abs() < 1.0e-6);
        assert!((m.z_axis.z - 3.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_closest_point_segment_clamps() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        assert_eq!(closest_point_segment(a, b, Vec3::new(-5.0, 1.0, 0.0)), a);
        assert_eq!(closest_point_segment(a, b, Vec3::new(15.0, 1.0, 0.0)), b);
        let mid = closest_point_segment(a, b, Vec3::new(5.0, 3.0, 0.0));
        assert!((mid.x - 5.0).abs() < 1.0e-6);
    }

    #[test]
    fn test_segment_segment_crossing() {
        let (c1, c2) = closest_points_segment_segment(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert!(c1.length() < 1.0e-6);
        assert!((c2 - Vec3::new(0.0, 1.0, 0.0)).length() < 1.0e-6);
    }
}
