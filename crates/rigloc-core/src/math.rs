//! Type aliases and small geometric helpers shared by every crate.

use nalgebra::{Isometry3, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Vector2, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 3×4 camera projection matrix `P = K [R | t]`.
pub type Mat34 = Matrix3x4<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Convert a 2D point in Euclidean coordinates into homogeneous coordinates.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Convert a 3D homogeneous vector back to a 2D point.
///
/// The caller is responsible for ensuring that `w != 0`.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Project a world point through a 3x4 camera matrix.
///
/// Returns `None` when the point lands on the principal plane.
pub fn project_with_matrix(p: &Mat34, pw: &Pt3) -> Option<Pt2> {
    let x = p * pw.to_homogeneous();
    if x.z.abs() <= Real::EPSILON {
        return None;
    }
    Some(from_homogeneous(&x))
}

/// Angle in radians between two (not necessarily unit) directions.
///
/// Uses `atan2(|a × b|, a · b)`, which stays accurate for tiny angles.
pub fn angle_between(a: &Vec3, b: &Vec3) -> Real {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Rotation angle of a rigid transform in radians.
pub fn rotation_angle(pose: &Iso3) -> Real {
    pose.rotation.angle()
}

/// Distance between two poses as `(rotation angle, translation norm)`.
pub fn pose_distance(a: &Iso3, b: &Iso3) -> (Real, Real) {
    let delta = a.inverse() * b;
    (delta.rotation.angle(), delta.translation.vector.norm())
}
