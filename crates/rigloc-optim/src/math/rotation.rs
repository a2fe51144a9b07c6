use nalgebra::{RealField, Vector3};

use super::constant;

/// Below this squared angle the first-order expansion is used.
const SMALL_ANGLE_SQ: f64 = 1e-16;

/// Rotate `p` by the rotation with scaled axis (Rodrigues vector) `w`.
///
/// Near zero the rotation falls back to `p + w x p`, which keeps the
/// derivatives with respect to `w` exact at the identity.
pub fn rotate_scaled_axis<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta_sq = w.dot(w);
    let w_cross_p = w.cross(p);
    if theta_sq.clone() > constant::<T>(SMALL_ANGLE_SQ) {
        let theta = theta_sq.sqrt();
        let k = w / theta.clone();
        let k_cross_p = k.cross(p);
        let k_dot_p = k.dot(p);
        let (sin, cos) = (theta.clone().sin(), theta.cos());
        p * cos.clone() + k_cross_p * sin + k * (k_dot_p * (T::one() - cos))
    } else {
        p + w_cross_p
    }
}
