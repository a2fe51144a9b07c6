//! 6-DoF pose block `[wx, wy, wz, tx, ty, tz]` (scaled axis + translation).

use anyhow::{ensure, Result};
use nalgebra::{RealField, UnitQuaternion, Vector3};
use rigloc_core::{Iso3, Real};

use crate::math::rotation::rotate_scaled_axis;

pub const POSE_DIM: usize = 6;

/// Write `pose` into `out[..6]`.
pub fn pack_pose(pose: &Iso3, out: &mut [Real]) {
    let w = pose.rotation.scaled_axis();
    let t = pose.translation.vector;
    out[..POSE_DIM].copy_from_slice(&[w.x, w.y, w.z, t.x, t.y, t.z]);
}

/// Read a pose from `v[..6]`.
pub fn unpack_pose(v: &[Real]) -> Result<Iso3> {
    ensure!(
        v.len() >= POSE_DIM,
        "expected pose block of length {}, got {}",
        POSE_DIM,
        v.len()
    );
    ensure!(
        v[..POSE_DIM].iter().all(|x| x.is_finite()),
        "pose block is not finite"
    );
    let rot = UnitQuaternion::from_scaled_axis(Vector3::new(v[0], v[1], v[2]));
    Ok(Iso3::from_parts(Vector3::new(v[3], v[4], v[5]).into(), rot))
}

/// Apply a generic pose block to a point: `R(w) p + t`.
pub fn transform_generic<T: RealField>(pose: &[T], p: &Vector3<T>) -> Vector3<T> {
    debug_assert!(pose.len() >= POSE_DIM);
    let w = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
    let t = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());
    rotate_scaled_axis(&w, p) + t
}
