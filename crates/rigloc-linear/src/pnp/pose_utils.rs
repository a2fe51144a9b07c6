//! Rigid alignment of world points with their camera-frame counterparts.

use anyhow::{anyhow, ensure, Result};
use nalgebra::{Rotation3, Translation3, UnitQuaternion};
use rigloc_core::{Iso3, Mat3, Pt3, Real, Vec3};

/// Recover `T_C_W` from world points and the same points in the camera frame.
///
/// Kabsch alignment: SVD of the cross-covariance, with the reflection case
/// folded back onto a proper rotation.
pub fn pose_from_points(world: &[Pt3], camera: &[Vec3]) -> Result<Iso3> {
    ensure!(
        world.len() == camera.len() && world.len() >= 3,
        "need at least 3 paired points, got {} world / {} camera",
        world.len(),
        camera.len()
    );

    let n = world.len() as Real;
    let c_w = world.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n;
    let c_c = camera.iter().fold(Vec3::zeros(), |acc, p| acc + p) / n;

    let h = world
        .iter()
        .zip(camera.iter())
        .fold(Mat3::zeros(), |acc, (pw, pc)| {
            acc + (pc - c_c) * (pw.coords - c_w).transpose()
        });

    let svd = h.svd(true, true);
    let (weakest, _) = svd.singular_values.argmin();
    let u = svd.u.ok_or_else(|| anyhow!("SVD failed"))?;
    let v_t = svd.v_t.ok_or_else(|| anyhow!("SVD failed"))?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(weakest).neg_mut();
        r = u_fix * v_t;
    }

    let t = c_c - r * c_w;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}
