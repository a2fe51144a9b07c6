//! Camera matrix estimation and decomposition.
//!
//! Used when the query camera is uncalibrated: a normalized DLT estimates
//! `P = K [R | t]` from at least six 2D-3D correspondences, and an RQ
//! decomposition recovers the intrinsics and the pose.

use crate::math::{mat34_from_svd_row, normalize_points_2d, normalize_points_3d};
use anyhow::{anyhow, ensure, Result};
use nalgebra::{DMatrix, Rotation3, Translation3, UnitQuaternion};
use rigloc_core::{FxFyCxCySkew, Iso3, Mat3, Mat34, Pt2, Pt3, Real, Vec3};

/// Minimal number of correspondences for [`dlt_camera_matrix`].
pub const DLT_MIN_POINTS: usize = 6;

/// Camera matrix decomposition into `K`, `R`, `t` with `K` upper-triangular.
#[derive(Debug, Clone)]
pub struct CameraMatrixDecomposition {
    /// Intrinsics matrix (upper-triangular, positive diagonal, `K[2,2] = 1`).
    pub k: Mat3,
    /// Rotation matrix (orthonormal, det=+1).
    pub r: Mat3,
    /// Translation vector in camera coordinates.
    pub t: Vec3,
}

impl CameraMatrixDecomposition {
    /// Pose `T_C_W`, with `R` projected onto SO(3).
    pub fn pose(&self) -> Iso3 {
        let rot = Rotation3::from_matrix(&self.r);
        Iso3::from_parts(
            Translation3::from(self.t),
            UnitQuaternion::from_rotation_matrix(&rot),
        )
    }

    /// Pinhole intrinsics read from `K`.
    pub fn intrinsics(&self) -> Option<FxFyCxCySkew<Real>> {
        FxFyCxCySkew::from_k_matrix(&self.k)
    }
}

/// Estimate a camera projection matrix `P` using normalized DLT.
///
/// The output is defined up to a global scale. Coplanar world points make
/// the system rank deficient; the result is then meaningless.
pub fn dlt_camera_matrix(world: &[Pt3], image: &[Pt2]) -> Result<Mat34> {
    let n = world.len();
    ensure!(
        n >= DLT_MIN_POINTS,
        "need at least {} point correspondences, got {}",
        DLT_MIN_POINTS,
        n
    );
    ensure!(
        n == image.len(),
        "mismatched number of world points ({}) and image points ({})",
        n,
        image.len()
    );

    let (world_n, t_w) = normalize_points_3d(world)
        .ok_or_else(|| anyhow!("degenerate world point configuration for normalization"))?;
    let (image_n, t_i) = normalize_points_2d(image)
        .ok_or_else(|| anyhow!("degenerate image point configuration for normalization"))?;

    let mut a = DMatrix::<Real>::zeros(2 * n, 12);
    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let xw = [pw.x, pw.y, pw.z, 1.0];
        for (c, &x) in xw.iter().enumerate() {
            a[(2 * i, c)] = x;
            a[(2 * i, 8 + c)] = -pi.x * x;
            a[(2 * i + 1, 4 + c)] = x;
            a[(2 * i + 1, 8 + c)] = -pi.y * x;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| anyhow!("SVD failed"))?;
    let (min_idx, _) = svd.singular_values.argmin();
    let p_norm =
        mat34_from_svd_row(&v_t, min_idx).ok_or_else(|| anyhow!("unexpected SVD shape"))?;

    let t_i_inv = t_i
        .try_inverse()
        .ok_or_else(|| anyhow!("image normalization is not invertible"))?;
    Ok(t_i_inv * p_norm * t_w)
}

/// RQ decomposition of a 3x3 matrix.
///
/// Returns `(K, R)` with `K` upper-triangular with positive diagonal and
/// `R` orthonormal.
pub fn rq_decompose(m: &Mat3) -> (Mat3, Mat3) {
    let j = Mat3::new(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);

    let qr = (j * m.transpose() * j).qr();
    let mut k = j * qr.r().transpose() * j;
    let mut r = j * qr.q().transpose() * j;

    let mut d = Mat3::identity();
    for i in 0..3 {
        if k[(i, i)] < 0.0 {
            d[(i, i)] = -1.0;
        }
    }
    k *= d;
    r = d * r;

    (k, r)
}

/// Decompose a camera projection matrix into intrinsics, rotation, and translation.
///
/// The scale and sign of `P` are irrelevant: `K` is normalized to
/// `K[2,2] = 1` and `R` is forced to be a proper rotation.
pub fn decompose_camera_matrix(p: &Mat34) -> Result<CameraMatrixDecomposition> {
    let m = p.fixed_view::<3, 3>(0, 0).into_owned();
    ensure!(
        m.determinant().abs() > Real::EPSILON,
        "camera matrix has a singular left 3x3 block"
    );
    let (k, mut r) = rq_decompose(&m);

    let k_inv = k
        .try_inverse()
        .ok_or_else(|| anyhow!("intrinsics matrix is not invertible"))?;
    let mut t = k_inv * p.column(3);

    if r.determinant() < 0.0 {
        r = -r;
        t = -t;
    }

    Ok(CameraMatrixDecomposition {
        k: k / k[(2, 2)],
        r,
        t: t.into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigloc_core::project_with_matrix;

    fn ground_truth() -> (Mat3, Iso3, Mat34) {
        let k = Mat3::new(900.0, 0.0, 640.0, 0.0, 880.0, 360.0, 0.0, 0.0, 1.0);
        let pose = rigloc_core::synthetic::pose([0.15, -0.05, 0.1], [0.1, -0.05, 1.2]);
        let mut p = Mat34::zeros();
        p.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(k * pose.rotation.to_rotation_matrix().matrix()));
        p.set_column(3, &(k * pose.translation.vector));
        (k, pose, p)
    }

    fn scene(p: &Mat34, n: usize) -> (Vec<Pt3>, Vec<Pt2>) {
        let world: Vec<Pt3> = (0..n)
            .map(|i| {
                let f = i as Real;
                Pt3::new(0.3 * (f * 0.7).sin(), 0.25 * (f * 1.3).cos(), 2.0 + 0.2 * (f % 3.0))
            })
            .collect();
        let image = world
            .iter()
            .map(|pw| project_with_matrix(p, pw).unwrap())
            .collect();
        (world, image)
    }

    #[test]
    fn dlt_camera_matrix_recovers_projection() {
        let (_, _, p_gt) = ground_truth();
        let (world, image) = scene(&p_gt, 20);
        let p_est = dlt_camera_matrix(&world, &image).unwrap();
        for (pw, uv) in world.iter().zip(image.iter()) {
            let e = (project_with_matrix(&p_est, pw).unwrap() - uv).norm();
            assert!(e < 1e-6, "reprojection error too large: {}", e);
        }
    }

    #[test]
    fn dlt_camera_matrix_accepts_minimal_set() {
        let (_, _, p_gt) = ground_truth();
        let (world, image) = scene(&p_gt, DLT_MIN_POINTS);
        let p_est = dlt_camera_matrix(&world, &image).unwrap();
        for (pw, uv) in world.iter().zip(image.iter()) {
            let e = (project_with_matrix(&p_est, pw).unwrap() - uv).norm();
            assert!(e < 1e-6, "reprojection error too large: {}", e);
        }
        assert!(dlt_camera_matrix(&world[..5], &image[..5]).is_err());
    }

    #[test]
    fn decomposition_recovers_k_and_pose_for_any_scale() {
        let (k, pose, p_gt) = ground_truth();
        for scale in [1.0, -3.0, 0.01] {
            let decomp = decompose_camera_matrix(&(p_gt * scale)).unwrap();
            let k_err = (decomp.k - k).norm();
            assert!(k_err < 1e-6, "K mismatch: {}", k_err);
            let (ang, dt) = rigloc_core::pose_distance(&decomp.pose(), &pose);
            assert!(ang < 1e-9, "rotation error: {}", ang);
            assert!(dt < 1e-9, "translation error: {}", dt);
        }
    }

    #[test]
    fn rq_decompose_recovers_k_r() {
        let k = Mat3::new(800.0, 1.5, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0);
        let r = *nalgebra::Rotation3::from_euler_angles(0.1, 0.2, -0.05).matrix();
        let (k_est, r_est) = rq_decompose(&(k * r));

        let scale = k[(2, 2)] / k_est[(2, 2)];
        assert!((k_est * scale - k).norm() < 1e-6);
        assert!((r_est - r).norm() < 1e-9);
    }
}
