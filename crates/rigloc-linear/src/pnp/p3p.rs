//! P3P (Perspective-3-Point) minimal solver.
//!
//! Distances along the three rays are parametrized by their ratios
//! `u = s2 / s1`, `v = s3 / s1`; eliminating `v` with the law of cosines
//! leaves a quartic in `u`. Up to four poses come out and must be
//! disambiguated by the caller.

use super::pose_utils::pose_from_points;
use anyhow::{bail, ensure, Result};
use rigloc_core::{CameraIntrinsics, Iso3, Pt2, Pt3, Real, Vec3};

use crate::math::solve_quartic_real;

/// Multiply two polynomials given low-order first, truncated to degree 4.
fn poly_mul(a: &[Real; 5], b: &[Real; 5]) -> [Real; 5] {
    let mut out = [0.0; 5];
    for i in 0..5 {
        for j in 0..(5 - i) {
            out[i + j] += a[i] * b[j];
        }
    }
    out
}

/// P3P from pixels: converts them to bearings through `intrinsics`.
pub fn p3p(world: &[Pt3], image: &[Pt2], intrinsics: &CameraIntrinsics) -> Result<Vec<Iso3>> {
    ensure!(
        image.len() == 3,
        "invalid number of image points: expected 3, got {}",
        image.len()
    );
    let bearings: Vec<Vec3> = image.iter().map(|p| intrinsics.bearing(p)).collect();
    p3p_bearings(world, &bearings)
}

/// P3P from unit bearing vectors expressed in the camera frame.
///
/// Returns the candidate poses `T_C_W`, ordered by increasing distance of
/// the first point.
pub fn p3p_bearings(world: &[Pt3], bearings: &[Vec3]) -> Result<Vec<Iso3>> {
    ensure!(
        world.len() == 3 && bearings.len() == 3,
        "invalid number of correspondences: expected 3, got {} / {}",
        world.len(),
        bearings.len()
    );

    let a = (world[1] - world[2]).norm();
    let b = (world[0] - world[2]).norm();
    let c = (world[0] - world[1]).norm();
    if a <= Real::EPSILON || b <= Real::EPSILON || c <= Real::EPSILON {
        bail!("degenerate 3d point configuration");
    }
    let cross = (world[1] - world[0]).cross(&(world[2] - world[0])).norm();
    if cross <= 1e-12 * a.max(b).max(c).powi(2) {
        bail!("collinear 3d points");
    }

    let cos_alpha = bearings[1].dot(&bearings[2]);
    let cos_beta = bearings[0].dot(&bearings[2]);
    let cos_gamma = bearings[0].dot(&bearings[1]);

    let c2 = c * c;
    let d = (b * b - a * a) / c2;
    let e = b * b / c2;

    // v = N(u) / D(u)
    let n_poly = [1.0 - d, 2.0 * d * cos_gamma, -(1.0 + d), 0.0, 0.0];
    let d_poly = [2.0 * cos_beta, -2.0 * cos_alpha, 0.0, 0.0, 0.0];
    let e_poly = [1.0 - e, 2.0 * e * cos_gamma, -e, 0.0, 0.0];

    let n2 = poly_mul(&n_poly, &n_poly);
    let nd = poly_mul(&n_poly, &d_poly);
    let ed2 = poly_mul(&e_poly, &poly_mul(&d_poly, &d_poly));

    let mut coeffs = [0.0; 5];
    for i in 0..5 {
        coeffs[i] = n2[i] - 2.0 * cos_beta * nd[i] + ed2[i];
    }

    let roots = solve_quartic_real(coeffs[4], coeffs[3], coeffs[2], coeffs[1], coeffs[0]);

    let mut solutions: Vec<(Real, Iso3)> = Vec::with_capacity(roots.len());
    for u in roots {
        let den = d_poly[0] + d_poly[1] * u;
        let k_val = 1.0 + u * u - 2.0 * u * cos_gamma;
        if den.abs() < 1e-12 || k_val <= 1e-12 {
            continue;
        }
        let v = (n_poly[0] + n_poly[1] * u + n_poly[2] * u * u) / den;

        let s1 = (c2 / k_val).sqrt();
        let (s2, s3) = (u * s1, v * s1);
        if s2 <= 0.0 || s3 <= 0.0 {
            continue;
        }

        let camera = [bearings[0] * s1, bearings[1] * s2, bearings[2] * s3];
        if let Ok(pose) = pose_from_points(world, &camera) {
            solutions.push((s1, pose));
        }
    }

    if solutions.is_empty() {
        bail!("failed to solve the P3P polynomial system");
    }

    solutions.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(solutions.into_iter().map(|(_, pose)| pose).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigloc_core::{pose_distance, synthetic};

    #[test]
    fn p3p_recovers_pose_from_minimal_set() {
        let cam = synthetic::default_intrinsics();
        let pose_gt = synthetic::pose([0.1, -0.05, 0.2], [0.1, -0.05, 1.0]);

        let world = vec![
            Pt3::new(0.2, -0.1, 0.8),
            Pt3::new(-0.1, 0.2, 1.1),
            Pt3::new(0.15, 0.1, 0.9),
        ];
        let image = synthetic::project_all(&cam, &pose_gt, &world).unwrap();

        let sols = p3p(&world, &image, &cam).unwrap();
        assert!(!sols.is_empty() && sols.len() <= 4);

        let best = sols
            .iter()
            .map(|est| pose_distance(est, &pose_gt))
            .fold((f64::INFINITY, f64::INFINITY), |acc, (ang, dt)| {
                if ang + dt < acc.0 + acc.1 {
                    (ang, dt)
                } else {
                    acc
                }
            });
        assert!(best.0 < 1e-6, "rotation error too large: {}", best.0);
        assert!(best.1 < 1e-6, "translation error too large: {}", best.1);
    }

    #[test]
    fn p3p_rejects_collinear_points() {
        let world = vec![
            Pt3::new(0.0, 0.0, 1.0),
            Pt3::new(0.1, 0.0, 1.0),
            Pt3::new(0.2, 0.0, 1.0),
        ];
        let bearings: Vec<Vec3> = world.iter().map(|p| p.coords.normalize()).collect();
        assert!(p3p_bearings(&world, &bearings).is_err());
    }
}
